//! Cooperative cancellation for pipeline runs and batches.

mod token;

pub use token::CancellationToken;
