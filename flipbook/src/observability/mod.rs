//! Observability utilities.
//!
//! Log output goes through `tracing`; [`init_tracing`] installs the
//! process-wide subscriber for binaries. Libraries and tests never need to
//! call it.

mod subscriber;
mod timer;

pub use subscriber::init_tracing;
pub use timer::SpanTimer;
