//! Flipbook compiler.
//!
//! Combines a valid image artifact and a valid story artifact into one
//! self-contained HTML document. Compilation is a pure function of its
//! inputs and the [`CompilerConfig`]: identical inputs always produce
//! byte-identical output.

mod document;
mod escape;
mod hotspot;
mod render;

pub use document::FlipbookDocument;
pub use escape::{escape_html, escape_script_json};
pub use hotspot::Hotspot;
pub use render::{CompilerConfig, FlipbookCompiler, DEFAULT_SCRIPT_SRC};
