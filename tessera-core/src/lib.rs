//! Tessera Core Library
//!
//! Shared building blocks for the Tessera toolchain: source positions,
//! diagnostics and the options that tune the parser.

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod span;

pub use config::{OptionsLoader, ParserOptions};
pub use diagnostic::{Diagnostic, DiagnosticSink, Severity};
pub use error::{Error, Result};
pub use span::{LineIndex, Position, Span};

/// Tessera version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
