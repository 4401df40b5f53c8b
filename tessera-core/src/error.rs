//! Error types for Tessera

use thiserror::Error;

/// Result type for Tessera operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Tessera
#[derive(Error, Debug)]
pub enum Error {
    /// Parser options could not be loaded
    #[error("Options error: {0}")]
    Options(String),

    /// AST serialization failed
    #[error("Serialize error: {0}")]
    Serialize(String),

    /// Diagnostic rendering failed
    #[error("Render error: {0}")]
    Render(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
