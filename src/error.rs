//! Error types for the Rategate service.

use thiserror::Error;

/// Main error type for Rategate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store operation failures (network/timeout/protocol)
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Rategate operations.
pub type Result<T> = std::result::Result<T, GateError>;
