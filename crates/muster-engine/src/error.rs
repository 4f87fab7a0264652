//! Engine error types.

use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors surfaced by the injected engine driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("image not found: {0}")]
    ImageMissing(String),

    #[error("container name already in use: {0}")]
    NameConflict(String),

    #[error("no such container or image: {0}")]
    NotFound(String),

    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors that can occur on the engine handle.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to connect to engine at {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("engine is not connected")]
    NotConnected,

    #[error("event handler already registered")]
    HandlerAlreadyRegistered,

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}
