//! Error types for veild

use thiserror::Error;
use veil_engine::EngineError;

/// Daemon errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration could not be loaded or is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Replay feed could not be read or parsed
    #[error("replay error: {0}")]
    Replay(String),

    /// The engine stopped with an error
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for DaemonError {
    fn from(e: config::ConfigError) -> Self {
        DaemonError::Config(e.to_string())
    }
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
