//! Error types for veil-engine crate.
//!
//! Per-observation and per-action errors are local and non-fatal; only
//! configuration errors and invariant violations stop the engine.

use thiserror::Error;

/// Errors that can occur inside the risk engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Observation rejected at the ingest boundary.
    #[error("malformed observation: {0}")]
    MalformedObservation(String),

    /// Configuration failed validation; the engine refuses to run with it.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// A computed value broke an engine invariant (e.g. score outside [0, 1]).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The actuator reported a failure for an action request.
    #[error("actuator failed {action}: {reason}")]
    ActuatorFailure { action: String, reason: String },

    /// The actuator did not answer within the configured timeout.
    #[error("actuator timed out on {action} after {timeout_ms}ms")]
    ActuatorTimeout { action: String, timeout_ms: u64 },

    /// A status subscriber is gone.
    #[error("subscription closed: {0}")]
    SubscriptionClosed(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Errors that must stop the engine rather than degrade it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::ConfigurationError(_) | EngineError::InvariantViolation(_)
        )
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
