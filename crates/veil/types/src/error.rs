//! Parse errors for Veil vocabulary types

use thiserror::Error;

/// Error returned when a textual name does not match a known variant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown risk level: {0}")]
    RiskLevel(String),

    #[error("unknown strategy: {0}")]
    Strategy(String),

    #[error("unknown protection: {0}")]
    Protection(String),

    #[error("unknown operating profile: {0}")]
    Profile(String),

    #[error("unknown player risk type: {0}")]
    PlayerRiskType(String),
}
