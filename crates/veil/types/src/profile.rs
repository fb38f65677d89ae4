//! Operating profiles for different play contexts
//!
//! A profile selects a tuned preset of thresholds, dwell time and action
//! cadence:
//! - Balanced: general play
//! - Cautious: crowded servers or recent warnings, reacts earlier
//! - Relaxed: quiet servers, tolerates more before moving
//! - Development: short timers for local testing

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperatingProfile {
    #[default]
    Balanced,
    Cautious,
    Relaxed,
    Development,
}

impl OperatingProfile {
    /// Default assessment tick for this profile
    pub fn default_tick_interval(&self) -> std::time::Duration {
        match self {
            OperatingProfile::Balanced => std::time::Duration::from_secs(5),
            OperatingProfile::Cautious => std::time::Duration::from_secs(5),
            OperatingProfile::Relaxed => std::time::Duration::from_secs(10),
            OperatingProfile::Development => std::time::Duration::from_secs(1),
        }
    }
}

impl std::fmt::Display for OperatingProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatingProfile::Balanced => write!(f, "balanced"),
            OperatingProfile::Cautious => write!(f, "cautious"),
            OperatingProfile::Relaxed => write!(f, "relaxed"),
            OperatingProfile::Development => write!(f, "development"),
        }
    }
}

impl FromStr for OperatingProfile {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "balanced" => Ok(OperatingProfile::Balanced),
            "cautious" => Ok(OperatingProfile::Cautious),
            "relaxed" => Ok(OperatingProfile::Relaxed),
            "development" | "dev" => Ok(OperatingProfile::Development),
            other => Err(ParseError::Profile(other.to_string())),
        }
    }
}
