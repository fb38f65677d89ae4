//! Risk classification and evasion strategy vocabulary
//!
//! Levels and strategies are ordered: a higher level is more dangerous and a
//! higher strategy tier is a more aggressive response.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Discrete risk classification derived from a continuous score
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// Nominal severity in [0, 1] used when a level feeds back into scoring
    pub fn severity(&self) -> f64 {
        match self {
            RiskLevel::Low => 0.1,
            RiskLevel::Medium => 0.4,
            RiskLevel::High => 0.7,
            RiskLevel::Critical => 1.0,
        }
    }

    /// High or critical
    pub fn is_elevated(&self) -> bool {
        *self >= RiskLevel::High
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(ParseError::RiskLevel(other.to_string())),
        }
    }
}

/// Direction of the score relative to its recent rolling average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Increasing => write!(f, "increasing"),
            Trend::Decreasing => write!(f, "decreasing"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

/// Active evasion behavior governing the response to assessed risk
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Passive: only record what is happening
    #[default]
    LogOnly,

    /// Nudge the current path away from nearby players
    SoftPathDeviation,

    /// Move to a known safe spot and wait
    SafeSpotWait,

    /// Mount up and leave the area quickly
    MountEscape,

    /// Leave the zone entirely
    ZoneChange,

    /// Stop the session; only an explicit resume leaves this state
    SessionPause,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::LogOnly,
        Strategy::SoftPathDeviation,
        Strategy::SafeSpotWait,
        Strategy::MountEscape,
        Strategy::ZoneChange,
        Strategy::SessionPause,
    ];

    /// Aggressiveness tier, 0 for `log_only` up to 5 for `session_pause`
    pub fn tier(&self) -> u8 {
        match self {
            Strategy::LogOnly => 0,
            Strategy::SoftPathDeviation => 1,
            Strategy::SafeSpotWait => 2,
            Strategy::MountEscape => 3,
            Strategy::ZoneChange => 4,
            Strategy::SessionPause => 5,
        }
    }

    /// Less aggressive tier to fall back to when the actuator cannot carry
    /// this strategy out. `session_pause` and `log_only` have none.
    pub fn fallback(&self) -> Option<Strategy> {
        match self {
            Strategy::ZoneChange => Some(Strategy::MountEscape),
            Strategy::MountEscape => Some(Strategy::SafeSpotWait),
            Strategy::SafeSpotWait => Some(Strategy::SoftPathDeviation),
            Strategy::SoftPathDeviation => Some(Strategy::LogOnly),
            Strategy::LogOnly | Strategy::SessionPause => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::LogOnly => "log_only",
            Strategy::SoftPathDeviation => "soft_path_deviation",
            Strategy::SafeSpotWait => "safe_spot_wait",
            Strategy::MountEscape => "mount_escape",
            Strategy::ZoneChange => "zone_change",
            Strategy::SessionPause => "session_pause",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| ParseError::Strategy(s.to_string()))
    }
}
