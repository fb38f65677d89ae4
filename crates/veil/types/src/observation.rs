//! Observation events produced by perception systems
//!
//! Each observation kind is a tagged variant; the risk weight is inferred
//! from the payload when the observation is built and never changes after.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::risk::RiskLevel;

/// How threatening a sighted player looks to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlayerRiskType {
    Friendly,
    #[default]
    Neutral,
    Suspicious,
    Hostile,
    /// Game staff or moderator
    Staff,
}

impl PlayerRiskType {
    /// Relative severity used by the scorer. Staff counts for more than
    /// a single hostile.
    pub fn severity(&self) -> f64 {
        match self {
            PlayerRiskType::Friendly => 0.0,
            PlayerRiskType::Neutral => 0.1,
            PlayerRiskType::Suspicious => 0.5,
            PlayerRiskType::Hostile => 1.0,
            PlayerRiskType::Staff => 2.0,
        }
    }

    fn inferred_weight(&self) -> RiskLevel {
        match self {
            PlayerRiskType::Friendly | PlayerRiskType::Neutral => RiskLevel::Low,
            PlayerRiskType::Suspicious => RiskLevel::Medium,
            PlayerRiskType::Hostile => RiskLevel::High,
            PlayerRiskType::Staff => RiskLevel::Critical,
        }
    }
}

impl fmt::Display for PlayerRiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerRiskType::Friendly => write!(f, "friendly"),
            PlayerRiskType::Neutral => write!(f, "neutral"),
            PlayerRiskType::Suspicious => write!(f, "suspicious"),
            PlayerRiskType::Hostile => write!(f, "hostile"),
            PlayerRiskType::Staff => write!(f, "staff"),
        }
    }
}

impl FromStr for PlayerRiskType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "friendly" => Ok(PlayerRiskType::Friendly),
            "neutral" => Ok(PlayerRiskType::Neutral),
            "suspicious" => Ok(PlayerRiskType::Suspicious),
            "hostile" => Ok(PlayerRiskType::Hostile),
            "staff" | "gm" => Ok(PlayerRiskType::Staff),
            other => Err(ParseError::PlayerRiskType(other.to_string())),
        }
    }
}

/// Payload of an observation, one variant per kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObservationKind {
    /// Another player was seen near the operator
    PlayerSighting {
        name: String,
        faction: String,
        /// Distance from the operator in meters
        distance: f64,
        risk_type: PlayerRiskType,
    },

    /// State of a zone the operator is in or near
    ZoneUpdate {
        zone: String,
        planet: String,
        risk_level: RiskLevel,
        player_count: u32,
    },

    /// Chat analysis flagged a pattern (e.g. someone probing for a bot)
    ChatPatternFlag {
        pattern: String,
        speaker: Option<String>,
        /// Classifier confidence in [0, 1]
        confidence: f64,
    },

    /// The log redactor removed entries
    LogSanitizationFired { redacted_entries: u32 },

    /// A randomization behavior ran outside the engine's control
    RandomizationFired { behavior: String },
}

impl ObservationKind {
    /// Short name of the variant, matching the serde tag
    pub fn name(&self) -> &'static str {
        match self {
            ObservationKind::PlayerSighting { .. } => "player_sighting",
            ObservationKind::ZoneUpdate { .. } => "zone_update",
            ObservationKind::ChatPatternFlag { .. } => "chat_pattern_flag",
            ObservationKind::LogSanitizationFired { .. } => "log_sanitization_fired",
            ObservationKind::RandomizationFired { .. } => "randomization_fired",
        }
    }

    /// Risk weight implied by the payload
    pub fn inferred_weight(&self) -> RiskLevel {
        match self {
            ObservationKind::PlayerSighting { risk_type, .. } => risk_type.inferred_weight(),
            ObservationKind::ZoneUpdate { risk_level, .. } => *risk_level,
            ObservationKind::ChatPatternFlag { confidence, .. } => {
                if *confidence >= 0.9 {
                    RiskLevel::Critical
                } else if *confidence >= 0.6 {
                    RiskLevel::High
                } else if *confidence >= 0.3 {
                    RiskLevel::Medium
                } else {
                    RiskLevel::Low
                }
            }
            ObservationKind::LogSanitizationFired { .. }
            | ObservationKind::RandomizationFired { .. } => RiskLevel::Low,
        }
    }
}

/// A single immutable observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(flatten)]
    pub kind: ObservationKind,

    /// When the producer made the observation
    pub timestamp: DateTime<Utc>,

    /// Inferred risk weight
    pub weight: RiskLevel,
}

impl Observation {
    /// Build an observation, inferring its weight from the payload.
    pub fn new(kind: ObservationKind, timestamp: DateTime<Utc>) -> Self {
        let weight = kind.inferred_weight();
        Self {
            kind,
            timestamp,
            weight,
        }
    }

    pub fn player_sighting(
        name: impl Into<String>,
        faction: impl Into<String>,
        distance: f64,
        risk_type: PlayerRiskType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            ObservationKind::PlayerSighting {
                name: name.into(),
                faction: faction.into(),
                distance,
                risk_type,
            },
            timestamp,
        )
    }

    pub fn zone_update(
        zone: impl Into<String>,
        planet: impl Into<String>,
        risk_level: RiskLevel,
        player_count: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            ObservationKind::ZoneUpdate {
                zone: zone.into(),
                planet: planet.into(),
                risk_level,
                player_count,
            },
            timestamp,
        )
    }

    pub fn chat_pattern(
        pattern: impl Into<String>,
        speaker: Option<String>,
        confidence: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            ObservationKind::ChatPatternFlag {
                pattern: pattern.into(),
                speaker,
                confidence,
            },
            timestamp,
        )
    }
}

/// An observation admitted by the ingest gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedObservation {
    pub sequence: crate::SequenceNumber,
    pub observation: Observation,
    pub ingested_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_inference() {
        let now = Utc::now();
        let hostile = Observation::player_sighting("Vex", "Empire", 12.0, PlayerRiskType::Hostile, now);
        assert_eq!(hostile.weight, RiskLevel::High);

        let staff = Observation::player_sighting("GM-Ana", "Staff", 40.0, PlayerRiskType::Staff, now);
        assert_eq!(staff.weight, RiskLevel::Critical);

        let zone = Observation::zone_update("Dune Sea", "Tatooine", RiskLevel::Medium, 14, now);
        assert_eq!(zone.weight, RiskLevel::Medium);

        let chat = Observation::chat_pattern("are you a bot", None, 0.65, now);
        assert_eq!(chat.weight, RiskLevel::High);
    }

    #[test]
    fn test_json_tagging() {
        let now = Utc::now();
        let obs = Observation::zone_update("Dune Sea", "Tatooine", RiskLevel::High, 3, now);
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["kind"], "zone_update");
        assert_eq!(json["risk_level"], "high");

        let back: Observation = serde_json::from_value(json).unwrap();
        assert_eq!(back, obs);
    }
}
