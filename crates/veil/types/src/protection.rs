//! Background protections toggled independently of the active strategy

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// A single independently controllable background protection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protection {
    IdleEmotes,
    ChatRateLimit,
    SanitizeLogs,
    RandomizeMovement,
    RandomizeMood,
    CameraWiggles,
}

impl Protection {
    pub const ALL: [Protection; 6] = [
        Protection::IdleEmotes,
        Protection::ChatRateLimit,
        Protection::SanitizeLogs,
        Protection::RandomizeMovement,
        Protection::RandomizeMood,
        Protection::CameraWiggles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protection::IdleEmotes => "idle_emotes",
            Protection::ChatRateLimit => "chat_rate_limit",
            Protection::SanitizeLogs => "sanitize_logs",
            Protection::RandomizeMovement => "randomize_movement",
            Protection::RandomizeMood => "randomize_mood",
            Protection::CameraWiggles => "camera_wiggles",
        }
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protection {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protection::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ParseError::Protection(s.to_string()))
    }
}

/// Current on/off state of every protection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionToggles {
    pub idle_emotes: bool,
    pub chat_rate_limit: bool,
    pub sanitize_logs: bool,
    pub randomize_movement: bool,
    pub randomize_mood: bool,
    pub camera_wiggles: bool,
}

impl Default for ProtectionToggles {
    fn default() -> Self {
        Self {
            idle_emotes: true,
            chat_rate_limit: true,
            sanitize_logs: true,
            randomize_movement: true,
            randomize_mood: false,
            camera_wiggles: false,
        }
    }
}

impl ProtectionToggles {
    /// Every protection disabled
    pub fn none() -> Self {
        Self {
            idle_emotes: false,
            chat_rate_limit: false,
            sanitize_logs: false,
            randomize_movement: false,
            randomize_mood: false,
            camera_wiggles: false,
        }
    }

    pub fn is_enabled(&self, protection: Protection) -> bool {
        match protection {
            Protection::IdleEmotes => self.idle_emotes,
            Protection::ChatRateLimit => self.chat_rate_limit,
            Protection::SanitizeLogs => self.sanitize_logs,
            Protection::RandomizeMovement => self.randomize_movement,
            Protection::RandomizeMood => self.randomize_mood,
            Protection::CameraWiggles => self.camera_wiggles,
        }
    }

    /// Set a protection, returning its previous state.
    pub fn set(&mut self, protection: Protection, enabled: bool) -> bool {
        let slot = match protection {
            Protection::IdleEmotes => &mut self.idle_emotes,
            Protection::ChatRateLimit => &mut self.chat_rate_limit,
            Protection::SanitizeLogs => &mut self.sanitize_logs,
            Protection::RandomizeMovement => &mut self.randomize_movement,
            Protection::RandomizeMood => &mut self.randomize_mood,
            Protection::CameraWiggles => &mut self.camera_wiggles,
        };
        std::mem::replace(slot, enabled)
    }

    pub fn enabled(&self) -> impl Iterator<Item = Protection> + '_ {
        Protection::ALL
            .into_iter()
            .filter(move |p| self.is_enabled(*p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_returns_previous() {
        let mut toggles = ProtectionToggles::none();
        assert!(!toggles.set(Protection::CameraWiggles, true));
        assert!(toggles.set(Protection::CameraWiggles, false));
        assert!(!toggles.is_enabled(Protection::CameraWiggles));
    }

    #[test]
    fn test_enabled_iter() {
        let mut toggles = ProtectionToggles::none();
        toggles.set(Protection::SanitizeLogs, true);
        toggles.set(Protection::IdleEmotes, true);
        let enabled: Vec<_> = toggles.enabled().collect();
        assert_eq!(enabled, vec![Protection::IdleEmotes, Protection::SanitizeLogs]);
    }

    #[test]
    fn test_parse_name() {
        assert_eq!(
            "chat_rate_limit".parse::<Protection>().unwrap(),
            Protection::ChatRateLimit
        );
        assert!("autopilot".parse::<Protection>().is_err());
    }
}
