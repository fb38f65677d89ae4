//! Configuration for veild
//!
//! Layered with the `config` crate: profile preset, then an optional file,
//! then `VEIL_*` environment variables (`__` separates nested keys, e.g.
//! `VEIL_ENGINE__STRATEGY__DWELL_TIME_SECS=45`).

use serde::{Deserialize, Serialize};
use veil_engine::EngineConfig;
use veil_types::{OperatingProfile, ProtectionToggles};

use crate::error::{DaemonError, DaemonResult};

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Operating profile the engine preset is derived from
    #[serde(default)]
    pub profile: OperatingProfile,

    /// Engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Protections enabled at startup
    #[serde(default)]
    pub protections: ProtectionToggles,

    /// Replay feed configuration
    #[serde(default)]
    pub replay: ReplayConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::for_profile(OperatingProfile::default())
    }
}

impl DaemonConfig {
    /// Defaults for a profile
    pub fn for_profile(profile: OperatingProfile) -> Self {
        Self {
            profile,
            engine: EngineConfig::for_profile(profile),
            protections: ProtectionToggles::default(),
            replay: ReplayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from the profile preset, an optional file and
    /// the environment, then validate the engine policy.
    pub fn load(path: Option<&str>, profile: OperatingProfile) -> DaemonResult<Self> {
        let mut builder = config::Config::builder();

        // Add profile defaults
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::for_profile(profile))?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with VEIL_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("VEIL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: DaemonConfig = builder.build()?.try_deserialize()?;
        config
            .engine
            .validate()
            .map_err(|e| DaemonError::Config(e.to_string()))?;
        Ok(config)
    }
}

/// Replay feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// JSON Lines file of observations to feed in
    #[serde(default)]
    pub path: Option<String>,

    /// Playback speed factor; 2.0 plays twice as fast
    #[serde(default = "default_speed")]
    pub speed: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            path: None,
            speed: default_speed(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_speed() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}
