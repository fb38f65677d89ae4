//! Engine configuration.
//!
//! Defines configuration for ingest, rolling statistics, scoring policy,
//! strategy hysteresis, action dispatch and status publishing. Every
//! constant that shapes risk classification lives here so it can be tuned
//! and validated rather than hard-coded.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use veil_types::{OperatingProfile, RiskLevel};

use crate::error::{EngineError, EngineResult};

/// Upper bound for every configured duration: one week.
pub const MAX_DURATION_SECS: i64 = 7 * 24 * 60 * 60;

const MAX_DURATION_MS: u64 = MAX_DURATION_SECS as u64 * 1_000;

/// Configuration for the whole engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile the presets were derived from.
    #[serde(default)]
    pub profile: OperatingProfile,

    /// Interval between assessment ticks in milliseconds.
    pub tick_interval_ms: u64,

    /// Interval between TTL sweeps in milliseconds.
    pub sweep_interval_ms: u64,

    /// Ingest gateway configuration.
    pub ingest: IngestConfig,

    /// Rolling statistics store configuration.
    pub store: StoreConfig,

    /// Risk scoring policy.
    pub scoring: ScoringConfig,

    /// Strategy selection policy.
    pub strategy: StrategyConfig,

    /// Action dispatch configuration.
    pub dispatch: DispatchConfig,

    /// Status publisher configuration.
    pub publisher: PublisherConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: OperatingProfile::Balanced,
            tick_interval_ms: 5_000,
            sweep_interval_ms: 15_000,
            ingest: IngestConfig::default(),
            store: StoreConfig::default(),
            scoring: ScoringConfig::default(),
            strategy: StrategyConfig::default(),
            dispatch: DispatchConfig::default(),
            publisher: PublisherConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create config tuned for a specific operating profile.
    pub fn for_profile(profile: OperatingProfile) -> Self {
        let mut config = Self {
            profile,
            tick_interval_ms: profile.default_tick_interval().as_millis() as u64,
            ..Self::default()
        };

        match profile {
            OperatingProfile::Balanced => {}
            OperatingProfile::Cautious => {
                // React earlier and hold responses longer
                config.scoring.thresholds = LevelThresholds {
                    medium: 0.2,
                    high: 0.4,
                    critical: 0.65,
                };
                config.scoring.distance_threshold = 80.0;
                config.strategy.dwell_time_secs = 60;
                config.dispatch.chat_messages_per_minute = 4;
            }
            OperatingProfile::Relaxed => {
                config.scoring.thresholds = LevelThresholds {
                    medium: 0.3,
                    high: 0.6,
                    critical: 0.85,
                };
                config.scoring.distance_threshold = 35.0;
                config.strategy.dwell_time_secs = 20;
                config.dispatch.chat_messages_per_minute = 10;
            }
            OperatingProfile::Development => {
                config.sweep_interval_ms = 2_000;
                config.strategy.dwell_time_secs = 3;
                config.store.player_ttl_secs = 10;
                config.store.zone_ttl_secs = 20;
                config.dispatch.retry_delay_ms = 10;
                config.dispatch.idle_emote_interval = IntervalRange::new(2, 5);
                config.dispatch.mood_interval = IntervalRange::new(5, 10);
                config.dispatch.camera_interval = IntervalRange::new(1, 4);
            }
        }

        config
    }

    /// Validate the whole configuration, failing fast on the first problem.
    pub fn validate(&self) -> EngineResult<()> {
        check_millis("tick_interval_ms", self.tick_interval_ms)?;
        check_millis("sweep_interval_ms", self.sweep_interval_ms)?;
        self.ingest.validate()?;
        self.store.validate()?;
        self.scoring.validate()?;
        self.strategy.validate()?;
        self.dispatch.validate()?;
        self.publisher.validate()?;
        Ok(())
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        clamped_millis(self.tick_interval_ms)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        clamped_millis(self.sweep_interval_ms)
    }
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::ConfigurationError(message.into())
}

/// Seconds within `[min, MAX_DURATION_SECS]`.
fn check_secs(name: &str, secs: i64, min: i64) -> EngineResult<()> {
    if secs < min || secs > MAX_DURATION_SECS {
        return Err(invalid(format!(
            "{name} must be within [{min}, {MAX_DURATION_SECS}] seconds, got {secs}"
        )));
    }
    Ok(())
}

fn check_secs_u64(name: &str, secs: u64, min: u64) -> EngineResult<()> {
    if secs < min || secs > MAX_DURATION_SECS as u64 {
        return Err(invalid(format!(
            "{name} must be within [{min}, {MAX_DURATION_SECS}] seconds, got {secs}"
        )));
    }
    Ok(())
}

fn check_millis(name: &str, millis: u64) -> EngineResult<()> {
    if millis == 0 || millis > MAX_DURATION_MS {
        return Err(invalid(format!(
            "{name} must be within [1, {MAX_DURATION_MS}] milliseconds, got {millis}"
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> EngineResult<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(format!("{name} must be a positive number, got {value}")));
    }
    Ok(())
}

/// Duration of `secs`, clamped to `[0, MAX_DURATION_SECS]` so the
/// conversion never overflows.
pub(crate) fn clamped_seconds(secs: i64) -> Duration {
    Duration::seconds(secs.clamp(0, MAX_DURATION_SECS))
}

pub(crate) fn clamped_seconds_u64(secs: u64) -> Duration {
    clamped_seconds(i64::try_from(secs).unwrap_or(MAX_DURATION_SECS))
}

fn clamped_millis(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis.min(MAX_DURATION_MS))
}

/// Ingest gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum unprocessed observations held between ticks.
    pub queue_capacity: usize,

    /// How far in the past an observation timestamp may lie.
    pub max_past_skew_secs: i64,

    /// How far in the future an observation timestamp may lie.
    pub max_future_skew_secs: i64,

    /// Sightings farther than this (meters) are rejected as implausible.
    pub max_distance: f64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_past_skew_secs: 30,
            max_future_skew_secs: 2,
            max_distance: 500.0,
        }
    }
}

impl IngestConfig {
    fn validate(&self) -> EngineResult<()> {
        if self.queue_capacity == 0 {
            return Err(invalid("ingest.queue_capacity must be positive"));
        }
        check_secs("ingest.max_past_skew_secs", self.max_past_skew_secs, 0)?;
        check_secs("ingest.max_future_skew_secs", self.max_future_skew_secs, 0)?;
        check_positive("ingest.max_distance", self.max_distance)?;
        Ok(())
    }

    pub fn max_past_skew(&self) -> Duration {
        clamped_seconds(self.max_past_skew_secs)
    }

    pub fn max_future_skew(&self) -> Duration {
        clamped_seconds(self.max_future_skew_secs)
    }
}

/// Rolling statistics store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum tracked nearby players.
    pub player_capacity: usize,

    /// Maximum tracked zones.
    pub zone_capacity: usize,

    /// Maximum retained risk events.
    pub event_capacity: usize,

    /// Players not seen for this long are evicted.
    pub player_ttl_secs: i64,

    /// Zones not updated for this long are evicted.
    pub zone_ttl_secs: i64,

    /// Retained chat action timestamps.
    pub chat_history_capacity: usize,

    /// Retained movement actions.
    pub movement_history_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            player_capacity: 64,
            zone_capacity: 16,
            event_capacity: 500,
            player_ttl_secs: 60,
            zone_ttl_secs: 300,
            chat_history_capacity: 200,
            movement_history_capacity: 200,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> EngineResult<()> {
        if self.player_capacity == 0 || self.zone_capacity == 0 || self.event_capacity == 0 {
            return Err(invalid("store capacities must be positive"));
        }
        if self.chat_history_capacity == 0 || self.movement_history_capacity == 0 {
            return Err(invalid("store history capacities must be positive"));
        }
        check_secs("store.player_ttl_secs", self.player_ttl_secs, 1)?;
        check_secs("store.zone_ttl_secs", self.zone_ttl_secs, 1)?;
        Ok(())
    }

    pub fn player_ttl(&self) -> Duration {
        clamped_seconds(self.player_ttl_secs)
    }

    pub fn zone_ttl(&self) -> Duration {
        clamped_seconds(self.zone_ttl_secs)
    }
}

/// Score-to-level thresholds. A score at or above a threshold belongs to
/// that level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            medium: 0.25,
            high: 0.5,
            critical: 0.75,
        }
    }
}

impl LevelThresholds {
    /// Map a score onto its level. Monotonic step function of the score.
    pub fn level_for(&self, score: f64) -> RiskLevel {
        if score >= self.critical {
            RiskLevel::Critical
        } else if score >= self.high {
            RiskLevel::High
        } else if score >= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    fn validate(&self) -> EngineResult<()> {
        let ordered = 0.0 < self.medium
            && self.medium < self.high
            && self.high < self.critical
            && self.critical < 1.0;
        if !ordered {
            return Err(invalid(format!(
                "level thresholds must satisfy 0 < medium < high < critical < 1, got {}/{}/{}",
                self.medium, self.high, self.critical
            )));
        }
        Ok(())
    }
}

/// Risk scoring policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Score-to-level thresholds.
    pub thresholds: LevelThresholds,

    /// Weight of the nearby-player component.
    pub player_weight: f64,

    /// Weight of the zone component.
    pub zone_weight: f64,

    /// Weight of the recent-event component.
    pub event_weight: f64,

    /// Players farther than this (meters) do not count.
    pub distance_threshold: f64,

    /// Players within this distance count at full severity; between here
    /// and `distance_threshold` severity falls off linearly.
    pub close_distance: f64,

    /// Summed player severity at which the player component saturates.
    pub player_saturation: f64,

    /// Zone population at which the crowd factor saturates.
    pub zone_crowd_saturation: u32,

    /// Elevated events in the window at which the event component saturates.
    pub event_saturation: u32,

    /// Share of the zone component taken by its risk level (rest is crowd).
    pub zone_level_share: f64,

    /// Assessment window for event frequency, in seconds.
    pub window_secs: i64,

    /// Number of previous scores averaged for the trend.
    pub trend_window: usize,

    /// Differences from the rolling average smaller than this are stable.
    pub trend_dead_band: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            thresholds: LevelThresholds::default(),
            player_weight: 0.6,
            zone_weight: 0.2,
            event_weight: 0.2,
            distance_threshold: 50.0,
            close_distance: 20.0,
            player_saturation: 3.0,
            zone_crowd_saturation: 25,
            event_saturation: 5,
            zone_level_share: 0.7,
            window_secs: 120,
            trend_window: 5,
            trend_dead_band: 0.05,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> EngineResult<()> {
        self.thresholds.validate()?;

        let weights = [self.player_weight, self.zone_weight, self.event_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(invalid("scoring weights must be finite and non-negative"));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(invalid("scoring weights must not all be zero"));
        }
        check_positive("scoring.distance_threshold", self.distance_threshold)?;
        if !(self.close_distance >= 0.0 && self.close_distance < self.distance_threshold) {
            return Err(invalid(
                "scoring.close_distance must be within [0, distance_threshold)",
            ));
        }
        check_positive("scoring.player_saturation", self.player_saturation)?;
        if self.zone_crowd_saturation == 0 || self.event_saturation == 0 {
            return Err(invalid("scoring saturations must be positive"));
        }
        if !(0.0..=1.0).contains(&self.zone_level_share) {
            return Err(invalid("scoring.zone_level_share must be within [0, 1]"));
        }
        check_secs("scoring.window_secs", self.window_secs, 1)?;
        if self.trend_window == 0 {
            return Err(invalid("scoring.trend_window must be positive"));
        }
        if !(self.trend_dead_band >= 0.0 && self.trend_dead_band < 1.0) {
            return Err(invalid("scoring.trend_dead_band must be within [0, 1)"));
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        clamped_seconds(self.window_secs)
    }
}

/// Strategy selection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Minimum time a strategy stays active before a non-critical change.
    pub dwell_time_secs: i64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            dwell_time_secs: 30,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> EngineResult<()> {
        check_secs("strategy.dwell_time_secs", self.dwell_time_secs, 0)
    }

    pub fn dwell_time(&self) -> Duration {
        clamped_seconds(self.dwell_time_secs)
    }
}

/// Inclusive range of seconds a randomized interval is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl IntervalRange {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    fn validate(&self, name: &str) -> EngineResult<()> {
        if self.min_secs == 0 || self.min_secs > self.max_secs {
            return Err(invalid(format!(
                "dispatch.{name} must satisfy 0 < min_secs <= max_secs"
            )));
        }
        check_secs_u64(&format!("dispatch.{name}.max_secs"), self.max_secs, 1)
    }
}

/// Action dispatch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Time allowed for a single actuator call.
    pub actuator_timeout_ms: u64,

    /// Retries after the first failed attempt.
    pub max_retries: u32,

    /// Delay between attempts.
    pub retry_delay_ms: u64,

    /// Chat messages allowed per rolling minute when rate limiting is on.
    pub chat_messages_per_minute: u32,

    /// Minimum gap between repeated requests for the same strategy action.
    pub strategy_action_cooldown_secs: u64,

    /// Minimum gap between log sanitization passes.
    pub sanitize_interval_secs: u64,

    /// Minimum gap between movement jitters.
    pub movement_jitter_interval_secs: u64,

    /// Randomized idle emote cadence.
    pub idle_emote_interval: IntervalRange,

    /// Randomized mood change cadence.
    pub mood_interval: IntervalRange,

    /// Randomized camera wiggle cadence.
    pub camera_interval: IntervalRange,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            actuator_timeout_ms: 2_000,
            max_retries: 2,
            retry_delay_ms: 250,
            chat_messages_per_minute: 6,
            strategy_action_cooldown_secs: 15,
            sanitize_interval_secs: 60,
            movement_jitter_interval_secs: 20,
            idle_emote_interval: IntervalRange::new(45, 180),
            mood_interval: IntervalRange::new(300, 900),
            camera_interval: IntervalRange::new(8, 40),
        }
    }
}

impl DispatchConfig {
    fn validate(&self) -> EngineResult<()> {
        check_millis("dispatch.actuator_timeout_ms", self.actuator_timeout_ms)?;
        if self.retry_delay_ms > MAX_DURATION_MS {
            return Err(invalid("dispatch.retry_delay_ms must be at most one week"));
        }
        check_secs_u64(
            "dispatch.strategy_action_cooldown_secs",
            self.strategy_action_cooldown_secs,
            0,
        )?;
        check_secs_u64("dispatch.sanitize_interval_secs", self.sanitize_interval_secs, 1)?;
        check_secs_u64(
            "dispatch.movement_jitter_interval_secs",
            self.movement_jitter_interval_secs,
            1,
        )?;
        if self.max_retries > 10 {
            return Err(invalid("dispatch.max_retries must be at most 10"));
        }
        if self.chat_messages_per_minute == 0 {
            return Err(invalid("dispatch.chat_messages_per_minute must be positive"));
        }
        self.idle_emote_interval.validate("idle_emote_interval")?;
        self.mood_interval.validate("mood_interval")?;
        self.camera_interval.validate("camera_interval")?;
        Ok(())
    }

    pub fn actuator_timeout(&self) -> std::time::Duration {
        clamped_millis(self.actuator_timeout_ms)
    }

    pub fn retry_delay(&self) -> std::time::Duration {
        clamped_millis(self.retry_delay_ms)
    }

    pub fn strategy_action_cooldown(&self) -> Duration {
        clamped_seconds_u64(self.strategy_action_cooldown_secs)
    }

    pub fn sanitize_interval(&self) -> Duration {
        clamped_seconds_u64(self.sanitize_interval_secs)
    }

    pub fn movement_jitter_interval(&self) -> Duration {
        clamped_seconds_u64(self.movement_jitter_interval_secs)
    }
}

/// Status publisher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Recent events included in each status snapshot.
    pub recent_events: usize,

    /// Buffered snapshots per push subscriber.
    pub subscriber_buffer: usize,

    /// Consecutive dropped publishes after which a subscriber is cut off.
    pub max_consecutive_drops: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            recent_events: 20,
            subscriber_buffer: 8,
            max_consecutive_drops: 16,
        }
    }
}

impl PublisherConfig {
    fn validate(&self) -> EngineResult<()> {
        if self.subscriber_buffer == 0 {
            return Err(invalid("publisher.subscriber_buffer must be positive"));
        }
        if self.max_consecutive_drops == 0 {
            return Err(invalid("publisher.max_consecutive_drops must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_profile_presets_are_valid() {
        for profile in [
            OperatingProfile::Balanced,
            OperatingProfile::Cautious,
            OperatingProfile::Relaxed,
            OperatingProfile::Development,
        ] {
            EngineConfig::for_profile(profile).validate().unwrap();
        }
    }

    #[test]
    fn test_cautious_reacts_earlier() {
        let balanced = EngineConfig::for_profile(OperatingProfile::Balanced);
        let cautious = EngineConfig::for_profile(OperatingProfile::Cautious);
        assert!(cautious.scoring.thresholds.high < balanced.scoring.thresholds.high);
        assert!(cautious.strategy.dwell_time_secs > balanced.strategy.dwell_time_secs);
    }

    #[test]
    fn test_default_levels() {
        let thresholds = LevelThresholds::default();
        assert_eq!(thresholds.level_for(0.10), RiskLevel::Low);
        assert_eq!(thresholds.level_for(0.40), RiskLevel::Medium);
        assert_eq!(thresholds.level_for(0.60), RiskLevel::High);
        assert_eq!(thresholds.level_for(0.90), RiskLevel::Critical);
        assert_eq!(thresholds.level_for(0.25), RiskLevel::Medium);
    }

    #[test]
    fn test_non_monotonic_thresholds_rejected() {
        let mut config = EngineConfig::default();
        config.scoring.thresholds = LevelThresholds {
            medium: 0.5,
            high: 0.4,
            critical: 0.9,
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, EngineError::ConfigurationError(_)));
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut config = EngineConfig::default();
        config.scoring.player_weight = 0.0;
        config.scoring.zone_weight = 0.0;
        config.scoring.event_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_and_infinite_scoring_rejected() {
        let mut config = EngineConfig::default();
        config.scoring.player_saturation = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(EngineError::ConfigurationError(_))
        ));

        let mut config = EngineConfig::default();
        config.scoring.distance_threshold = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.scoring.close_distance = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.scoring.zone_level_share = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_huge_durations_rejected() {
        let mut config = EngineConfig::default();
        config.store.player_ttl_secs = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.ingest.max_past_skew_secs = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.scoring.window_secs = MAX_DURATION_SECS + 1;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.strategy.dwell_time_secs = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.dispatch.strategy_action_cooldown_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.dispatch.camera_interval = IntervalRange::new(1, u64::MAX);
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.tick_interval_ms = u64::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_one_week_is_accepted() {
        let mut config = EngineConfig::default();
        config.store.zone_ttl_secs = MAX_DURATION_SECS;
        config.dispatch.mood_interval = IntervalRange::new(60, MAX_DURATION_SECS as u64);
        config.validate().unwrap();
    }

    #[test]
    fn test_accessors_clamp_out_of_range_values() {
        let store = StoreConfig {
            player_ttl_secs: i64::MAX,
            zone_ttl_secs: i64::MIN,
            ..StoreConfig::default()
        };
        assert_eq!(store.player_ttl(), Duration::seconds(MAX_DURATION_SECS));
        assert_eq!(store.zone_ttl(), Duration::zero());

        let dispatch = DispatchConfig {
            strategy_action_cooldown_secs: u64::MAX,
            ..DispatchConfig::default()
        };
        assert_eq!(
            dispatch.strategy_action_cooldown(),
            Duration::seconds(MAX_DURATION_SECS)
        );
    }

    #[test]
    fn test_inverted_interval_rejected() {
        let mut config = EngineConfig::default();
        config.dispatch.camera_interval = IntervalRange::new(30, 5);
        assert!(config.validate().is_err());
    }
}
