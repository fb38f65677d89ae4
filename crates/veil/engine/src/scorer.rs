//! Risk scoring.
//!
//! [`RiskScorer`] is a pure function of a store snapshot and the current
//! time. [`TrendTracker`] keeps the short score history used to label the
//! direction of travel.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use veil_types::{RiskLevel, Trend};

use crate::config::ScoringConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::RiskEventKind;
use crate::store::{ActiveZone, NearbyPlayer, StoreSnapshot};

/// Per-component contributions, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub players: f64,
    pub zones: f64,
    pub events: f64,
    pub score: f64,
}

/// Maps store snapshots to a risk score and level.
#[derive(Debug, Clone)]
pub struct RiskScorer {
    config: ScoringConfig,
}

impl RiskScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Weighted risk score in [0, 1].
    pub fn score(&self, snapshot: &StoreSnapshot, now: DateTime<Utc>) -> EngineResult<f64> {
        Ok(self.breakdown(snapshot, now)?.score)
    }

    /// Score with its component contributions.
    ///
    /// Fails with [`EngineError::InvariantViolation`] if the result is not a
    /// finite number inside [0, 1].
    pub fn breakdown(
        &self,
        snapshot: &StoreSnapshot,
        now: DateTime<Utc>,
    ) -> EngineResult<ScoreBreakdown> {
        let players = self.player_component(&snapshot.players);
        let zones = self.zone_component(&snapshot.zones);
        let events = self.event_component(snapshot, now);

        let c = &self.config;
        let total_weight = c.player_weight + c.zone_weight + c.event_weight;
        let weighted = players * c.player_weight + zones * c.zone_weight + events * c.event_weight;
        let score = (weighted / total_weight).clamp(0.0, 1.0);

        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(EngineError::InvariantViolation(format!(
                "risk score {} outside [0, 1] (players={}, zones={}, events={})",
                score, players, zones, events
            )));
        }

        Ok(ScoreBreakdown {
            players,
            zones,
            events,
            score,
        })
    }

    /// Discrete level for a score.
    pub fn classify(&self, score: f64) -> RiskLevel {
        self.config.thresholds.level_for(score)
    }

    fn player_component(&self, players: &[NearbyPlayer]) -> f64 {
        let total: f64 = players
            .iter()
            .filter(|p| p.distance <= self.config.distance_threshold)
            .map(|p| p.risk_type.severity() * self.proximity(p.distance))
            .sum();
        (total / self.config.player_saturation).clamp(0.0, 1.0)
    }

    /// 1.0 within close range, falling linearly to 0.0 at the threshold.
    fn proximity(&self, distance: f64) -> f64 {
        let close = self.config.close_distance;
        let far = self.config.distance_threshold;
        if distance <= close {
            1.0
        } else {
            ((far - distance) / (far - close)).clamp(0.0, 1.0)
        }
    }

    fn zone_component(&self, zones: &[ActiveZone]) -> f64 {
        let share = self.config.zone_level_share;
        let saturation = f64::from(self.config.zone_crowd_saturation);
        zones
            .iter()
            .map(|z| {
                let crowd = (f64::from(z.player_count) / saturation).min(1.0);
                share * z.risk_level.severity() + (1.0 - share) * crowd
            })
            .fold(0.0, f64::max)
    }

    // Only perception detections count; the engine's own strategy changes
    // would otherwise feed back into the score.
    fn event_component(&self, snapshot: &StoreSnapshot, now: DateTime<Utc>) -> f64 {
        let since = now - self.config.window();
        let elevated = snapshot
            .events
            .iter()
            .filter(|e| e.event_type == RiskEventKind::Detection)
            .filter(|e| e.risk_level.is_elevated() && e.timestamp >= since)
            .count();
        (elevated as f64 / f64::from(self.config.event_saturation)).min(1.0)
    }
}

/// Rolling average of recent scores with a dead band.
#[derive(Debug, Clone)]
pub struct TrendTracker {
    window: usize,
    dead_band: f64,
    history: VecDeque<f64>,
}

impl TrendTracker {
    pub fn new(window: usize, dead_band: f64) -> Self {
        Self {
            window: window.max(1),
            dead_band,
            history: VecDeque::with_capacity(window.max(1)),
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(config.trend_window, config.trend_dead_band)
    }

    /// Compare `score` to the average of the previous scores, then remember
    /// it. With no history the baseline is zero, the initial assessment.
    pub fn observe(&mut self, score: f64) -> Trend {
        let baseline = if self.history.is_empty() {
            0.0
        } else {
            self.history.iter().sum::<f64>() / self.history.len() as f64
        };

        let trend = if score > baseline + self.dead_band {
            Trend::Increasing
        } else if score < baseline - self.dead_band {
            Trend::Decreasing
        } else {
            Trend::Stable
        };

        self.history.push_back(score);
        while self.history.len() > self.window {
            self.history.pop_front();
        }
        trend
    }

    /// Apply a new window and dead band, keeping the newest scores.
    pub fn reconfigure(&mut self, window: usize, dead_band: f64) {
        self.window = window.max(1);
        self.dead_band = dead_band;
        while self.history.len() > self.window {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = f64> + '_ {
        self.history.iter().copied()
    }
}
