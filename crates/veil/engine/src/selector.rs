//! Strategy selection state machine.
//!
//! Maps (risk level, trend, time in state) onto one evasion strategy.
//! Non-critical changes wait out the dwell time; critical risk forces
//! `session_pause` at once, and a pause holds until an explicit resume.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use veil_types::{RiskLevel, Strategy, Trend};

use crate::config::StrategyConfig;
use crate::events::NewRiskEvent;

/// Why the active strategy changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// Risk rose to a more aggressive tier.
    Escalation,
    /// Risk fell and the dwell time elapsed.
    Relaxation,
    /// Critical risk, dwell time bypassed.
    CriticalEscape,
    /// External resume after a pause.
    Resume,
    /// The actuator could not carry out the previous strategy.
    ActuatorFallback,
}

/// A completed strategy change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyTransition {
    pub from: Strategy,
    pub to: Strategy,
    pub risk_level: RiskLevel,
    pub reason: TransitionReason,
    pub at: DateTime<Utc>,
}

impl StrategyTransition {
    /// The risk event recording this transition.
    pub fn to_event(&self) -> NewRiskEvent {
        NewRiskEvent::strategy_change(self.from, self.to, self.risk_level, self.at)
    }
}

/// Hysteretic strategy state machine.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    dwell_time: Duration,
    current: Strategy,
    last_change: Option<DateTime<Utc>>,
}

impl StrategySelector {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            dwell_time: config.dwell_time(),
            current: Strategy::LogOnly,
            last_change: None,
        }
    }

    pub fn current(&self) -> Strategy {
        self.current
    }

    pub fn last_change(&self) -> Option<DateTime<Utc>> {
        self.last_change
    }

    pub fn is_paused(&self) -> bool {
        self.current == Strategy::SessionPause
    }

    pub fn set_dwell_time(&mut self, dwell_time: Duration) {
        self.dwell_time = dwell_time;
    }

    /// Feed one assessment. Returns the transition if the strategy changed.
    pub fn evaluate(
        &mut self,
        level: RiskLevel,
        trend: Trend,
        now: DateTime<Utc>,
    ) -> Option<StrategyTransition> {
        if self.is_paused() {
            return None;
        }

        let target = target_strategy(self.current, level, trend);
        if target == self.current {
            return None;
        }

        let reason = if level == RiskLevel::Critical {
            TransitionReason::CriticalEscape
        } else if !self.dwell_elapsed(now) {
            debug!(
                current = %self.current,
                target = %target,
                level = %level,
                "Strategy change held by dwell time"
            );
            return None;
        } else if target.tier() > self.current.tier() {
            TransitionReason::Escalation
        } else {
            TransitionReason::Relaxation
        };

        Some(self.transition(target, level, reason, now))
    }

    /// Leave `session_pause`. Returns `None` if the session is not paused.
    pub fn resume_from_pause(
        &mut self,
        level: RiskLevel,
        now: DateTime<Utc>,
    ) -> Option<StrategyTransition> {
        if !self.is_paused() {
            return None;
        }
        Some(self.transition(Strategy::LogOnly, level, TransitionReason::Resume, now))
    }

    /// Step down one tier after the actuator failed `failed`. Ignored if
    /// the strategy has already moved on or has no fallback.
    pub fn apply_fallback(
        &mut self,
        failed: Strategy,
        level: RiskLevel,
        now: DateTime<Utc>,
    ) -> Option<StrategyTransition> {
        if self.current != failed {
            return None;
        }
        let target = failed.fallback()?;
        Some(self.transition(target, level, TransitionReason::ActuatorFallback, now))
    }

    fn dwell_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_change {
            None => true,
            Some(changed) => now - changed >= self.dwell_time,
        }
    }

    fn transition(
        &mut self,
        to: Strategy,
        risk_level: RiskLevel,
        reason: TransitionReason,
        at: DateTime<Utc>,
    ) -> StrategyTransition {
        let from = self.current;
        self.current = to;
        self.last_change = Some(at);
        StrategyTransition {
            from,
            to,
            risk_level,
            reason,
            at,
        }
    }
}

/// Strategy the policy wants for this level and trend, given where we are.
fn target_strategy(current: Strategy, level: RiskLevel, trend: Trend) -> Strategy {
    use Strategy::*;

    match level {
        RiskLevel::Critical => SessionPause,
        RiskLevel::High => match (current, trend) {
            (MountEscape | ZoneChange, Trend::Increasing) => ZoneChange,
            (MountEscape | ZoneChange, _) => current,
            (_, Trend::Increasing) => MountEscape,
            _ => SafeSpotWait,
        },
        RiskLevel::Medium => match (current, trend) {
            (SoftPathDeviation, Trend::Increasing) => SafeSpotWait,
            (SafeSpotWait, Trend::Increasing | Trend::Stable) => SafeSpotWait,
            _ => SoftPathDeviation,
        },
        RiskLevel::Low => LogOnly,
    }
}
