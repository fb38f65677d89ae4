//! Risk events and the statistics derived from them.
//!
//! Events are append-only. The bounded history forgets old events, but the
//! counters in [`EventCounters`] only ever grow for the life of the process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use veil_types::{RiskLevel, SequenceNumber, Strategy};

use crate::action::ActionType;

/// What a risk event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventKind {
    /// A chat pattern was flagged by perception.
    Detection,
    /// The external log redactor fired.
    LogSanitized,
    /// An external randomization behavior fired.
    Randomized,
    /// The active strategy changed.
    StrategyChange,
    /// An action request was sent to the actuator.
    ActionDispatched,
    /// An action request was dropped because one is already outstanding
    /// or its cooldown has not elapsed.
    ActionSkipped,
    /// An action request was refused by a rate limit.
    ActionRateLimited,
    /// The actuator completed an action.
    ActionCompleted,
    /// The actuator failed an action after all retries.
    ActionFailed,
    /// A protection was switched on or off.
    ProtectionToggled,
    /// The session was resumed after a pause.
    SessionResumed,
}

impl RiskEventKind {
    /// Events that describe risk itself rather than the engine's bookkeeping.
    pub fn is_risk_signal(&self) -> bool {
        matches!(self, RiskEventKind::Detection | RiskEventKind::StrategyChange)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskEventKind::Detection => "detection",
            RiskEventKind::LogSanitized => "log_sanitized",
            RiskEventKind::Randomized => "randomized",
            RiskEventKind::StrategyChange => "strategy_change",
            RiskEventKind::ActionDispatched => "action_dispatched",
            RiskEventKind::ActionSkipped => "action_skipped",
            RiskEventKind::ActionRateLimited => "action_rate_limited",
            RiskEventKind::ActionCompleted => "action_completed",
            RiskEventKind::ActionFailed => "action_failed",
            RiskEventKind::ProtectionToggled => "protection_toggled",
            RiskEventKind::SessionResumed => "session_resumed",
        }
    }
}

impl std::fmt::Display for RiskEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A risk event before the store stamps it with a sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRiskEvent {
    pub event_type: RiskEventKind,
    pub risk_level: RiskLevel,
    pub action_taken: String,
    pub action: Option<ActionType>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NewRiskEvent {
    pub fn new(
        event_type: RiskEventKind,
        risk_level: RiskLevel,
        action_taken: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            risk_level,
            action_taken: action_taken.into(),
            action: None,
            detail: None,
            timestamp,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Event for a strategy transition, `action_taken = "strategy_change:<new>"`.
    pub fn strategy_change(
        from: Strategy,
        to: Strategy,
        risk_level: RiskLevel,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            RiskEventKind::StrategyChange,
            risk_level,
            format!("strategy_change:{}", to),
            timestamp,
        )
        .with_detail(format!("{} -> {}", from, to))
    }

    pub fn for_action(
        event_type: RiskEventKind,
        action: ActionType,
        risk_level: RiskLevel,
        action_taken: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            risk_level,
            action_taken: action_taken.into(),
            action: Some(action),
            detail: None,
            timestamp,
        }
    }

    pub(crate) fn stamp(self, sequence: SequenceNumber) -> RiskEvent {
        RiskEvent {
            sequence,
            event_type: self.event_type,
            risk_level: self.risk_level,
            action_taken: self.action_taken,
            action: self.action,
            detail: self.detail,
            timestamp: self.timestamp,
        }
    }
}

/// Append-only record of something the engine saw or did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvent {
    pub sequence: SequenceNumber,
    pub event_type: RiskEventKind,
    pub risk_level: RiskLevel,
    pub action_taken: String,
    pub action: Option<ActionType>,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Process-lifetime counters. Never decrease.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounters {
    pub total_events: u64,
    pub risk_events: u64,
    pub sanitized_logs: u64,
    pub rate_limited_messages: u64,
    pub randomization_actions: u64,
    pub skipped_actions: u64,
    pub failed_actions: u64,
}

impl EventCounters {
    /// Fold one appended event into the counters.
    pub fn account(&mut self, event: &RiskEvent) {
        self.total_events += 1;

        if event.event_type.is_risk_signal() {
            self.risk_events += 1;
        }

        match event.event_type {
            RiskEventKind::LogSanitized => self.sanitized_logs += 1,
            RiskEventKind::Randomized => self.randomization_actions += 1,
            RiskEventKind::ActionCompleted => match event.action {
                Some(ActionType::LogSanitize) => self.sanitized_logs += 1,
                Some(action) if action.is_randomization() => self.randomization_actions += 1,
                _ => {}
            },
            RiskEventKind::ActionRateLimited => {
                if event.action == Some(ActionType::ChatMessage) {
                    self.rate_limited_messages += 1;
                }
            }
            RiskEventKind::ActionSkipped => self.skipped_actions += 1,
            RiskEventKind::ActionFailed => self.failed_actions += 1,
            _ => {}
        }
    }

    /// True if no counter in `self` is below its value in `earlier`.
    pub fn dominates(&self, earlier: &EventCounters) -> bool {
        self.total_events >= earlier.total_events
            && self.risk_events >= earlier.risk_events
            && self.sanitized_logs >= earlier.sanitized_logs
            && self.rate_limited_messages >= earlier.rate_limited_messages
            && self.randomization_actions >= earlier.randomization_actions
            && self.skipped_actions >= earlier.skipped_actions
            && self.failed_actions >= earlier.failed_actions
    }
}

/// Aggregate statistics exposed in the status snapshot.
///
/// Counters come from [`EventCounters`]; the sizes are gauges over bounded
/// buffers and can go down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(flatten)]
    pub counters: EventCounters,
    pub chat_history_size: usize,
    pub movement_history_size: usize,
    pub recent_activity: usize,
}
