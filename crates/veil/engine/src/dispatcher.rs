//! Protection action dispatcher.
//!
//! Turns the active strategy and the enabled protections into action
//! requests for the external actuator. Each action type has at most one
//! outstanding request; chat is capped per rolling minute when
//! `chat_rate_limit` is on; background protections fire on their own
//! cadence, randomized where a fixed period would be detectable.
//!
//! Actuator calls run with no lock held, under a timeout, with a bounded
//! number of retries. Every decision and result is recorded as a risk event.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use veil_types::{ActionRequestId, Protection, ProtectionToggles, RiskLevel, Strategy};

use crate::action::{ActionRequest, ActionType, Actuator};
use crate::clock::Clock;
use crate::config::{clamped_seconds_u64, DispatchConfig, IntervalRange};
use crate::error::EngineError;
use crate::events::{NewRiskEvent, RiskEventKind};
use crate::store::{MovementRecord, RollingStore, StoreEntry};

/// Answer to a request for an action.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchDecision {
    /// The request may go to the actuator.
    Issued(ActionRequest),
    /// A request of this type is already outstanding, or the session is
    /// paused.
    Skipped(String),
    /// Refused by the rate limit.
    RateLimited,
}

/// Final result of one action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionReport {
    Completed {
        request_id: ActionRequestId,
        attempts: u32,
    },
    Failed {
        request_id: ActionRequestId,
        reason: String,
        attempts: u32,
    },
    Skipped {
        reason: String,
    },
    RateLimited,
}

impl ActionReport {
    pub fn is_completed(&self) -> bool {
        matches!(self, ActionReport::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ActionReport::Failed { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ActionReport::RateLimited)
    }
}

#[derive(Debug, Clone, Copy)]
enum Cadence {
    Fixed(Duration),
    Randomized(IntervalRange),
}

impl Cadence {
    fn next_delay(&self) -> Duration {
        match self {
            Cadence::Fixed(period) => *period,
            Cadence::Randomized(range) => {
                let secs = rand::thread_rng().gen_range(range.min_secs..=range.max_secs);
                clamped_seconds_u64(secs)
            }
        }
    }
}

/// Removes the pending slot when the request finishes or is dropped.
struct PendingGuard<'a> {
    pending: &'a DashMap<ActionType, ActionRequestId>,
    action_type: ActionType,
    id: ActionRequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending
            .remove_if(&self.action_type, |_, id| *id == self.id);
    }
}

/// Issues idempotent, rate-limited action requests.
pub struct ActionDispatcher {
    /// Configuration.
    config: DispatchConfig,

    /// External actuator.
    actuator: Arc<dyn Actuator>,

    /// Store receiving action events and histories.
    store: Arc<RollingStore>,

    /// Engine clock.
    clock: Arc<dyn Clock>,

    /// Outstanding request per action type.
    pending: DashMap<ActionType, ActionRequestId>,

    /// Last issue time per action type.
    last_issued: DashMap<ActionType, DateTime<Utc>>,

    /// Next firing time per background protection.
    next_due: DashMap<ActionType, DateTime<Utc>>,

    /// Chat sends inside the current rolling minute.
    chat_window: Mutex<VecDeque<DateTime<Utc>>>,
}

impl ActionDispatcher {
    pub fn new(
        config: DispatchConfig,
        actuator: Arc<dyn Actuator>,
        store: Arc<RollingStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            actuator,
            store,
            clock,
            pending: DashMap::new(),
            last_issued: DashMap::new(),
            next_due: DashMap::new(),
            chat_window: Mutex::new(VecDeque::new()),
        }
    }

    pub fn is_pending(&self, action_type: ActionType) -> bool {
        self.pending.contains_key(&action_type)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Actions due this tick for `strategy` and the enabled protections.
    ///
    /// The strategy action is due when it was never issued or its cooldown
    /// has passed. A protection's first firing is scheduled one cadence
    /// after it is first seen enabled; disabling a protection clears its
    /// schedule. Nothing but the pause itself is due while paused.
    pub fn plan(
        &self,
        strategy: Strategy,
        toggles: &ProtectionToggles,
        now: DateTime<Utc>,
    ) -> Vec<ActionType> {
        let mut due = Vec::new();

        if let Some(action) = ActionType::for_strategy(strategy) {
            let cooldown = self.config.strategy_action_cooldown();
            let ready = self
                .last_issued
                .get(&action)
                .map_or(true, |last| now - *last >= cooldown);
            if ready {
                due.push(action);
            }
        }

        if strategy == Strategy::SessionPause {
            return due;
        }

        for (protection, action) in [
            (Protection::SanitizeLogs, ActionType::LogSanitize),
            (Protection::RandomizeMovement, ActionType::MovementJitter),
            (Protection::IdleEmotes, ActionType::IdleEmote),
            (Protection::RandomizeMood, ActionType::MoodChange),
            (Protection::CameraWiggles, ActionType::CameraWiggle),
        ] {
            if !toggles.is_enabled(protection) {
                self.next_due.remove(&action);
                continue;
            }
            let Some(cadence) = self.cadence(action) else {
                continue;
            };
            match self.next_due.entry(action) {
                Entry::Vacant(slot) => {
                    slot.insert(now + cadence.next_delay());
                }
                Entry::Occupied(slot) => {
                    if now >= *slot.get() {
                        due.push(action);
                    }
                }
            }
        }

        due
    }

    /// Decide whether a request may be issued. Records a skipped or
    /// rate-limited event when it may not.
    pub fn request(
        &self,
        action_type: ActionType,
        parameters: serde_json::Value,
        toggles: &ProtectionToggles,
        level: RiskLevel,
        now: DateTime<Utc>,
    ) -> DispatchDecision {
        let request = ActionRequest::new(action_type, parameters, now);

        let claimed = match self.pending.entry(action_type) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(request.id.clone());
                true
            }
        };
        if !claimed {
            debug!(action = %action_type, "Action already pending, skipped");
            self.record(NewRiskEvent::for_action(
                RiskEventKind::ActionSkipped,
                action_type,
                level,
                format!("skipped: {} pending", action_type),
                now,
            ));
            return DispatchDecision::Skipped("already pending".to_string());
        }

        if action_type == ActionType::ChatMessage
            && toggles.chat_rate_limit
            && !self.admit_chat(now)
        {
            self.pending
                .remove_if(&action_type, |_, id| *id == request.id);
            debug!(
                cap = self.config.chat_messages_per_minute,
                "Chat message rate limited"
            );
            self.record(NewRiskEvent::for_action(
                RiskEventKind::ActionRateLimited,
                action_type,
                level,
                format!("rate_limited: {}", action_type),
                now,
            ));
            return DispatchDecision::RateLimited;
        }

        self.last_issued.insert(action_type, now);
        if let Some(cadence) = self.cadence(action_type) {
            self.next_due.insert(action_type, now + cadence.next_delay());
        }

        self.record(NewRiskEvent::for_action(
            RiskEventKind::ActionDispatched,
            action_type,
            level,
            format!("dispatched: {}", action_type),
            now,
        ));
        DispatchDecision::Issued(request)
    }

    /// Send an issued request to the actuator, retrying on failure.
    ///
    /// Each failed attempt is recorded as `failed: <reason>`. The pending
    /// slot is released when this returns or the future is dropped.
    #[instrument(skip(self, request), fields(action = %request.action_type, id = %request.id))]
    pub async fn execute(&self, request: ActionRequest, level: RiskLevel) -> ActionReport {
        let _guard = PendingGuard {
            pending: &self.pending,
            action_type: request.action_type,
            id: request.id.clone(),
        };

        let attempts_allowed = self.config.max_retries + 1;
        let mut last_reason = String::new();

        for attempt in 1..=attempts_allowed {
            let result = match tokio::time::timeout(
                self.config.actuator_timeout(),
                self.actuator.execute(&request),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(EngineError::ActuatorTimeout {
                    action: request.action_type.to_string(),
                    timeout_ms: self.config.actuator_timeout_ms,
                }),
            };

            let now = self.clock.now();
            match result {
                Ok(()) => {
                    self.complete(&request, level, now);
                    return ActionReport::Completed {
                        request_id: request.id,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    warn!(attempt, attempts_allowed, error = %e, "Actuator attempt failed");
                    last_reason = e.to_string();
                    self.record(NewRiskEvent::for_action(
                        RiskEventKind::ActionFailed,
                        request.action_type,
                        level,
                        format!("failed: {}", last_reason),
                        now,
                    ));
                    if attempt < attempts_allowed {
                        tokio::time::sleep(self.config.retry_delay()).await;
                    }
                }
            }
        }

        ActionReport::Failed {
            request_id: request.id,
            reason: last_reason,
            attempts: attempts_allowed,
        }
    }

    /// Request and, if issued, execute one action.
    pub async fn dispatch(
        &self,
        action_type: ActionType,
        parameters: serde_json::Value,
        toggles: &ProtectionToggles,
        level: RiskLevel,
        now: DateTime<Utc>,
    ) -> ActionReport {
        match self.request(action_type, parameters, toggles, level, now) {
            DispatchDecision::Issued(request) => self.execute(request, level).await,
            DispatchDecision::Skipped(reason) => ActionReport::Skipped { reason },
            DispatchDecision::RateLimited => ActionReport::RateLimited,
        }
    }

    fn complete(&self, request: &ActionRequest, level: RiskLevel, now: DateTime<Utc>) {
        let action = request.action_type;
        if action == ActionType::ChatMessage {
            self.store.record(StoreEntry::Chat(now), now);
        } else if action.is_movement() {
            self.store.record(
                StoreEntry::Movement(MovementRecord { action, at: now }),
                now,
            );
        }
        if action == ActionType::SessionPause {
            info!("Session pause acknowledged by actuator");
        }
        self.record(NewRiskEvent::for_action(
            RiskEventKind::ActionCompleted,
            action,
            level,
            format!("completed: {}", action),
            now,
        ));
    }

    fn admit_chat(&self, now: DateTime<Utc>) -> bool {
        let cap = self.config.chat_messages_per_minute as usize;
        let window_start = now - Duration::minutes(1);
        let mut window = self.chat_window.lock();
        while window.front().is_some_and(|sent| *sent <= window_start) {
            window.pop_front();
        }
        if window.len() >= cap {
            return false;
        }
        window.push_back(now);
        true
    }

    fn cadence(&self, action: ActionType) -> Option<Cadence> {
        let c = &self.config;
        match action {
            ActionType::LogSanitize => Some(Cadence::Fixed(c.sanitize_interval())),
            ActionType::MovementJitter => Some(Cadence::Fixed(c.movement_jitter_interval())),
            ActionType::IdleEmote => Some(Cadence::Randomized(c.idle_emote_interval)),
            ActionType::MoodChange => Some(Cadence::Randomized(c.mood_interval)),
            ActionType::CameraWiggle => Some(Cadence::Randomized(c.camera_interval)),
            _ => None,
        }
    }

    fn record(&self, event: NewRiskEvent) {
        let now = event.timestamp;
        self.store.record(StoreEntry::Event(event), now);
    }
}
