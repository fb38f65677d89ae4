//! Action requests and the actuator seam.
//!
//! The engine never moves, chats or edits logs itself; it emits
//! [`ActionRequest`]s to an external [`Actuator`] and reacts to its answer.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use veil_types::{ActionRequestId, Protection, Strategy};

use crate::error::{EngineError, EngineResult};

/// Kinds of action the engine can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    PathDeviation,
    SafeSpotWait,
    MountEscape,
    ZoneChange,
    SessionPause,
    IdleEmote,
    MoodChange,
    CameraWiggle,
    MovementJitter,
    LogSanitize,
    ChatMessage,
}

impl ActionType {
    /// Action that carries out a strategy. `log_only` needs none.
    pub fn for_strategy(strategy: Strategy) -> Option<ActionType> {
        match strategy {
            Strategy::LogOnly => None,
            Strategy::SoftPathDeviation => Some(ActionType::PathDeviation),
            Strategy::SafeSpotWait => Some(ActionType::SafeSpotWait),
            Strategy::MountEscape => Some(ActionType::MountEscape),
            Strategy::ZoneChange => Some(ActionType::ZoneChange),
            Strategy::SessionPause => Some(ActionType::SessionPause),
        }
    }

    /// Strategy this action carries out, if any.
    pub fn strategy(&self) -> Option<Strategy> {
        match self {
            ActionType::PathDeviation => Some(Strategy::SoftPathDeviation),
            ActionType::SafeSpotWait => Some(Strategy::SafeSpotWait),
            ActionType::MountEscape => Some(Strategy::MountEscape),
            ActionType::ZoneChange => Some(Strategy::ZoneChange),
            ActionType::SessionPause => Some(Strategy::SessionPause),
            _ => None,
        }
    }

    /// Protection that governs this action, if any.
    pub fn protection(&self) -> Option<Protection> {
        match self {
            ActionType::IdleEmote => Some(Protection::IdleEmotes),
            ActionType::MoodChange => Some(Protection::RandomizeMood),
            ActionType::CameraWiggle => Some(Protection::CameraWiggles),
            ActionType::MovementJitter => Some(Protection::RandomizeMovement),
            ActionType::LogSanitize => Some(Protection::SanitizeLogs),
            ActionType::ChatMessage => Some(Protection::ChatRateLimit),
            _ => None,
        }
    }

    /// Actions that move the operator.
    pub fn is_movement(&self) -> bool {
        matches!(
            self,
            ActionType::PathDeviation
                | ActionType::SafeSpotWait
                | ActionType::MountEscape
                | ActionType::ZoneChange
                | ActionType::MovementJitter
        )
    }

    /// Actions that exist to add behavioral noise.
    pub fn is_randomization(&self) -> bool {
        matches!(
            self,
            ActionType::IdleEmote
                | ActionType::MoodChange
                | ActionType::CameraWiggle
                | ActionType::MovementJitter
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::PathDeviation => "path_deviation",
            ActionType::SafeSpotWait => "safe_spot_wait",
            ActionType::MountEscape => "mount_escape",
            ActionType::ZoneChange => "zone_change",
            ActionType::SessionPause => "session_pause",
            ActionType::IdleEmote => "idle_emote",
            ActionType::MoodChange => "mood_change",
            ActionType::CameraWiggle => "camera_wiggle",
            ActionType::MovementJitter => "movement_jitter",
            ActionType::LogSanitize => "log_sanitize",
            ActionType::ChatMessage => "chat_message",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded request for the actuator to perform one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: ActionRequestId,
    pub action_type: ActionType,
    pub parameters: serde_json::Value,
    pub issued_at: DateTime<Utc>,
}

impl ActionRequest {
    pub fn new(
        action_type: ActionType,
        parameters: serde_json::Value,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ActionRequestId::generate(),
            action_type,
            parameters,
            issued_at,
        }
    }
}

/// Executes action requests on behalf of the engine.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Perform the action. An `Err` is reported back as an actuator failure.
    async fn execute(&self, request: &ActionRequest) -> EngineResult<()>;
}

/// No-op actuator for testing and dry runs.
pub struct NoOpActuator;

#[async_trait]
impl Actuator for NoOpActuator {
    async fn execute(&self, request: &ActionRequest) -> EngineResult<()> {
        debug!(action = %request.action_type, "No-op executing action");
        Ok(())
    }
}

/// Actuator that fails specific action types.
pub struct FailingActuator {
    fail_actions: Vec<ActionType>,
}

impl FailingActuator {
    pub fn new(fail_actions: Vec<ActionType>) -> Self {
        Self { fail_actions }
    }
}

#[async_trait]
impl Actuator for FailingActuator {
    async fn execute(&self, request: &ActionRequest) -> EngineResult<()> {
        if self.fail_actions.contains(&request.action_type) {
            Err(EngineError::ActuatorFailure {
                action: request.action_type.to_string(),
                reason: "simulated failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Actuator that accepts everything and remembers what it was asked.
#[derive(Default, Clone)]
pub struct RecordingActuator {
    requests: Arc<Mutex<Vec<ActionRequest>>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<ActionRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self, action_type: ActionType) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.action_type == action_type)
            .count()
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn execute(&self, request: &ActionRequest) -> EngineResult<()> {
        self.requests.lock().push(request.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_action_mapping() {
        for strategy in Strategy::ALL {
            match ActionType::for_strategy(strategy) {
                Some(action) => assert_eq!(action.strategy(), Some(strategy)),
                None => assert_eq!(strategy, Strategy::LogOnly),
            }
        }
    }

    #[test]
    fn test_protection_actions_have_no_strategy() {
        for action in [
            ActionType::IdleEmote,
            ActionType::MoodChange,
            ActionType::CameraWiggle,
            ActionType::MovementJitter,
            ActionType::LogSanitize,
            ActionType::ChatMessage,
        ] {
            assert!(action.protection().is_some());
            assert!(action.strategy().is_none());
        }
    }

    #[tokio::test]
    async fn test_failing_actuator() {
        let actuator = FailingActuator::new(vec![ActionType::MountEscape]);
        let now = Utc::now();

        let mount = ActionRequest::new(ActionType::MountEscape, serde_json::Value::Null, now);
        assert!(actuator.execute(&mount).await.is_err());

        let emote = ActionRequest::new(ActionType::IdleEmote, serde_json::Value::Null, now);
        assert!(actuator.execute(&emote).await.is_ok());
    }
}
