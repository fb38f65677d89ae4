//! Actuator that only logs what it is asked to do.
//!
//! Stands in for the movement/chat/log actuator when the daemon runs
//! without one attached.

use async_trait::async_trait;
use tracing::info;
use veil_engine::{ActionRequest, ActionType, Actuator, EngineResult};

/// Logs every action request and reports success.
pub struct LoggingActuator;

#[async_trait]
impl Actuator for LoggingActuator {
    async fn execute(&self, request: &ActionRequest) -> EngineResult<()> {
        if request.action_type == ActionType::ChatMessage {
            // never log chat text
            let length = request
                .parameters
                .get("text")
                .and_then(|t| t.as_str())
                .map_or(0, str::len);
            info!(id = %request.id, action = %request.action_type, length, "Action requested");
        } else {
            info!(
                id = %request.id,
                action = %request.action_type,
                parameters = %request.parameters,
                "Action requested"
            );
        }
        Ok(())
    }
}
