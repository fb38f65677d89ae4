//! # Veil Engine - Risk Assessment and Evasion Policy
//!
//! Continuously estimates the operator's risk of being flagged as
//! automated or drawn into unwanted player conflict, picks an evasion
//! strategy from that estimate, and paces the background protections that
//! blur the operator's behavioral signature.
//!
//! ## Key Components
//!
//! - [`IngestGateway`]: validates and sequences observations from any
//!   number of producers without blocking them
//! - [`RollingStore`]: bounded player, zone and event history with
//!   consistent snapshots
//! - [`RiskScorer`] and [`TrendTracker`]: snapshot to score, level and trend
//! - [`StrategySelector`]: hysteretic strategy state machine with a
//!   critical escape hatch
//! - [`ActionDispatcher`]: idempotent, rate-limited action requests with
//!   retries and fallback
//! - [`StatusPublisher`]: pull and push status snapshots
//! - [`RiskEngine`]: wires the above into the assessment tick
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use veil_engine::{EngineConfig, NoOpActuator, RiskEngine, SystemClock};
//! use veil_types::{Observation, OperatingProfile, PlayerRiskType};
//!
//! # async fn example() -> veil_engine::EngineResult<()> {
//! let config = EngineConfig::for_profile(OperatingProfile::Balanced);
//! let engine = Arc::new(RiskEngine::new(
//!     config,
//!     Arc::new(NoOpActuator),
//!     Arc::new(SystemClock),
//! )?);
//!
//! engine.submit_observation(Observation::player_sighting(
//!     "Vex",
//!     "Rebel",
//!     12.0,
//!     PlayerRiskType::Hostile,
//!     chrono::Utc::now(),
//! ));
//!
//! let report = engine.tick().await?;
//! println!("{} -> {}", report.assessment.risk_level, report.assessment.strategy);
//!
//! let handle = engine.start();
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure Policy
//!
//! - Malformed observations are rejected and counted, never raised
//! - Capacity overflow evicts the oldest entries and counts them
//! - Actuator failures are retried, recorded and followed by a fallback
//! - Invalid configuration and out-of-range scores stop the engine
//!
//! Nothing is persisted; a restart begins at `log_only` with zeroed
//! statistics.

pub mod action;
pub mod assessment;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod ingest;
pub mod publisher;
pub mod scorer;
pub mod selector;
pub mod store;

pub use action::{
    ActionRequest, ActionType, Actuator, FailingActuator, NoOpActuator, RecordingActuator,
};
pub use assessment::RiskAssessment;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    DispatchConfig, EngineConfig, IngestConfig, IntervalRange, LevelThresholds, PublisherConfig,
    ScoringConfig, StoreConfig, StrategyConfig,
};
pub use dispatcher::{ActionDispatcher, ActionReport, DispatchDecision};
pub use engine::{EngineHandle, RiskEngine, TickReport};
pub use error::{EngineError, EngineResult};
pub use events::{EventCounters, NewRiskEvent, RiskEvent, RiskEventKind, Statistics};
pub use ingest::{Admission, IngestGateway, IngestStats};
pub use publisher::{EngineStatus, StatusPublisher, StatusSubscription};
pub use scorer::{RiskScorer, ScoreBreakdown, TrendTracker};
pub use selector::{StrategySelector, StrategyTransition, TransitionReason};
pub use store::{
    ActiveZone, EvictionStats, MovementRecord, NearbyPlayer, RollingStore, StoreEntry,
    StoreSnapshot,
};
