//! Veil Types - Core type definitions for the operator risk engine
//!
//! Shared vocabulary between the engine, its producers and its observers:
//! - Observations and their kinds
//! - Risk levels, trends and evasion strategies
//! - Background protection toggles
//! - Operating profiles

pub mod error;
pub mod ids;
pub mod observation;
pub mod profile;
pub mod protection;
pub mod risk;

pub use error::ParseError;
pub use ids::{ActionRequestId, SequenceNumber, SubscriptionId};
pub use observation::{Observation, ObservationKind, PlayerRiskType, SequencedObservation};
pub use profile::OperatingProfile;
pub use protection::{Protection, ProtectionToggles};
pub use risk::{RiskLevel, Strategy, Trend};
