//! Signal ingest gateway.
//!
//! Producers call [`IngestGateway::accept`] from any thread. Admission
//! validates the observation, stamps it with a monotonic sequence number and
//! queues it for the next tick. The queue is bounded: when it is full the
//! oldest unprocessed observation is dropped so producers never wait.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use veil_types::{Observation, ObservationKind, SequenceNumber, SequencedObservation};

use crate::config::IngestConfig;
use crate::error::{EngineError, EngineResult};

/// Result of offering an observation to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Queued with this sequence number.
    Accepted(SequenceNumber),
    /// Refused; the reason is logged and counted.
    Rejected(String),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted(_))
    }
}

/// Gateway counters, included in the status snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub accepted: u64,
    pub rejected: u64,
    pub dropped: u64,
    pub queued: usize,
    pub last_sequence: u64,
}

/// Bounded, non-blocking intake for observations.
pub struct IngestGateway {
    config: IngestConfig,
    queue: Mutex<VecDeque<SequencedObservation>>,
    next_sequence: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
}

impl IngestGateway {
    pub fn new(config: IngestConfig) -> Self {
        let capacity = config.queue_capacity;
        Self {
            config,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            next_sequence: AtomicU64::new(1),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Offer an observation. Never blocks beyond the O(1) queue push and
    /// never returns an error to the producer.
    pub fn accept(&self, observation: Observation, now: DateTime<Utc>) -> Admission {
        if let Err(e) = self.validate(&observation, now) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(kind = observation.kind.name(), error = %e, "Rejected observation");
            return Admission::Rejected(e.to_string());
        }

        let mut queue = self.queue.lock();

        if queue.len() >= self.config.queue_capacity {
            if let Some(oldest) = queue.pop_front() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    dropped_sequence = %oldest.sequence,
                    capacity = self.config.queue_capacity,
                    "Ingest queue full, dropped oldest observation"
                );
            }
        }

        // Assigned under the queue lock so queue order matches sequence order
        let sequence = SequenceNumber::new(self.next_sequence.fetch_add(1, Ordering::SeqCst));
        queue.push_back(SequencedObservation {
            sequence,
            observation,
            ingested_at: now,
        });
        drop(queue);

        self.accepted.fetch_add(1, Ordering::Relaxed);
        Admission::Accepted(sequence)
    }

    /// Take every queued observation, oldest sequence first.
    pub fn drain(&self) -> Vec<SequencedObservation> {
        let drained: Vec<_> = self.queue.lock().drain(..).collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Drained ingest queue");
        }
        drained
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            queued: self.queue.lock().len(),
            last_sequence: self.next_sequence.load(Ordering::SeqCst).saturating_sub(1),
        }
    }

    fn validate(&self, observation: &Observation, now: DateTime<Utc>) -> EngineResult<()> {
        let earliest = now - self.config.max_past_skew();
        let latest = now + self.config.max_future_skew();
        if observation.timestamp < earliest || observation.timestamp > latest {
            return Err(malformed(format!(
                "timestamp {} outside tolerance [{}, {}]",
                observation.timestamp, earliest, latest
            )));
        }

        match &observation.kind {
            ObservationKind::PlayerSighting { name, distance, .. } => {
                require_text("name", name)?;
                if !distance.is_finite() || *distance < 0.0 {
                    return Err(malformed(format!("invalid distance {}", distance)));
                }
                if *distance > self.config.max_distance {
                    return Err(malformed(format!(
                        "distance {} beyond plausible range {}",
                        distance, self.config.max_distance
                    )));
                }
            }
            ObservationKind::ZoneUpdate { zone, planet, .. } => {
                require_text("zone", zone)?;
                require_text("planet", planet)?;
            }
            ObservationKind::ChatPatternFlag {
                pattern,
                confidence,
                ..
            } => {
                require_text("pattern", pattern)?;
                if !(0.0..=1.0).contains(confidence) {
                    return Err(malformed(format!("confidence {} outside [0, 1]", confidence)));
                }
            }
            ObservationKind::RandomizationFired { behavior } => {
                require_text("behavior", behavior)?;
            }
            ObservationKind::LogSanitizationFired { .. } => {}
        }

        Ok(())
    }
}

fn malformed(message: String) -> EngineError {
    EngineError::MalformedObservation(message)
}

fn require_text(field: &str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(malformed(format!("missing field: {}", field)));
    }
    Ok(())
}
