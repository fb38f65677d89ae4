//! Status publisher.
//!
//! Holds the latest [`EngineStatus`] behind an atomically swapped `Arc` so
//! pulls never see a half-built snapshot. Push subscribers get the same
//! `Arc` through a bounded channel; a full channel loses that update
//! rather than holding up the engine, and a subscriber that keeps lagging
//! or whose receiver is gone is disconnected.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use veil_types::{ProtectionToggles, SubscriptionId};

use crate::assessment::RiskAssessment;
use crate::config::PublisherConfig;
use crate::events::{RiskEvent, Statistics};
use crate::ingest::IngestStats;
use crate::store::EvictionStats;

/// Point-in-time view of everything the engine exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Current assessment, flattened so the score, level and strategy sit
    /// at the top level.
    #[serde(flatten)]
    pub assessment: RiskAssessment,
    pub toggles: ProtectionToggles,
    pub statistics: Statistics,
    pub recent_events: Vec<RiskEvent>,
    pub ingest: IngestStats,
    /// Store entries evicted by capacity or TTL.
    pub evictions: EvictionStats,
    /// Set when the latest tick failed; the assessment is the last good one.
    pub degraded: bool,
    /// Increments with every publish.
    pub version: u64,
    pub published_at: DateTime<Utc>,
}

impl EngineStatus {
    /// Status before the first tick.
    pub fn initial(toggles: ProtectionToggles, now: DateTime<Utc>) -> Self {
        Self {
            assessment: RiskAssessment::initial(now),
            toggles,
            statistics: Statistics::default(),
            recent_events: Vec::new(),
            ingest: IngestStats::default(),
            evictions: EvictionStats::default(),
            degraded: false,
            version: 0,
            published_at: now,
        }
    }
}

/// A push subscription returned by [`StatusPublisher::subscribe`].
pub struct StatusSubscription {
    pub id: SubscriptionId,
    pub receiver: mpsc::Receiver<Arc<EngineStatus>>,
}

struct Subscriber {
    sender: mpsc::Sender<Arc<EngineStatus>>,
    consecutive_drops: u32,
}

/// Publishes engine status to pullers and push subscribers.
pub struct StatusPublisher {
    config: PublisherConfig,
    current: RwLock<Arc<EngineStatus>>,
    subscribers: DashMap<SubscriptionId, Subscriber>,
}

impl StatusPublisher {
    pub fn new(config: PublisherConfig, initial: EngineStatus) -> Self {
        Self {
            config,
            current: RwLock::new(Arc::new(initial)),
            subscribers: DashMap::new(),
        }
    }

    /// Latest published status.
    pub fn get_status(&self) -> Arc<EngineStatus> {
        self.current.read().clone()
    }

    /// Replace the current status and push it to subscribers. Returns the
    /// number of subscribers it was delivered to.
    pub fn publish(&self, mut status: EngineStatus) -> usize {
        let published = {
            let mut current = self.current.write();
            status.version = current.version + 1;
            let published = Arc::new(status);
            *current = published.clone();
            published
        };
        self.push(published)
    }

    /// Re-publish the current status flagged as degraded.
    pub fn mark_degraded(&self, now: DateTime<Utc>) -> usize {
        let current = self.get_status();
        if current.degraded {
            return 0;
        }
        let mut status = (*current).clone();
        status.degraded = true;
        status.published_at = now;
        self.publish(status)
    }

    /// Subscribe with a bounded receiver.
    pub fn subscribe(&self) -> StatusSubscription {
        let (sender, receiver) = mpsc::channel(self.config.subscriber_buffer);
        let id = SubscriptionId::generate();
        self.subscribers.insert(
            id.clone(),
            Subscriber {
                sender,
                consecutive_drops: 0,
            },
        );
        info!(subscription = %id, "Status subscriber added");
        StatusSubscription { id, receiver }
    }

    /// Subscribe with a callback driven from a spawned task. Must be called
    /// inside a Tokio runtime.
    pub fn subscribe_with<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(Arc<EngineStatus>) + Send + 'static,
    {
        let StatusSubscription { id, mut receiver } = self.subscribe();
        tokio::spawn(async move {
            while let Some(status) = receiver.recv().await {
                callback(status);
            }
        });
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let removed = self.subscribers.remove(id).is_some();
        if removed {
            info!(subscription = %id, "Status subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn push(&self, status: Arc<EngineStatus>) -> usize {
        let mut delivered = 0;
        let mut disconnected = Vec::new();

        for mut entry in self.subscribers.iter_mut() {
            match entry.sender.try_send(status.clone()) {
                Ok(()) => {
                    entry.consecutive_drops = 0;
                    delivered += 1;
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    entry.consecutive_drops += 1;
                    debug!(
                        subscription = %entry.key(),
                        drops = entry.consecutive_drops,
                        "Subscriber lagging, update dropped"
                    );
                    if entry.consecutive_drops >= self.config.max_consecutive_drops {
                        disconnected.push(entry.key().clone());
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    disconnected.push(entry.key().clone());
                }
            }
        }

        for id in disconnected {
            if self.subscribers.remove(&id).is_some() {
                warn!(subscription = %id, "Status subscriber disconnected");
            }
        }
        delivered
    }
}
