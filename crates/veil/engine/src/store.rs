//! Rolling statistics store.
//!
//! Holds recent player sightings, zone state, risk events and action
//! histories in bounded buffers. [`RollingStore::record`] is the single
//! mutation entry point and runs under the write lock, so a
//! [`StoreSnapshot`] can never observe a half-applied update.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use veil_types::{
    ObservationKind, PlayerRiskType, RiskLevel, SequenceNumber, SequencedObservation,
};

use crate::action::ActionType;
use crate::config::StoreConfig;
use crate::events::{EventCounters, NewRiskEvent, RiskEvent, RiskEventKind, Statistics};

/// A player seen near the operator, keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyPlayer {
    pub name: String,
    pub faction: String,
    pub distance: f64,
    pub risk_type: PlayerRiskType,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub sightings: u32,
}

/// A zone the operator is in or near, keyed by planet and zone name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveZone {
    pub zone: String,
    pub planet: String,
    pub risk_level: RiskLevel,
    pub player_count: u32,
    pub last_seen: DateTime<Utc>,
}

impl ActiveZone {
    fn key(planet: &str, zone: &str) -> String {
        format!("{}/{}", planet, zone)
    }
}

/// A dispatched movement action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub action: ActionType,
    pub at: DateTime<Utc>,
}

/// Counts of entries evicted to respect capacity or TTL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionStats {
    pub players_expired: u64,
    pub players_displaced: u64,
    pub zones_expired: u64,
    pub zones_displaced: u64,
    pub events_displaced: u64,
}

/// Everything that can be written into the store.
#[derive(Debug, Clone)]
pub enum StoreEntry {
    /// An admitted observation.
    Observation(SequencedObservation),
    /// A risk event produced by the engine.
    Event(NewRiskEvent),
    /// A chat message was sent.
    Chat(DateTime<Utc>),
    /// A movement action was sent.
    Movement(MovementRecord),
}

/// Immutable point-in-time copy of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub players: Vec<NearbyPlayer>,
    pub zones: Vec<ActiveZone>,
    pub events: Vec<RiskEvent>,
    pub counters: EventCounters,
    pub evictions: EvictionStats,
    pub chat_history_size: usize,
    pub movement_history_size: usize,
}

impl StoreSnapshot {
    /// Aggregate statistics, counting recent activity inside `window`.
    pub fn statistics(&self, window: Duration, now: DateTime<Utc>) -> Statistics {
        let since = now - window;
        Statistics {
            counters: self.counters,
            chat_history_size: self.chat_history_size,
            movement_history_size: self.movement_history_size,
            recent_activity: self.events.iter().filter(|e| e.timestamp >= since).count(),
        }
    }

    /// The most recent `n` events, newest last.
    pub fn recent_events(&self, n: usize) -> Vec<RiskEvent> {
        let skip = self.events.len().saturating_sub(n);
        self.events[skip..].to_vec()
    }
}

#[derive(Debug)]
struct StoreState {
    players: HashMap<String, NearbyPlayer>,
    zones: HashMap<String, ActiveZone>,
    events: VecDeque<RiskEvent>,
    chat_history: VecDeque<DateTime<Utc>>,
    movement_history: VecDeque<MovementRecord>,
    counters: EventCounters,
    evictions: EvictionStats,
    next_event_sequence: u64,
}

/// Bounded in-memory store behind a single-writer lock.
pub struct RollingStore {
    config: StoreConfig,
    state: RwLock<StoreState>,
}

impl RollingStore {
    pub fn new(config: StoreConfig) -> Self {
        let state = StoreState {
            players: HashMap::with_capacity(config.player_capacity),
            zones: HashMap::with_capacity(config.zone_capacity),
            events: VecDeque::with_capacity(config.event_capacity),
            chat_history: VecDeque::with_capacity(config.chat_history_capacity),
            movement_history: VecDeque::with_capacity(config.movement_history_capacity),
            counters: EventCounters::default(),
            evictions: EvictionStats::default(),
            next_event_sequence: 1,
        };
        Self {
            config,
            state: RwLock::new(state),
        }
    }

    /// Apply one entry. Expired players and zones are evicted first. Returns
    /// the risk event appended by this entry, if any.
    pub fn record(&self, entry: StoreEntry, now: DateTime<Utc>) -> Option<RiskEvent> {
        let mut state = self.state.write();
        self.expire(&mut state, now);

        match entry {
            StoreEntry::Observation(observation) => self.apply_observation(&mut state, observation),
            StoreEntry::Event(event) => Some(self.append(&mut state, event)),
            StoreEntry::Chat(at) => {
                push_bounded(&mut state.chat_history, at, self.config.chat_history_capacity);
                None
            }
            StoreEntry::Movement(record) => {
                push_bounded(
                    &mut state.movement_history,
                    record,
                    self.config.movement_history_capacity,
                );
                None
            }
        }
    }

    /// Evict stale players and zones without recording anything. Returns the
    /// number of entries evicted.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.write();
        let evicted = self.expire(&mut state, now);
        if evicted > 0 {
            debug!(evicted, "Swept stale entries");
        }
        evicted
    }

    /// Consistent copy of the whole store.
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        let state = self.state.read();

        let mut players: Vec<_> = state.players.values().cloned().collect();
        players.sort_by(|a, b| a.name.cmp(&b.name));
        let mut zones: Vec<_> = state.zones.values().cloned().collect();
        zones.sort_by(|a, b| (&a.planet, &a.zone).cmp(&(&b.planet, &b.zone)));

        Arc::new(StoreSnapshot {
            players,
            zones,
            events: state.events.iter().cloned().collect(),
            counters: state.counters,
            evictions: state.evictions,
            chat_history_size: state.chat_history.len(),
            movement_history_size: state.movement_history.len(),
        })
    }

    pub fn counters(&self) -> EventCounters {
        self.state.read().counters
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn apply_observation(
        &self,
        state: &mut StoreState,
        sequenced: SequencedObservation,
    ) -> Option<RiskEvent> {
        let weight = sequenced.observation.weight;
        let timestamp = sequenced.observation.timestamp;

        match sequenced.observation.kind {
            ObservationKind::PlayerSighting {
                name,
                faction,
                distance,
                risk_type,
            } => {
                if let Some(player) = state.players.get_mut(&name) {
                    player.faction = faction;
                    player.distance = distance;
                    player.risk_type = risk_type;
                    player.last_seen = player.last_seen.max(timestamp);
                    player.sightings = player.sightings.saturating_add(1);
                    return None;
                }

                if state.players.len() >= self.config.player_capacity {
                    if let Some(oldest) = oldest_key(&state.players, |p| p.last_seen) {
                        state.players.remove(&oldest);
                        state.evictions.players_displaced += 1;
                        debug!(player = %oldest, "Player capacity reached, evicted oldest");
                    }
                }

                state.players.insert(
                    name.clone(),
                    NearbyPlayer {
                        name,
                        faction,
                        distance,
                        risk_type,
                        first_seen: timestamp,
                        last_seen: timestamp,
                        sightings: 1,
                    },
                );
                None
            }
            ObservationKind::ZoneUpdate {
                zone,
                planet,
                risk_level,
                player_count,
            } => {
                let key = ActiveZone::key(&planet, &zone);
                if let Some(existing) = state.zones.get_mut(&key) {
                    existing.risk_level = risk_level;
                    existing.player_count = player_count;
                    existing.last_seen = existing.last_seen.max(timestamp);
                    return None;
                }

                if state.zones.len() >= self.config.zone_capacity {
                    if let Some(oldest) = oldest_key(&state.zones, |z| z.last_seen) {
                        state.zones.remove(&oldest);
                        state.evictions.zones_displaced += 1;
                        debug!(zone = %oldest, "Zone capacity reached, evicted oldest");
                    }
                }

                state.zones.insert(
                    key,
                    ActiveZone {
                        zone,
                        planet,
                        risk_level,
                        player_count,
                        last_seen: timestamp,
                    },
                );
                None
            }
            ObservationKind::ChatPatternFlag {
                pattern,
                confidence,
                ..
            } => {
                let event = NewRiskEvent::new(
                    RiskEventKind::Detection,
                    weight,
                    "logged",
                    timestamp,
                )
                .with_detail(format!("chat pattern '{}' ({:.2})", pattern, confidence));
                Some(self.append(state, event))
            }
            ObservationKind::LogSanitizationFired { redacted_entries } => {
                let event =
                    NewRiskEvent::new(RiskEventKind::LogSanitized, weight, "logged", timestamp)
                        .with_detail(format!("{} entries redacted", redacted_entries));
                Some(self.append(state, event))
            }
            ObservationKind::RandomizationFired { behavior } => {
                let event = NewRiskEvent::new(RiskEventKind::Randomized, weight, "logged", timestamp)
                    .with_detail(behavior);
                Some(self.append(state, event))
            }
        }
    }

    fn append(&self, state: &mut StoreState, event: NewRiskEvent) -> RiskEvent {
        let event = event.stamp(SequenceNumber::new(state.next_event_sequence));
        state.next_event_sequence += 1;
        state.counters.account(&event);

        if state.events.len() >= self.config.event_capacity {
            state.events.pop_front();
            state.evictions.events_displaced += 1;
        }
        state.events.push_back(event.clone());
        event
    }

    fn expire(&self, state: &mut StoreState, now: DateTime<Utc>) -> usize {
        let player_cutoff = now - self.config.player_ttl();
        let zone_cutoff = now - self.config.zone_ttl();

        let players_before = state.players.len();
        state.players.retain(|_, p| p.last_seen >= player_cutoff);
        let players_expired = players_before - state.players.len();

        let zones_before = state.zones.len();
        state.zones.retain(|_, z| z.last_seen >= zone_cutoff);
        let zones_expired = zones_before - state.zones.len();

        state.evictions.players_expired += players_expired as u64;
        state.evictions.zones_expired += zones_expired as u64;
        players_expired + zones_expired
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, capacity: usize) {
    if buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

/// Key of the entry with the oldest `last_seen`, ties broken by key.
fn oldest_key<V>(map: &HashMap<String, V>, last_seen: impl Fn(&V) -> DateTime<Utc>) -> Option<String> {
    map.iter()
        .min_by(|(ka, a), (kb, b)| last_seen(a).cmp(&last_seen(b)).then_with(|| ka.cmp(kb)))
        .map(|(k, _)| k.clone())
}
