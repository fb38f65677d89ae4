//! Property tests for store bounds, counter monotonicity, score range and
//! snapshot consistency under concurrent writers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use veil_engine::{
    LevelThresholds, NewRiskEvent, RiskEventKind, RiskScorer, RollingStore, ScoringConfig,
    StoreConfig, StoreEntry,
};
use veil_types::{Observation, PlayerRiskType, RiskLevel, SequenceNumber, SequencedObservation};

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

fn entry(seq: u64, observation: Observation) -> StoreEntry {
    StoreEntry::Observation(SequencedObservation {
        sequence: SequenceNumber::new(seq),
        ingested_at: observation.timestamp,
        observation,
    })
}

fn arb_risk_type() -> impl Strategy<Value = PlayerRiskType> {
    prop_oneof![
        Just(PlayerRiskType::Friendly),
        Just(PlayerRiskType::Neutral),
        Just(PlayerRiskType::Suspicious),
        Just(PlayerRiskType::Hostile),
        Just(PlayerRiskType::Staff),
    ]
}

fn arb_level() -> impl Strategy<Value = RiskLevel> {
    prop_oneof![
        Just(RiskLevel::Low),
        Just(RiskLevel::Medium),
        Just(RiskLevel::High),
        Just(RiskLevel::Critical),
    ]
}

#[derive(Debug, Clone)]
enum Op {
    Sighting {
        player: u8,
        distance: f64,
        risk_type: PlayerRiskType,
    },
    Zone {
        zone: u8,
        level: RiskLevel,
        players: u32,
    },
    Event {
        kind: RiskEventKind,
        level: RiskLevel,
    },
    Chat,
    Advance(i64),
}

fn arb_event_kind() -> impl Strategy<Value = RiskEventKind> {
    prop_oneof![
        Just(RiskEventKind::Detection),
        Just(RiskEventKind::StrategyChange),
        Just(RiskEventKind::LogSanitized),
        Just(RiskEventKind::Randomized),
        Just(RiskEventKind::ActionSkipped),
        Just(RiskEventKind::ActionFailed),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..24, 0.0f64..200.0, arb_risk_type()).prop_map(|(player, distance, risk_type)| {
            Op::Sighting { player, distance, risk_type }
        }),
        2 => (0u8..8, arb_level(), 0u32..60).prop_map(|(zone, level, players)| Op::Zone {
            zone,
            level,
            players
        }),
        2 => (arb_event_kind(), arb_level()).prop_map(|(kind, level)| Op::Event { kind, level }),
        1 => Just(Op::Chat),
        1 => (1i64..90).prop_map(Op::Advance),
    ]
}

fn small_store() -> RollingStore {
    RollingStore::new(StoreConfig {
        player_capacity: 5,
        zone_capacity: 3,
        event_capacity: 10,
        chat_history_capacity: 4,
        ..StoreConfig::default()
    })
}

fn apply(store: &RollingStore, op: &Op, seq: u64, now: &mut DateTime<Utc>) {
    match op {
        Op::Sighting {
            player,
            distance,
            risk_type,
        } => {
            let obs = Observation::player_sighting(
                format!("p{}", player),
                "Rebel",
                *distance,
                *risk_type,
                *now,
            );
            store.record(entry(seq, obs), *now);
        }
        Op::Zone {
            zone,
            level,
            players,
        } => {
            let obs =
                Observation::zone_update(format!("z{}", zone), "Naboo", *level, *players, *now);
            store.record(entry(seq, obs), *now);
        }
        Op::Event { kind, level } => {
            store.record(
                StoreEntry::Event(NewRiskEvent::new(*kind, *level, "test", *now)),
                *now,
            );
        }
        Op::Chat => {
            store.record(StoreEntry::Chat(*now), *now);
        }
        Op::Advance(secs) => {
            *now += Duration::seconds(*secs);
            store.sweep(*now);
        }
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn store_never_exceeds_capacity(ops in prop::collection::vec(arb_op(), 1..120)) {
        let store = small_store();
        let mut now = epoch();

        for (i, op) in ops.iter().enumerate() {
            apply(&store, op, i as u64 + 1, &mut now);
            let snapshot = store.snapshot();
            prop_assert!(snapshot.players.len() <= 5);
            prop_assert!(snapshot.zones.len() <= 3);
            prop_assert!(snapshot.events.len() <= 10);
            prop_assert!(snapshot.chat_history_size <= 4);
        }
    }

    #[test]
    fn capacity_eviction_removes_oldest_last_seen(
        names in prop::collection::vec(0u8..12, 1..80),
    ) {
        let store = RollingStore::new(StoreConfig {
            player_capacity: 4,
            player_ttl_secs: 86_400,
            ..StoreConfig::default()
        });
        let mut model: HashMap<String, DateTime<Utc>> = HashMap::new();
        let mut now = epoch();

        for (i, n) in names.iter().enumerate() {
            now += Duration::seconds(1);
            let name = format!("p{}", n);
            if !model.contains_key(&name) && model.len() == 4 {
                let oldest = model
                    .iter()
                    .min_by_key(|(_, seen)| **seen)
                    .map(|(k, _)| k.clone())
                    .unwrap();
                model.remove(&oldest);
            }
            model.insert(name.clone(), now);

            let obs = Observation::player_sighting(name, "Rebel", 10.0, PlayerRiskType::Neutral, now);
            store.record(entry(i as u64 + 1, obs), now);
        }

        let mut expected: Vec<_> = model.keys().cloned().collect();
        expected.sort();
        let actual: Vec<_> = store.snapshot().players.iter().map(|p| p.name.clone()).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn counters_never_decrease(ops in prop::collection::vec(arb_op(), 1..150)) {
        let store = small_store();
        let mut now = epoch();
        let mut previous = store.counters();

        for (i, op) in ops.iter().enumerate() {
            apply(&store, op, i as u64 + 1, &mut now);
            let current = store.counters();
            prop_assert!(current.dominates(&previous));
            previous = current;
        }
    }

    #[test]
    fn score_stays_in_unit_interval(ops in prop::collection::vec(arb_op(), 0..100)) {
        let store = RollingStore::new(StoreConfig::default());
        let scorer = RiskScorer::new(ScoringConfig::default());
        let mut now = epoch();

        for (i, op) in ops.iter().enumerate() {
            apply(&store, op, i as u64 + 1, &mut now);
            let score = scorer.score(&store.snapshot(), now).unwrap();
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }

    #[test]
    fn level_is_monotonic_in_score(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
        let thresholds = LevelThresholds::default();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(thresholds.level_for(low) <= thresholds.level_for(high));
    }

    #[test]
    fn level_is_monotonic_for_any_valid_thresholds(
        cuts in (0.01f64..0.33, 0.34f64..0.66, 0.67f64..0.99),
        a in 0.0f64..=1.0,
        b in 0.0f64..=1.0,
    ) {
        let thresholds = LevelThresholds { medium: cuts.0, high: cuts.1, critical: cuts.2 };
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(thresholds.level_for(low) <= thresholds.level_for(high));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Writers store players whose faction always spells out their
    /// distance; a torn entry would break that pairing.
    #[test]
    fn snapshots_never_observe_partial_writes(
        writers in 2usize..6,
        writes_per_writer in 50usize..300,
    ) {
        let store = Arc::new(RollingStore::new(StoreConfig {
            player_capacity: 16,
            event_capacity: 64,
            player_ttl_secs: 86_400,
            ..StoreConfig::default()
        }));
        let now = epoch();
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let store = store.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                let mut checked = 0usize;
                loop {
                    let finished = done.load(Ordering::SeqCst);
                    let snapshot = store.snapshot();
                    for player in &snapshot.players {
                        assert_eq!(player.faction, format!("{}", player.distance));
                        assert!(player.first_seen <= player.last_seen);
                    }
                    let sequences: Vec<_> = snapshot.events.iter().map(|e| e.sequence).collect();
                    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
                    checked += 1;
                    if finished {
                        break;
                    }
                }
                checked
            })
        };

        let handles: Vec<_> = (0..writers)
            .map(|w| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..writes_per_writer {
                        let distance = (w * 1000 + i) as f64;
                        let obs = Observation::player_sighting(
                            format!("p{}", i % 24),
                            format!("{}", distance),
                            distance,
                            PlayerRiskType::Suspicious,
                            now,
                        );
                        store.record(entry(i as u64, obs), now);
                        if i % 10 == 0 {
                            store.record(
                                StoreEntry::Event(NewRiskEvent::new(
                                    RiskEventKind::Detection,
                                    RiskLevel::High,
                                    "logged",
                                    now,
                                )),
                                now,
                            );
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
        let checked = reader.join().unwrap();
        prop_assert!(checked > 0);

        let snapshot = store.snapshot();
        prop_assert!(snapshot.players.len() <= 16);
        let expected_events = (0..writes_per_writer).filter(|i| i % 10 == 0).count() * writers;
        prop_assert_eq!(snapshot.counters.total_events as usize, expected_events);
    }
}
