//! End-to-end engine scenarios driven by a manual clock.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use veil_engine::{
    ActionReport, ActionType, Actuator, Clock, EngineConfig, FailingActuator, ManualClock,
    RecordingActuator, RiskEngine, RiskEventKind,
};
use veil_types::{Observation, PlayerRiskType, Protection, RiskLevel, Strategy};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn engine_with(
    config: EngineConfig,
    actuator: Arc<dyn Actuator>,
) -> (Arc<RiskEngine>, ManualClock) {
    let clock = ManualClock::default();
    let engine = RiskEngine::new(config, actuator, Arc::new(clock.clone())).unwrap();
    (Arc::new(engine), clock)
}

fn sight(engine: &RiskEngine, clock: &ManualClock, name: &str, distance: f64) {
    let admission = engine.submit_observation(Observation::player_sighting(
        name,
        "Rebel",
        distance,
        PlayerRiskType::Hostile,
        clock.now(),
    ));
    assert!(admission.is_accepted(), "sighting of {} rejected", name);
}

fn zone(engine: &RiskEngine, clock: &ManualClock, level: RiskLevel, players: u32) {
    let admission = engine.submit_observation(Observation::zone_update(
        "Mos Eisley",
        "Tatooine",
        level,
        players,
        clock.now(),
    ));
    assert!(admission.is_accepted());
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_close_hostiles_escalate_to_mount_escape() {
    let actuator = RecordingActuator::new();
    let (engine, clock) = engine_with(EngineConfig::default(), Arc::new(actuator.clone()));

    let before = engine.get_status();
    assert_eq!(before.assessment.risk_level, RiskLevel::Low);
    assert_eq!(before.assessment.strategy, Strategy::LogOnly);

    for name in ["Vex", "Dray", "Kor"] {
        sight(&engine, &clock, name, 18.0);
        clock.advance_millis(900);
    }

    let report = engine.tick().await.unwrap();
    assert_eq!(report.assessment.risk_level, RiskLevel::High);
    assert_eq!(report.assessment.strategy, Strategy::MountEscape);

    let after = engine.get_status();
    assert_eq!(after.assessment.strategy, Strategy::MountEscape);
    assert_eq!(
        after.statistics.counters.risk_events,
        before.statistics.counters.risk_events + 1
    );
    assert!(after
        .recent_events
        .iter()
        .any(|e| e.action_taken == "strategy_change:mount_escape"));
    assert_eq!(actuator.count(ActionType::MountEscape), 1);
}

#[tokio::test]
async fn chat_rate_limit_permits_exactly_the_cap() {
    let mut config = EngineConfig::default();
    config.dispatch.chat_messages_per_minute = 3;
    let actuator = RecordingActuator::new();
    let (engine, clock) = engine_with(config, Arc::new(actuator.clone()));
    assert!(engine.toggles().chat_rate_limit);

    let mut reports = Vec::new();
    for i in 0..10 {
        reports.push(engine.send_chat(&format!("hello there {}", i)).await);
        clock.advance_millis(100);
    }

    assert_eq!(reports.iter().filter(|r| r.is_completed()).count(), 3);
    assert_eq!(reports.iter().filter(|r| r.is_rate_limited()).count(), 7);
    assert_eq!(actuator.count(ActionType::ChatMessage), 3);

    let stats = engine.get_status().statistics;
    assert_eq!(stats.counters.rate_limited_messages, 7);
    assert_eq!(stats.chat_history_size, 3);
}

#[tokio::test]
async fn dwell_time_holds_strategy_against_oscillation() {
    let (engine, clock) = engine_with(EngineConfig::default(), Arc::new(RecordingActuator::new()));
    let dwell = engine.config().strategy.dwell_time_secs;

    // two close hostiles: medium
    sight(&engine, &clock, "a", 10.0);
    sight(&engine, &clock, "b", 10.0);
    let report = engine.tick().await.unwrap();
    assert_eq!(report.assessment.risk_level, RiskLevel::Medium);
    assert_eq!(report.assessment.strategy, Strategy::SoftPathDeviation);

    // they move away at once: low, but the strategy holds
    clock.advance_secs(1);
    sight(&engine, &clock, "a", 150.0);
    sight(&engine, &clock, "b", 150.0);
    let report = engine.tick().await.unwrap();
    assert_eq!(report.assessment.risk_level, RiskLevel::Low);
    assert_eq!(report.assessment.strategy, Strategy::SoftPathDeviation);

    clock.advance_secs(dwell - 2);
    let report = engine.tick().await.unwrap();
    assert_eq!(report.assessment.strategy, Strategy::SoftPathDeviation);

    clock.advance_secs(1);
    let report = engine.tick().await.unwrap();
    assert_eq!(report.assessment.strategy, Strategy::LogOnly);
}

#[tokio::test]
async fn session_pause_only_exits_on_resume() {
    let (engine, clock) = engine_with(EngineConfig::default(), Arc::new(RecordingActuator::new()));

    for name in ["a", "b", "c"] {
        sight(&engine, &clock, name, 5.0);
    }
    zone(&engine, &clock, RiskLevel::Critical, 40);
    let report = engine.tick().await.unwrap();
    assert_eq!(report.assessment.risk_level, RiskLevel::Critical);
    assert_eq!(report.assessment.strategy, Strategy::SessionPause);

    // risk falls all the way back to low
    clock.advance_secs(1);
    for name in ["a", "b", "c"] {
        sight(&engine, &clock, name, 300.0);
    }
    zone(&engine, &clock, RiskLevel::Low, 0);
    for _ in 0..5 {
        let report = engine.tick().await.unwrap();
        assert_eq!(report.assessment.risk_level, RiskLevel::Low);
        assert_eq!(report.assessment.strategy, Strategy::SessionPause);
        clock.advance_secs(60);
    }

    assert!(engine.send_chat("still there?").await == ActionReport::Skipped {
        reason: "session paused".to_string()
    });

    assert!(engine.resume_from_pause());
    assert!(!engine.resume_from_pause());
    assert_eq!(engine.get_status().assessment.strategy, Strategy::LogOnly);
    assert!(engine
        .get_status()
        .recent_events
        .iter()
        .any(|e| e.event_type == RiskEventKind::SessionResumed));

    let report = engine.tick().await.unwrap();
    assert_eq!(report.assessment.strategy, Strategy::LogOnly);
}

#[tokio::test]
async fn failed_mount_escape_falls_back_to_safe_spot() {
    let mut config = EngineConfig::default();
    config.dispatch.max_retries = 1;
    config.dispatch.retry_delay_ms = 1;
    let (engine, clock) = engine_with(
        config,
        Arc::new(FailingActuator::new(vec![ActionType::MountEscape])),
    );

    for name in ["a", "b", "c"] {
        sight(&engine, &clock, name, 10.0);
    }
    let report = engine.tick().await.unwrap();

    let path: Vec<_> = report.transitions.iter().map(|t| t.to).collect();
    assert_eq!(path, vec![Strategy::MountEscape, Strategy::SafeSpotWait]);
    assert_eq!(report.assessment.strategy, Strategy::SafeSpotWait);

    let status = engine.get_status();
    assert_eq!(status.assessment.strategy, Strategy::SafeSpotWait);
    assert_eq!(status.statistics.counters.failed_actions, 2);
    assert!(status
        .recent_events
        .iter()
        .any(|e| e.action_taken.starts_with("failed: ")));
    assert!(status
        .recent_events
        .iter()
        .any(|e| e.action_taken == "strategy_change:safe_spot_wait"));
}

#[tokio::test]
async fn slow_subscriber_never_blocks_ticks() {
    let mut config = EngineConfig::default();
    config.publisher.subscriber_buffer = 1;
    config.publisher.max_consecutive_drops = 3;
    let (engine, clock) = engine_with(config, Arc::new(RecordingActuator::new()));

    let slow = engine.subscribe_status();
    let mut live = engine.subscribe_status();

    for _ in 0..10 {
        tokio::time::timeout(StdDuration::from_secs(1), engine.tick())
            .await
            .expect("tick blocked on a subscriber")
            .unwrap();
        while live.receiver.try_recv().is_ok() {}
        clock.advance_secs(5);
    }

    // the slow subscriber was cut off, the live one is still attached
    assert!(!engine.unsubscribe(&slow.id));
    assert!(engine.unsubscribe(&live.id));
    assert!(!engine.unsubscribe(&live.id));
}

#[tokio::test]
async fn stale_players_are_swept_without_new_observations() {
    let (engine, clock) = engine_with(EngineConfig::default(), Arc::new(RecordingActuator::new()));

    for name in ["a", "b", "c"] {
        sight(&engine, &clock, name, 10.0);
    }
    engine.tick().await.unwrap();

    clock.advance_secs(engine.config().store.player_ttl_secs + 1);
    assert_eq!(engine.sweep(), 3);
    assert_eq!(engine.get_status().evictions.players_expired, 3);

    let report = engine.tick().await.unwrap();
    assert_eq!(report.assessment.risk_level, RiskLevel::Low);
}

#[tokio::test]
async fn background_protections_fire_on_their_cadence() {
    let mut config = EngineConfig::default();
    config.dispatch.sanitize_interval_secs = 30;
    let actuator = RecordingActuator::new();
    let (engine, clock) = engine_with(config, Arc::new(actuator.clone()));

    for protection in Protection::ALL {
        engine.set_toggle(protection, false);
    }
    engine.set_toggle(Protection::SanitizeLogs, true);

    engine.tick().await.unwrap();
    assert_eq!(actuator.count(ActionType::LogSanitize), 0);

    clock.advance_secs(30);
    engine.tick().await.unwrap();
    assert_eq!(actuator.count(ActionType::LogSanitize), 1);
    assert_eq!(engine.get_status().statistics.counters.sanitized_logs, 1);

    clock.advance_secs(10);
    engine.tick().await.unwrap();
    assert_eq!(actuator.count(ActionType::LogSanitize), 1);
}

#[tokio::test]
async fn malformed_observations_are_counted_not_raised() {
    let (engine, clock) = engine_with(EngineConfig::default(), Arc::new(RecordingActuator::new()));

    let stale = Observation::player_sighting(
        "ghost",
        "Rebel",
        10.0,
        PlayerRiskType::Hostile,
        clock.now() - chrono::Duration::minutes(5),
    );
    assert!(!engine.submit_observation(stale).is_accepted());
    sight(&engine, &clock, "real", 10.0);

    let report = engine.tick().await.unwrap();
    assert_eq!(report.observations, 1);

    let ingest = engine.get_status().ingest;
    assert_eq!(ingest.rejected, 1);
    assert_eq!(ingest.accepted, 1);
}
