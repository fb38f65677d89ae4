//! Risk engine facade.
//!
//! [`RiskEngine`] owns the six components and runs the assessment tick:
//! drain ingest, record, snapshot, score, select, dispatch, publish. The
//! run loop drives ticks and TTL sweeps on independent intervals until
//! shutdown or a fatal error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use veil_types::{Observation, Protection, ProtectionToggles, RiskLevel, Strategy, Trend};

use crate::action::{ActionType, Actuator};
use crate::assessment::RiskAssessment;
use crate::clock::Clock;
use crate::config::{EngineConfig, ScoringConfig, StrategyConfig};
use crate::dispatcher::{ActionDispatcher, ActionReport};
use crate::error::{EngineError, EngineResult};
use crate::events::{NewRiskEvent, RiskEventKind};
use crate::ingest::{Admission, IngestGateway};
use crate::publisher::{EngineStatus, StatusPublisher, StatusSubscription};
use crate::scorer::{RiskScorer, TrendTracker};
use crate::selector::{StrategySelector, StrategyTransition};
use crate::store::{RollingStore, StoreEntry};

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub observations: usize,
    pub assessment: RiskAssessment,
    pub transitions: Vec<StrategyTransition>,
    pub actions: Vec<(ActionType, ActionReport)>,
}

/// The risk assessment and evasion policy engine.
pub struct RiskEngine {
    /// Configuration, with the live scoring and strategy policy.
    config: RwLock<EngineConfig>,

    /// Time source.
    clock: Arc<dyn Clock>,

    /// Observation intake.
    gateway: IngestGateway,

    /// Rolling statistics.
    store: Arc<RollingStore>,

    /// Score function.
    scorer: RwLock<RiskScorer>,

    /// Recent scores for the trend.
    trend: Mutex<TrendTracker>,

    /// Strategy state machine.
    selector: Mutex<StrategySelector>,

    /// Action dispatch.
    dispatcher: ActionDispatcher,

    /// Status snapshots.
    publisher: StatusPublisher,

    /// Background protection switches.
    toggles: RwLock<ProtectionToggles>,

    /// Current assessment, replaced whole each tick.
    assessment: RwLock<Arc<RiskAssessment>>,

    /// Ticks completed.
    ticks: AtomicU64,

    /// Serializes ticks.
    tick_lock: tokio::sync::Mutex<()>,

    /// Serializes building and publishing a status so publishes stay in
    /// state order.
    status_lock: Mutex<()>,
}

impl RiskEngine {
    /// Create an engine. Fails if the configuration is invalid.
    pub fn new(
        config: EngineConfig,
        actuator: Arc<dyn Actuator>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        config.validate()?;

        let now = clock.now();
        let toggles = ProtectionToggles::default();
        let store = Arc::new(RollingStore::new(config.store.clone()));
        let dispatcher = ActionDispatcher::new(
            config.dispatch.clone(),
            actuator,
            store.clone(),
            clock.clone(),
        );
        let publisher = StatusPublisher::new(
            config.publisher.clone(),
            EngineStatus::initial(toggles, now),
        );

        info!(profile = %config.profile, tick_ms = config.tick_interval_ms, "Risk engine created");

        Ok(Self {
            gateway: IngestGateway::new(config.ingest.clone()),
            scorer: RwLock::new(RiskScorer::new(config.scoring.clone())),
            trend: Mutex::new(TrendTracker::from_config(&config.scoring)),
            selector: Mutex::new(StrategySelector::new(&config.strategy)),
            assessment: RwLock::new(Arc::new(RiskAssessment::initial(now))),
            toggles: RwLock::new(toggles),
            ticks: AtomicU64::new(0),
            tick_lock: tokio::sync::Mutex::new(()),
            status_lock: Mutex::new(()),
            config: RwLock::new(config),
            clock,
            store,
            dispatcher,
            publisher,
        })
    }

    /// Offer an observation from a producer. Never blocks on the tick.
    pub fn submit_observation(&self, observation: Observation) -> Admission {
        self.gateway.accept(observation, self.clock.now())
    }

    pub fn toggles(&self) -> ProtectionToggles {
        *self.toggles.read()
    }

    /// Switch a protection. Returns its previous state.
    pub fn set_toggle(&self, protection: Protection, enabled: bool) -> bool {
        let now = self.clock.now();
        let previous = self.toggles.write().set(protection, enabled);
        if previous != enabled {
            info!(protection = %protection, enabled, "Protection toggled");
            let level = self.assessment.read().risk_level;
            self.store.record(
                StoreEntry::Event(
                    NewRiskEvent::new(
                        RiskEventKind::ProtectionToggled,
                        level,
                        format!("toggle:{}={}", protection, if enabled { "on" } else { "off" }),
                        now,
                    ),
                ),
                now,
            );
            self.refresh_status(now);
        }
        previous
    }

    /// Leave `session_pause`. Returns `false` if the session was not paused.
    pub fn resume_from_pause(&self) -> bool {
        let now = self.clock.now();
        let level = self.assessment.read().risk_level;
        let Some(transition) = self.selector.lock().resume_from_pause(level, now) else {
            debug!("Resume requested while not paused");
            return false;
        };

        info!(level = %level, "Session resumed from pause");
        self.store.record(StoreEntry::Event(transition.to_event()), now);
        self.store.record(
            StoreEntry::Event(NewRiskEvent::new(
                RiskEventKind::SessionResumed,
                level,
                "session_resumed",
                now,
            )),
            now,
        );
        let resumed = self.assessment.read().with_strategy(transition.to);
        self.swap_assessment(resumed);
        self.refresh_status(now);
        true
    }

    /// Latest published status.
    pub fn get_status(&self) -> Arc<EngineStatus> {
        self.publisher.get_status()
    }

    /// Current assessment.
    pub fn assessment(&self) -> Arc<RiskAssessment> {
        self.assessment.read().clone()
    }

    pub fn subscribe_status(&self) -> StatusSubscription {
        self.publisher.subscribe()
    }

    /// Push status updates to `callback`. Requires a Tokio runtime.
    pub fn subscribe_status_with<F>(&self, callback: F) -> veil_types::SubscriptionId
    where
        F: Fn(Arc<EngineStatus>) + Send + 'static,
    {
        self.publisher.subscribe_with(callback)
    }

    /// Idempotent.
    pub fn unsubscribe(&self, id: &veil_types::SubscriptionId) -> bool {
        self.publisher.unsubscribe(id)
    }

    /// Send a chat message through the actuator, subject to the chat rate
    /// limit. Chat is refused while the session is paused.
    pub async fn send_chat(&self, text: &str) -> ActionReport {
        let now = self.clock.now();
        if self.selector.lock().is_paused() {
            return ActionReport::Skipped {
                reason: "session paused".to_string(),
            };
        }

        debug!(length = text.len(), "Chat message requested");
        let toggles = self.toggles();
        let level = self.assessment.read().risk_level;
        let report = self
            .dispatcher
            .dispatch(ActionType::ChatMessage, json!({ "text": text }), &toggles, level, now)
            .await;
        self.refresh_status(self.clock.now());
        report
    }

    /// Swap in new scoring and strategy policy. An invalid policy is
    /// rejected and the current one stays in force.
    pub fn reload_policy(&self, scoring: ScoringConfig, strategy: StrategyConfig) -> EngineResult<()> {
        scoring.validate()?;
        strategy.validate()?;

        self.trend
            .lock()
            .reconfigure(scoring.trend_window, scoring.trend_dead_band);
        self.selector.lock().set_dwell_time(strategy.dwell_time());
        *self.scorer.write() = RiskScorer::new(scoring.clone());

        let mut config = self.config.write();
        config.scoring = scoring;
        config.strategy = strategy;
        info!(
            medium = config.scoring.thresholds.medium,
            high = config.scoring.thresholds.high,
            critical = config.scoring.thresholds.critical,
            dwell_secs = config.strategy.dwell_time_secs,
            "Policy reloaded"
        );
        Ok(())
    }

    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    /// Evict stale players and zones.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let evicted = self.store.sweep(now);
        if evicted > 0 {
            self.refresh_status(now);
        }
        evicted
    }

    /// Run one assessment tick.
    ///
    /// On error the last good assessment stays current and the published
    /// status is flagged degraded.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> EngineResult<TickReport> {
        let _serial = self.tick_lock.lock().await;
        let now = self.clock.now();

        match self.run_tick(now).await {
            Ok(report) => Ok(report),
            Err(e) => {
                if e.is_fatal() {
                    error!(error = %e, "Assessment tick failed");
                } else {
                    warn!(error = %e, "Assessment tick failed, status degraded");
                }
                {
                    let _status = self.status_lock.lock();
                    self.publisher.mark_degraded(now);
                }
                Err(e)
            }
        }
    }

    async fn run_tick(&self, now: DateTime<Utc>) -> EngineResult<TickReport> {
        let tick = self.ticks.load(Ordering::SeqCst) + 1;

        let observations = self.gateway.drain();
        let observation_count = observations.len();
        for observation in observations {
            self.store.record(StoreEntry::Observation(observation), now);
        }

        let snapshot = self.store.snapshot();
        let (score, level) = {
            let scorer = self.scorer.read();
            let score = scorer.score(&snapshot, now)?;
            (score, scorer.classify(score))
        };
        let trend = self.trend.lock().observe(score);

        let mut transitions = Vec::new();
        let selected = self.selector.lock().evaluate(level, trend, now);
        if let Some(transition) = selected {
            self.record_transition(&transition, now);
            transitions.push(transition);
        }

        let strategy = self.selector.lock().current();
        let assessment = RiskAssessment::new(score, level, strategy, trend, now, tick)?;
        self.swap_assessment(assessment);
        self.ticks.store(tick, Ordering::SeqCst);
        debug!(tick, score, level = %level, trend = %trend, strategy = %strategy, "Assessed");
        self.refresh_status(now);

        let actions = self.dispatch_due(strategy, level, trend, now, &mut transitions).await;
        if !actions.is_empty() {
            self.refresh_status(self.clock.now());
        }

        Ok(TickReport {
            tick,
            observations: observation_count,
            assessment: (*self.assessment()).clone(),
            transitions,
            actions,
        })
    }

    /// Issue every due action. A strategy action that fails after its
    /// retries steps the strategy down one tier.
    async fn dispatch_due(
        &self,
        strategy: Strategy,
        level: RiskLevel,
        trend: Trend,
        now: DateTime<Utc>,
        transitions: &mut Vec<StrategyTransition>,
    ) -> Vec<(ActionType, ActionReport)> {
        let toggles = self.toggles();
        let planned = self.dispatcher.plan(strategy, &toggles, now);
        let mut reports = Vec::with_capacity(planned.len());

        for action in planned {
            let parameters = json!({
                "strategy": strategy,
                "risk_level": level,
                "trend": trend,
            });
            let report = self
                .dispatcher
                .dispatch(action, parameters, &toggles, level, now)
                .await;

            if report.is_failed() {
                if let Some(failed) = action.strategy() {
                    let fallback =
                        self.selector
                            .lock()
                            .apply_fallback(failed, level, self.clock.now());
                    if let Some(transition) = fallback {
                        warn!(
                            from = %transition.from,
                            to = %transition.to,
                            "Actuator failed, falling back"
                        );
                        self.record_transition(&transition, transition.at);
                        let fallen_back = self.assessment.read().with_strategy(transition.to);
                        self.swap_assessment(fallen_back);
                        transitions.push(transition);
                    }
                }
            }
            reports.push((action, report));
        }

        reports
    }

    fn record_transition(&self, transition: &StrategyTransition, now: DateTime<Utc>) {
        info!(
            from = %transition.from,
            to = %transition.to,
            level = %transition.risk_level,
            reason = ?transition.reason,
            "Strategy changed"
        );
        self.store.record(StoreEntry::Event(transition.to_event()), now);
    }

    fn swap_assessment(&self, assessment: RiskAssessment) {
        *self.assessment.write() = Arc::new(assessment);
    }

    /// Build a status from the current state and publish it.
    fn refresh_status(&self, now: DateTime<Utc>) {
        let _status = self.status_lock.lock();
        let snapshot = self.store.snapshot();
        let (window, recent) = {
            let config = self.config.read();
            (config.scoring.window(), config.publisher.recent_events)
        };

        let status = EngineStatus {
            assessment: (*self.assessment()).clone(),
            toggles: self.toggles(),
            statistics: snapshot.statistics(window, now),
            recent_events: snapshot.recent_events(recent),
            ingest: self.gateway.stats(),
            evictions: snapshot.evictions,
            degraded: false,
            version: 0,
            published_at: now,
        };
        self.publisher.publish(status);
    }

    /// Drive ticks and sweeps until `shutdown` flips to `true` or a tick
    /// fails fatally. Dropping an in-flight tick loses only its undispatched
    /// actions.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> EngineResult<()> {
        let (tick_every, sweep_every) = {
            let config = self.config.read();
            (config.tick_interval(), config.sweep_interval())
        };
        let mut ticks = tokio::time::interval(tick_every);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sweeps = tokio::time::interval(sweep_every);
        sweeps.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(?tick_every, ?sweep_every, "Risk engine running");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Risk engine stopping");
                        return Ok(());
                    }
                }
                _ = ticks.tick() => {
                    let result = tokio::select! {
                        result = self.tick() => result,
                        _ = shutdown.changed() => {
                            info!("Risk engine stopping mid-tick");
                            return Ok(());
                        }
                    };
                    if let Err(e) = result {
                        if e.is_fatal() {
                            return Err(e);
                        }
                    }
                }
                _ = sweeps.tick() => {
                    self.sweep();
                }
            }
        }
    }

    /// Spawn [`RiskEngine::run`] on the current runtime.
    pub fn start(self: &Arc<Self>) -> EngineHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.clone().run(shutdown_rx));
        EngineHandle { shutdown_tx, join }
    }
}

/// Handle to a running engine loop.
pub struct EngineHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<EngineResult<()>>,
}

impl EngineHandle {
    /// Signal shutdown and wait for the loop to exit.
    pub async fn shutdown(self) -> EngineResult<()> {
        let _ = self.shutdown_tx.send(true);
        self.join
            .await
            .map_err(|e| EngineError::Internal(format!("engine task failed: {}", e)))?
    }

    /// Whether the loop has exited on its own.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::RecordingActuator;
    use crate::clock::ManualClock;
    use veil_types::PlayerRiskType;

    fn engine() -> (RiskEngine, ManualClock, RecordingActuator) {
        let clock = ManualClock::default();
        let actuator = RecordingActuator::new();
        let engine = RiskEngine::new(
            EngineConfig::default(),
            Arc::new(actuator.clone()),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (engine, clock, actuator)
    }

    #[test]
    fn test_invalid_config_refused() {
        let mut config = EngineConfig::default();
        config.scoring.thresholds.high = 0.1;
        let result = RiskEngine::new(
            config,
            Arc::new(RecordingActuator::new()),
            Arc::new(ManualClock::default()),
        );
        assert!(matches!(result, Err(EngineError::ConfigurationError(_))));
    }

    #[test]
    fn test_nan_saturation_refused_at_construction() {
        let mut config = EngineConfig::default();
        config.scoring.player_saturation = f64::NAN;
        let result = RiskEngine::new(
            config,
            Arc::new(RecordingActuator::new()),
            Arc::new(ManualClock::default()),
        );
        assert!(matches!(result, Err(EngineError::ConfigurationError(_))));
    }

    #[tokio::test]
    async fn test_nan_saturation_refused_on_reload() {
        let (engine, clock, _) = engine();
        let scoring = ScoringConfig {
            player_saturation: f64::NAN,
            ..ScoringConfig::default()
        };
        assert!(engine
            .reload_policy(scoring, StrategyConfig::default())
            .is_err());

        engine.submit_observation(Observation::player_sighting(
            "a",
            "Rebel",
            10.0,
            PlayerRiskType::Hostile,
            clock.now(),
        ));
        let report = engine.tick().await.unwrap();
        assert!(report.assessment.risk_score.is_finite());
    }

    #[tokio::test]
    async fn test_quiet_tick_stays_log_only() {
        let (engine, _, actuator) = engine();
        let report = engine.tick().await.unwrap();

        assert_eq!(report.tick, 1);
        assert_eq!(report.assessment.strategy, Strategy::LogOnly);
        assert_eq!(report.assessment.risk_level, RiskLevel::Low);
        assert!(report.transitions.is_empty());
        assert!(actuator.requests().is_empty());
        assert_eq!(engine.get_status().assessment.tick, 1);
    }

    #[tokio::test]
    async fn test_hostiles_trigger_mount_escape_request() {
        let (engine, clock, actuator) = engine();
        for name in ["a", "b", "c"] {
            let admission = engine.submit_observation(Observation::player_sighting(
                name,
                "Rebel",
                15.0,
                PlayerRiskType::Hostile,
                clock.now(),
            ));
            assert!(admission.is_accepted());
        }

        let report = engine.tick().await.unwrap();
        assert_eq!(report.observations, 3);
        assert_eq!(report.assessment.strategy, Strategy::MountEscape);
        assert_eq!(actuator.count(ActionType::MountEscape), 1);
    }

    #[tokio::test]
    async fn test_toggle_records_event_once() {
        let (engine, _, _) = engine();
        assert!(!engine.set_toggle(Protection::CameraWiggles, true));
        assert!(engine.set_toggle(Protection::CameraWiggles, true));

        let status = engine.get_status();
        assert!(status.toggles.camera_wiggles);
        let toggles = status
            .recent_events
            .iter()
            .filter(|e| e.event_type == RiskEventKind::ProtectionToggled)
            .count();
        assert_eq!(toggles, 1);
    }

    #[tokio::test]
    async fn test_invalid_reload_keeps_policy() {
        let (engine, _, _) = engine();
        let mut scoring = ScoringConfig::default();
        scoring.thresholds.medium = 0.9;

        assert!(engine
            .reload_policy(scoring, StrategyConfig::default())
            .is_err());
        assert_eq!(engine.config().scoring, ScoringConfig::default());

        let strategy = StrategyConfig { dwell_time_secs: 5 };
        engine
            .reload_policy(ScoringConfig::default(), strategy.clone())
            .unwrap();
        assert_eq!(engine.config().strategy, strategy);
    }

    #[test]
    fn test_concurrent_toggles_publish_latest_state() {
        let (engine, _, _) = engine();
        let engine = Arc::new(engine);
        let mut subscription = engine.subscribe_status();

        let handles: Vec<_> = Protection::ALL
            .iter()
            .copied()
            .map(|protection| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        engine.set_toggle(protection, i % 2 == 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let status = engine.get_status();
        assert_eq!(status.toggles, engine.toggles());

        let mut last_version = 0;
        while let Ok(received) = subscription.receiver.try_recv() {
            assert!(received.version > last_version);
            last_version = received.version;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_ticks_until_shutdown() {
        let (engine, _, _) = engine();
        let engine = Arc::new(engine);
        let handle = engine.start();

        tokio::time::sleep(std::time::Duration::from_secs(11)).await;
        handle.shutdown().await.unwrap();
        assert!(engine.assessment().tick >= 2);
    }
}
