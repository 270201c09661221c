//! [`SafetySupervisor`] – warning counter and escalation policy.
//!
//! # Escalation
//!
//! Every [`add_warning`][SafetySupervisor::add_warning] bumps a counter.
//! More than `warning_threshold` warnings force the level to at least
//! `Warning`; more than `critical_threshold` force at least `Critical`.  The
//! level only goes down through an explicit [`reset`][SafetySupervisor::reset].
//!
//! # Sources of warnings
//!
//! Besides direct calls, the worker turns bus traffic into warnings:
//!
//! | Event | Condition |
//! |---|---|
//! | `BehaviorClassified` | aggressive or erratic with confidence ≥ `anomaly_confidence` |
//! | `Backpressure` | always |
//! | missing `Heartbeat` | once per stall longer than `heartbeat_timeout_ms` |

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kinesis_middleware::{EventBus, Topic, TopicReceiver};
use kinesis_types::{Event, EventPayload, SafetyLevel};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::watchdog::Watchdog;

const SOURCE: &str = "kinesis-safety::supervisor";

/// Tunables for a [`SafetySupervisor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Health-check period, in milliseconds.
    pub tick_ms: u64,
    /// Warning count above which the level is at least `Warning`.
    pub warning_threshold: usize,
    /// Warning count above which the level is at least `Critical`.
    pub critical_threshold: usize,
    /// Minimum confidence of an anomalous classification to count as a
    /// warning.
    pub anomaly_confidence: f64,
    /// Heartbeat age after which a component counts as stalled, in
    /// milliseconds.
    pub heartbeat_timeout_ms: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            warning_threshold: 10,
            critical_threshold: 20,
            anomaly_confidence: 0.75,
            heartbeat_timeout_ms: 3000,
        }
    }
}

/// The level `current` must be raised to after `count` warnings.
///
/// Never lower than `current`.
pub fn escalate(current: SafetyLevel, count: usize, config: &SafetyConfig) -> SafetyLevel {
    let floor = if count > config.critical_threshold {
        SafetyLevel::Critical
    } else if count > config.warning_threshold {
        SafetyLevel::Warning
    } else {
        SafetyLevel::Normal
    };
    current.max(floor)
}

#[derive(Debug, Default)]
struct SafetyState {
    level: SafetyLevel,
    warnings: Vec<String>,
    count: usize,
    last_check: Option<DateTime<Utc>>,
    stalled: Vec<String>,
}

struct Shared {
    state: RwLock<SafetyState>,
    config: SafetyConfig,
    bus: EventBus,
}

impl Shared {
    fn add_warning(&self, text: String) {
        let escalation = {
            let mut state = self.state.write();
            state.count += 1;
            state.warnings.push(text.clone());
            let next = escalate(state.level, state.count, &self.config);
            let from = state.level;
            state.level = next;
            (next > from).then_some((from, next, state.count))
        };
        warn!(warning = %text, "safety warning");
        if let Some((from, to, count)) = escalation {
            self.announce(from, to, count);
        }
    }

    fn raise_to(&self, level: SafetyLevel) {
        let escalation = {
            let mut state = self.state.write();
            let from = state.level;
            state.level = from.max(level);
            (state.level > from).then_some((from, state.level, state.count))
        };
        if let Some((from, to, count)) = escalation {
            self.announce(from, to, count);
        }
    }

    fn announce(&self, from: SafetyLevel, to: SafetyLevel, warnings: usize) {
        if to >= SafetyLevel::Critical {
            error!(%from, %to, warnings, "safety level escalated");
        } else {
            warn!(%from, %to, warnings, "safety level escalated");
        }
        self.bus.emit(
            Topic::SystemAlerts,
            SOURCE,
            EventPayload::SafetyEscalated { from, to },
        );
    }

    fn observe(&self, watchdog: &mut Watchdog, event: Event) {
        match event.payload {
            EventPayload::Heartbeat { component } => {
                if watchdog.heartbeat(&component) {
                    info!(component = %component, "component heartbeat recovered");
                }
            }
            EventPayload::BehaviorClassified(pattern)
                if pattern.behavior.is_anomalous()
                    && pattern.confidence >= self.config.anomaly_confidence =>
            {
                self.add_warning(format!(
                    "anomalous behavior: {} (confidence {:.2})",
                    pattern.behavior, pattern.confidence
                ));
            }
            EventPayload::Backpressure { component } => {
                self.add_warning(format!("backpressure in {component}"));
            }
            EventPayload::CommandRejected { motor_id, reason } => {
                debug!(motor_id = %motor_id, reason = %reason, "queued motor command rejected");
            }
            EventPayload::BehaviorClassified(_) | EventPayload::SafetyEscalated { .. } => {}
        }
    }

    fn check(&self, watchdog: &mut Watchdog) {
        {
            let mut state = self.state.write();
            state.last_check = Some(Utc::now());
            state.stalled = watchdog.check_all();
        }
        for component in watchdog.take_new_stalls() {
            self.add_warning(format!("{component} heartbeat missed"));
        }
    }
}

/// Escalating health monitor.
///
/// Construct inside a Tokio runtime: [`SafetySupervisor::new`] subscribes to
/// the bus and spawns the worker.
pub struct SafetySupervisor {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    /// `None` once the supervisor has been shut down.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SafetySupervisor {
    /// Start at [`SafetyLevel::Normal`] with no warnings.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(config: SafetyConfig, bus: EventBus) -> Self {
        let telemetry = bus.subscribe(Topic::Telemetry);
        let alerts = bus.subscribe(Topic::SystemAlerts);
        let tick = Duration::from_millis(config.tick_ms.max(1));
        let timeout = Duration::from_millis(config.heartbeat_timeout_ms);
        info!(
            warning_threshold = config.warning_threshold,
            critical_threshold = config.critical_threshold,
            "safety supervisor started"
        );

        let shared = Arc::new(Shared {
            state: RwLock::new(SafetyState::default()),
            config,
            bus,
        });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(run_worker(
            Arc::clone(&shared),
            shutdown_rx,
            telemetry,
            alerts,
            Watchdog::new(timeout),
            tick,
        ));

        Self {
            shared,
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Record a warning and escalate if a threshold was crossed.
    ///
    /// Never fails, also after shutdown.
    pub fn add_warning(&self, text: impl Into<String>) {
        self.shared.add_warning(text.into());
    }

    /// Raise the level to at least `level`.  Lower levels are ignored.
    pub fn raise_to(&self, level: SafetyLevel) {
        self.shared.raise_to(level);
    }

    /// Back to [`SafetyLevel::Normal`] with the warning list and counter
    /// cleared.
    pub fn reset(&self) {
        let mut state = self.shared.state.write();
        let from = state.level;
        state.level = SafetyLevel::Normal;
        state.warnings.clear();
        state.count = 0;
        drop(state);
        info!(%from, "safety level reset");
    }

    pub fn level(&self) -> SafetyLevel {
        self.shared.state.read().level
    }

    /// Copy of every warning since the last reset, oldest first.
    pub fn warnings(&self) -> Vec<String> {
        self.shared.state.read().warnings.clone()
    }

    pub fn warning_count(&self) -> usize {
        self.shared.state.read().count
    }

    /// Time of the most recent periodic check, `None` before the first one.
    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.shared.state.read().last_check
    }

    /// Components whose heartbeat was overdue at the last periodic check,
    /// sorted.
    pub fn stalled_components(&self) -> Vec<String> {
        self.shared.state.read().stalled.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.worker.lock().is_none()
    }

    /// Stop the worker.  Level and warnings stay readable and
    /// [`add_warning`][Self::add_warning] keeps working.
    ///
    /// A second call is a no-op.
    pub async fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = self.shutdown.send(true);
        if let Err(e) = worker.await {
            warn!(error = %e, "safety worker ended abnormally");
        }
        info!(level = %self.level(), "safety supervisor shut down");
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
    mut telemetry: TopicReceiver,
    mut alerts: TopicReceiver,
    mut watchdog: Watchdog,
    tick: Duration,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            Some(event) = telemetry.recv() => shared.observe(&mut watchdog, event),
            Some(event) = alerts.recv() => shared.observe(&mut watchdog, event),
            _ = ticker.tick() => shared.check(&mut watchdog),
        }
    }
    debug!(components = ?watchdog.components(), "safety worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kinesis_types::{BehaviorPattern, BehaviorType, PatternMetrics};
    use proptest::prelude::*;

    fn supervisor() -> (SafetySupervisor, EventBus) {
        let bus = EventBus::default();
        (SafetySupervisor::new(SafetyConfig::default(), bus.clone()), bus)
    }

    fn classified(behavior: BehaviorType, confidence: f64) -> EventPayload {
        EventPayload::BehaviorClassified(BehaviorPattern {
            behavior,
            confidence,
            timestamp: Utc::now(),
            metrics: PatternMetrics::default(),
        })
    }

    async fn wait_for_count(s: &SafetySupervisor, count: usize) {
        for _ in 0..200 {
            if s.warning_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} warnings, got {}", s.warning_count());
    }

    #[tokio::test]
    async fn thresholds_escalate_level() {
        let (s, _bus) = supervisor();
        for i in 0..10 {
            s.add_warning(format!("w{i}"));
        }
        assert_eq!(s.level(), SafetyLevel::Normal);
        s.add_warning("w10");
        assert!(s.level() >= SafetyLevel::Warning);
        for i in 11..20 {
            s.add_warning(format!("w{i}"));
        }
        assert_eq!(s.level(), SafetyLevel::Warning);
        s.add_warning("w20");
        assert!(s.level() >= SafetyLevel::Critical);
        assert_eq!(s.warnings().len(), 21);
        assert_eq!(s.warnings()[0], "w0");
        s.shutdown().await;
    }

    #[tokio::test]
    async fn level_never_decreases_without_reset() {
        let (s, _bus) = supervisor();
        s.raise_to(SafetyLevel::Emergency);
        s.raise_to(SafetyLevel::Warning);
        s.add_warning("still bad");
        assert_eq!(s.level(), SafetyLevel::Emergency);

        s.reset();
        assert_eq!(s.level(), SafetyLevel::Normal);
        assert!(s.warnings().is_empty());
        assert_eq!(s.warning_count(), 0);
        s.shutdown().await;
    }

    #[tokio::test]
    async fn escalation_is_published() {
        let (s, bus) = supervisor();
        let mut alerts = bus.subscribe(Topic::SystemAlerts);
        for i in 0..11 {
            s.add_warning(format!("w{i}"));
        }
        let event = alerts.try_recv().expect("escalation event");
        assert!(matches!(
            event.payload,
            EventPayload::SafetyEscalated {
                from: SafetyLevel::Normal,
                to: SafetyLevel::Warning
            }
        ));
        assert!(alerts.try_recv().is_none(), "only one escalation");
        s.shutdown().await;
    }

    #[tokio::test]
    async fn confident_anomalies_become_warnings() {
        let (s, bus) = supervisor();
        bus.emit(Topic::Telemetry, "test", classified(BehaviorType::Erratic, 0.5));
        bus.emit(Topic::Telemetry, "test", classified(BehaviorType::Passive, 1.0));
        bus.emit(Topic::Telemetry, "test", classified(BehaviorType::Aggressive, 0.9));

        wait_for_count(&s, 1).await;
        let warnings = s.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("aggressive"));
        s.shutdown().await;
    }

    #[tokio::test]
    async fn backpressure_becomes_warning() {
        let (s, bus) = supervisor();
        bus.emit(
            Topic::SystemAlerts,
            "kinesis-sensor::hub",
            EventPayload::Backpressure {
                component: "sensor_hub".into(),
            },
        );
        wait_for_count(&s, 1).await;
        assert!(s.warnings()[0].contains("sensor_hub"));
        s.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_heartbeat_warns_once_per_stall() {
        let (s, bus) = supervisor();
        let heartbeat = || EventPayload::Heartbeat {
            component: "sensor_hub".into(),
        };
        bus.emit(Topic::Telemetry, "test", heartbeat());
        assert!(s.stalled_components().is_empty());

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(s.warnings(), vec!["sensor_hub heartbeat missed".to_string()]);
        assert_eq!(s.stalled_components(), vec!["sensor_hub".to_string()]);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(s.warning_count(), 1);

        bus.emit(Topic::Telemetry, "test", heartbeat());
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(s.stalled_components().is_empty());
        tokio::time::sleep(Duration::from_millis(4300)).await;
        assert_eq!(s.warning_count(), 2);
        assert_eq!(s.stalled_components(), vec!["sensor_hub".to_string()]);
        assert!(s.last_check().is_some());
        s.shutdown().await;
    }

    #[tokio::test]
    async fn second_shutdown_is_a_noop() {
        let (s, _bus) = supervisor();
        s.add_warning("one");
        s.shutdown().await;
        assert!(s.is_closed());
        let before = (s.level(), s.warnings());
        s.shutdown().await;
        assert_eq!((s.level(), s.warnings()), before);
        // Still usable as a reporting surface.
        s.add_warning("two");
        assert_eq!(s.warning_count(), 2);
    }

    fn level() -> impl Strategy<Value = SafetyLevel> {
        prop_oneof![
            Just(SafetyLevel::Normal),
            Just(SafetyLevel::Warning),
            Just(SafetyLevel::Critical),
            Just(SafetyLevel::Emergency),
        ]
    }

    proptest! {
        #[test]
        fn escalate_is_monotonic(current in level(), a in 0usize..50, b in 0usize..50) {
            let config = SafetyConfig::default();
            let (lo, hi) = (a.min(b), a.max(b));
            prop_assert!(escalate(current, lo, &config) >= current);
            prop_assert!(escalate(current, hi, &config) >= escalate(current, lo, &config));
        }
    }
}
