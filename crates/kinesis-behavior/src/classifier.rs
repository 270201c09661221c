//! [`BehaviorClassifier`] – windowed, confidence-gated behaviour classifier.
//!
//! Metrics are submitted on a bounded queue.  The worker appends each one to a
//! sliding window (oldest evicted first) and, once per tick, classifies the
//! averaged window if it is non-empty.  The result is always appended to the
//! capped history and published as
//! [`EventPayload::BehaviorClassified`] on [`Topic::Telemetry`]; it only
//! becomes the current state when its confidence reaches the threshold.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use kinesis_middleware::{EventBus, Topic};
use kinesis_types::{BehaviorPattern, BehaviorType, EventPayload, KinesisError, PatternMetrics};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::rules;

const SOURCE: &str = "kinesis-behavior::classifier";
const COMPONENT: &str = "behavior_classifier";

/// Tunables for a [`BehaviorClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Capacity of the metrics queue.
    pub queue_capacity: usize,
    /// Number of samples averaged per classification.
    pub window: usize,
    /// Number of classifications kept in the history.
    pub history_capacity: usize,
    /// Classification period, in milliseconds.
    pub tick_ms: u64,
    /// Minimum confidence for a classification to become the current state.
    pub threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            window: 60,
            history_capacity: 1000,
            tick_ms: 1000,
            threshold: 0.75,
        }
    }
}

#[derive(Debug, Default)]
struct ClassifierState {
    current: BehaviorType,
    history: VecDeque<BehaviorPattern>,
}

/// Shared with the worker.
struct Shared {
    state: RwLock<ClassifierState>,
    threshold: f64,
    history_capacity: usize,
    bus: EventBus,
}

/// Queue-fed behaviour classifier.
///
/// Construct inside a Tokio runtime: [`BehaviorClassifier::new`] spawns the
/// worker.
pub struct BehaviorClassifier {
    shared: Arc<Shared>,
    /// `None` once the classifier has been shut down.
    sender: Mutex<Option<mpsc::Sender<PatternMetrics>>>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BehaviorClassifier {
    /// Start the classifier with `current_state() == Normal` and an empty
    /// history.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, or when
    /// `config.queue_capacity` is zero.
    pub fn new(config: ClassifierConfig, bus: EventBus) -> Self {
        let shared = Arc::new(Shared {
            state: RwLock::new(ClassifierState::default()),
            threshold: config.threshold,
            history_capacity: config.history_capacity,
            bus,
        });
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(run_worker(
            rx,
            Arc::clone(&shared),
            shutdown_rx,
            config.window,
            Duration::from_millis(config.tick_ms.max(1)),
        ));
        info!(
            window = config.window,
            threshold = config.threshold,
            "behavior classifier started"
        );

        Self {
            shared,
            sender: Mutex::new(Some(tx)),
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue `metrics` for the next classification.  Waits while the queue is
    /// full.
    ///
    /// # Errors
    ///
    /// [`KinesisError::Closed`] once the classifier has been shut down.
    pub async fn submit_metrics(&self, metrics: PatternMetrics) -> Result<(), KinesisError> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or_else(|| KinesisError::closed(COMPONENT))?;
        match sender.try_send(metrics) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(metrics)) => {
                warn!("behavior metrics queue full; waiting for space");
                self.shared.bus.emit(
                    Topic::SystemAlerts,
                    SOURCE,
                    EventPayload::Backpressure {
                        component: COMPONENT.to_string(),
                    },
                );
                sender
                    .send(metrics)
                    .await
                    .map_err(|_| KinesisError::closed(COMPONENT))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(KinesisError::closed(COMPONENT)),
        }
    }

    /// The last classification whose confidence cleared the threshold, or
    /// `Normal` if none has.
    pub fn current_state(&self) -> BehaviorType {
        self.shared.state.read().current
    }

    /// Copy of the history, oldest first.
    pub fn history(&self) -> Vec<BehaviorPattern> {
        self.shared.state.read().history.iter().copied().collect()
    }

    /// Most recent classification, gated or not.
    pub fn latest(&self) -> Option<BehaviorPattern> {
        self.shared.state.read().history.back().copied()
    }

    pub fn threshold(&self) -> f64 {
        self.shared.threshold
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stop accepting metrics, move queued ones into the window and stop the
    /// worker.  State and history stay readable.
    ///
    /// A second call is a no-op.
    pub async fn shutdown(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        drop(sender);
        let _ = self.shutdown.send(true);

        let worker = self.worker.lock().take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            warn!(error = %e, "behavior worker ended abnormally");
        }
        info!("behavior classifier shut down");
    }
}

impl Shared {
    fn record(&self, pattern: BehaviorPattern) {
        let changed = {
            let mut state = self.state.write();
            state.history.push_back(pattern);
            while state.history.len() > self.history_capacity {
                state.history.pop_front();
            }
            if pattern.confidence >= self.threshold && state.current != pattern.behavior {
                let previous = state.current;
                state.current = pattern.behavior;
                Some(previous)
            } else {
                None
            }
        };

        match changed {
            Some(previous) => info!(
                from = %previous,
                to = %pattern.behavior,
                confidence = pattern.confidence,
                "behavior state changed"
            ),
            None => debug!(
                behavior = %pattern.behavior,
                confidence = pattern.confidence,
                "behavior classified"
            ),
        }
        self.bus.emit(
            Topic::Telemetry,
            SOURCE,
            EventPayload::BehaviorClassified(pattern),
        );
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<PatternMetrics>,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
    window_size: usize,
    tick: Duration,
) {
    let mut window: VecDeque<PatternMetrics> = VecDeque::with_capacity(window_size);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            metrics = rx.recv() => match metrics {
                Some(metrics) => push(&mut window, window_size, metrics),
                None => break,
            },
            _ = ticker.tick() => {
                if let Some(pattern) = rules::classify(&window) {
                    shared.record(pattern);
                }
                shared.bus.emit(
                    Topic::Telemetry,
                    SOURCE,
                    EventPayload::Heartbeat { component: COMPONENT.to_string() },
                );
            }
        }
    }

    rx.close();
    while let Some(metrics) = rx.recv().await {
        push(&mut window, window_size, metrics);
    }
    debug!(window = window.len(), "behavior worker stopped");
}

fn push(window: &mut VecDeque<PatternMetrics>, capacity: usize, metrics: PatternMetrics) {
    window.push_back(metrics);
    while window.len() > capacity {
        window.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(intensity: f64, frequency: f64, consistency: f64) -> PatternMetrics {
        PatternMetrics {
            intensity,
            frequency,
            duration: 1.0,
            consistency,
        }
    }

    fn classifier(config: ClassifierConfig) -> (BehaviorClassifier, EventBus) {
        let bus = EventBus::default();
        (BehaviorClassifier::new(config, bus.clone()), bus)
    }

    #[tokio::test(start_paused = true)]
    async fn confident_window_updates_current_state() {
        let (c, _bus) = classifier(ClassifierConfig::default());
        for _ in 0..60 {
            c.submit_metrics(sample(0.9, 0.9, 1.0)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(c.current_state(), BehaviorType::Aggressive);
        let latest = c.latest().expect("one classification");
        assert_eq!(latest.behavior, BehaviorType::Aggressive);
        assert_eq!(latest.confidence, 1.0);
        c.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn low_confidence_grows_history_without_changing_state() {
        let (c, _bus) = classifier(ClassifierConfig::default());
        // Check between ticks, never on one.
        tokio::time::sleep(Duration::from_millis(500)).await;
        for round in 0..5 {
            for _ in 0..10 {
                c.submit_metrics(sample(0.9, 0.9, 0.5)).await.unwrap();
            }
            tokio::time::sleep(Duration::from_millis(1000)).await;
            assert_eq!(c.history().len(), round + 1);
            assert_eq!(c.current_state(), BehaviorType::Normal);
        }
        assert!(c.history().iter().all(|p| p.behavior == BehaviorType::Aggressive));
        c.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn empty_window_produces_nothing() {
        let (c, _bus) = classifier(ClassifierConfig::default());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(c.history().is_empty());
        assert_eq!(c.current_state(), BehaviorType::Normal);
        c.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_over_newest_samples() {
        let (c, _bus) = classifier(ClassifierConfig {
            window: 4,
            ..ClassifierConfig::default()
        });
        for _ in 0..4 {
            c.submit_metrics(sample(0.1, 0.1, 1.0)).await.unwrap();
        }
        for _ in 0..4 {
            c.submit_metrics(sample(0.9, 0.9, 1.0)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(1100)).await;
        // Only the last four samples are averaged.
        assert_eq!(c.current_state(), BehaviorType::Aggressive);
        c.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn history_is_capped_oldest_first() {
        let (c, _bus) = classifier(ClassifierConfig {
            history_capacity: 3,
            tick_ms: 10,
            ..ClassifierConfig::default()
        });
        c.submit_metrics(sample(0.5, 0.5, 1.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let history = c.history();
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        c.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn classifications_are_published() {
        let (c, bus) = classifier(ClassifierConfig::default());
        let mut telemetry = bus.subscribe(Topic::Telemetry);
        c.submit_metrics(sample(0.1, 0.1, 0.9)).await.unwrap();

        let pattern = loop {
            let event = telemetry.recv().await.expect("bus open");
            if let EventPayload::BehaviorClassified(pattern) = event.payload {
                break pattern;
            }
        };
        assert_eq!(pattern.behavior, BehaviorType::Passive);
        assert_eq!(c.current_state(), BehaviorType::Passive);
        c.shutdown().await;
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_closed() {
        let (c, _bus) = classifier(ClassifierConfig::default());
        c.shutdown().await;
        assert!(c.is_closed());
        let err = c.submit_metrics(sample(0.5, 0.5, 1.0)).await.unwrap_err();
        assert_eq!(err.kind(), kinesis_types::ErrorKind::Closed);
    }

    #[tokio::test]
    async fn second_shutdown_is_a_noop() {
        let (c, _bus) = classifier(ClassifierConfig::default());
        c.shutdown().await;
        let before = (c.current_state(), c.history().len());
        c.shutdown().await;
        assert_eq!((c.current_state(), c.history().len()), before);
        assert_eq!(c.threshold(), 0.75);
    }
}
