//! [`Orchestrator`] – composes the subsystems into one control loop.
//!
//! ```text
//!  readings ──► SensorHub ──(snapshot every analysis tick)──► derive_metrics
//!                                                                 │
//!                                                                 ▼
//!  intents ──► Orchestrator ──► MotionController        BehaviorClassifier
//!                                                                 │
//!                 EventBus  ◄── heartbeats, backpressure, ────────┘
//!                    │          classifications, rejections
//!                    ▼
//!             SafetySupervisor
//! ```
//!
//! The orchestrator never takes a subsystem's lock; it only calls the public
//! API of each component.  The safety supervisor learns about the others
//! exclusively through the [`EventBus`].
//!
//! # Shutdown order
//!
//! Producers stop before their consumers: analysis loop, classifier, sensor
//! hub, motion controller, safety supervisor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use kinesis_behavior::{BehaviorClassifier, ClassifierConfig};
use kinesis_middleware::EventBus;
use kinesis_motion::{MotionConfig, MotionController};
use kinesis_safety::{SafetyConfig, SafetySupervisor};
use kinesis_sensor::{HubConfig, SensorHub};
use kinesis_types::{KinesisError, MotorCommand, SafetyLevel, SensorCategory, SensorReading};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::intent::{Intent, IntentOutcome, SystemStatus};
use crate::metrics::derive_metrics;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`Orchestrator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Period of the sensor → classifier analysis loop, in milliseconds.
    pub analysis_tick_ms: u64,
    /// Per-topic event bus capacity.
    pub bus_capacity: usize,
    pub hub: HubConfig,
    pub motion: MotionConfig,
    pub classifier: ClassifierConfig,
    pub safety: SafetyConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            analysis_tick_ms: 1000,
            bus_capacity: 256,
            hub: HubConfig::default(),
            motion: MotionConfig::default(),
            classifier: ClassifierConfig::default(),
            safety: SafetyConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Owns every subsystem and the analysis loop.
///
/// Construct inside a Tokio runtime: every component spawns its own worker.
pub struct Orchestrator {
    hub: Arc<SensorHub>,
    motion: Arc<MotionController>,
    classifier: Arc<BehaviorClassifier>,
    safety: Arc<SafetySupervisor>,
    bus: EventBus,
    started: Instant,
    active: AtomicBool,
    shutdown: watch::Sender<bool>,
    analysis: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Start every subsystem and the analysis loop.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, or when a queue or bus
    /// capacity is zero.
    pub fn new(config: OrchestratorConfig) -> Self {
        let bus = EventBus::new(config.bus_capacity);
        // The supervisor subscribes first so it sees the other workers' first
        // heartbeats.
        let safety = Arc::new(SafetySupervisor::new(config.safety, bus.clone()));
        let hub = Arc::new(SensorHub::new(config.hub, bus.clone()));
        let motion = Arc::new(MotionController::new(config.motion, bus.clone()));
        let classifier = Arc::new(BehaviorClassifier::new(config.classifier, bus.clone()));

        let period = Duration::from_millis(config.analysis_tick_ms.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let analysis = tokio::spawn(run_analysis(
            Arc::clone(&hub),
            Arc::clone(&classifier),
            shutdown_rx,
            period,
        ));
        info!(analysis_tick_ms = config.analysis_tick_ms, "orchestrator started");

        Self {
            hub,
            motion,
            classifier,
            safety,
            bus,
            started: Instant::now(),
            active: AtomicBool::new(true),
            shutdown,
            analysis: Mutex::new(Some(analysis)),
        }
    }

    pub fn hub(&self) -> &Arc<SensorHub> {
        &self.hub
    }

    pub fn motion(&self) -> &Arc<MotionController> {
        &self.motion
    }

    pub fn classifier(&self) -> &Arc<BehaviorClassifier> {
        &self.classifier
    }

    pub fn safety(&self) -> &Arc<SafetySupervisor> {
        &self.safety
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Feed one reading to the sensor hub.
    ///
    /// # Errors
    ///
    /// [`KinesisError::HubClosed`] after shutdown.
    pub async fn ingest(&self, category: SensorCategory, value: f64) -> Result<(), KinesisError> {
        self.hub.ingest(SensorReading::new(category, value)).await
    }

    /// Feed one reading taken at `timestamp` to the sensor hub.
    ///
    /// # Errors
    ///
    /// [`KinesisError::HubClosed`] after shutdown.
    pub async fn ingest_at(
        &self,
        category: SensorCategory,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), KinesisError> {
        self.hub
            .ingest(SensorReading::at(category, value, timestamp))
            .await
    }

    /// Execute `intent`.
    ///
    /// # Errors
    ///
    /// Whatever the motion controller reports: validation, not-found, or
    /// closed after shutdown.  `Status` and `EmergencyStop` never fail.
    pub async fn handle_intent(&self, intent: Intent) -> Result<IntentOutcome, KinesisError> {
        debug!(?intent, "handling intent");
        match intent {
            Intent::Move {
                motor_id,
                position,
                speed,
            } => {
                self.motion
                    .submit_command(MotorCommand::new(motor_id.clone(), position, speed))
                    .await?;
                Ok(IntentOutcome::Moved { motor_id })
            }
            Intent::Stop => {
                let stopped = self.motion.hold_all().await?;
                info!(motors = stopped, "all motors holding position");
                Ok(IntentOutcome::Stopped { motors: stopped })
            }
            Intent::RunPattern { name } => {
                // Replays are fire-and-forget; the handle is not needed.
                let _replay = self.motion.run_pattern(&name)?;
                Ok(IntentOutcome::PatternStarted { name })
            }
            Intent::Status => Ok(IntentOutcome::Status(self.status())),
            Intent::EmergencyStop => {
                let ids = self.motion.motor_ids();
                for id in &ids {
                    if let Err(e) = self.motion.disable_motor(id) {
                        warn!(motor_id = %id, error = %e, "could not disable motor");
                    }
                }
                self.safety.raise_to(SafetyLevel::Emergency);
                error!(motors = ids.len(), "emergency stop: all motors disabled");
                Ok(IntentOutcome::EmergencyStopped { motors: ids.len() })
            }
        }
    }

    /// Snapshot of every subsystem's externally visible state.
    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            safety_level: self.safety.level(),
            behavior: self.classifier.current_state(),
            motors: self.motion.motors(),
            warnings: self.safety.warning_count(),
            stalled: self.safety.stalled_components(),
            uptime: self.uptime(),
            active: self.is_active(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Shut every component down in dependency order.
    ///
    /// Every step is idempotent, so calling again after a cancelled call
    /// finishes the job; a second call after a completed one changes nothing.
    pub async fn shutdown(&self) {
        let first = self.active.swap(false, Ordering::AcqRel);
        if first {
            info!("orchestrator shutting down");
        }

        let _ = self.shutdown.send(true);
        let analysis = self.analysis.lock().take();
        if let Some(analysis) = analysis
            && let Err(e) = analysis.await
        {
            warn!(error = %e, "analysis loop ended abnormally");
        }

        self.classifier.shutdown().await;
        self.hub.shutdown().await;
        self.motion.shutdown().await;
        self.safety.shutdown().await;
        if first {
            info!(uptime_ms = self.uptime().as_millis() as u64, "orchestrator stopped");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Analysis loop
// ─────────────────────────────────────────────────────────────────────────────

async fn run_analysis(
    hub: Arc<SensorHub>,
    classifier: Arc<BehaviorClassifier>,
    mut shutdown: watch::Receiver<bool>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let period_secs = period.as_secs_f64();

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let touch = hub.snapshot(SensorCategory::Touch);
                let pressure = hub.snapshot(SensorCategory::Pressure);
                let motion = hub.snapshot(SensorCategory::Motion);
                let Some(metrics) = derive_metrics(&touch, &pressure, &motion, period_secs) else {
                    debug!("analysis tick skipped: missing sensor data");
                    continue;
                };
                if let Err(e) = classifier.submit_metrics(metrics).await {
                    warn!(error = %e, "classifier unavailable; analysis loop stopping");
                    break;
                }
            }
        }
    }
    debug!("analysis loop stopped");
}
