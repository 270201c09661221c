//! [`MotionController`] – queued motor commands, fixed-period integration and
//! pattern replay.
//!
//! All motor mutation happens on one worker task that multiplexes three
//! sources with an unbiased `select!`: the shutdown signal, the bounded command
//! queue, and an integration tick of `tick_ms`.  Each tick advances every motor
//! by exactly `tick_ms` of simulated time, so motion is independent of
//! scheduling jitter.
//!
//! Commands arrive two ways:
//!
//! - [`MotionController::submit_command`] enqueues a command and waits for
//!   the worker's verdict.
//! - [`MotionController::run_pattern`] spawns a replay task that enqueues the
//!   pattern's commands one by one, without waiting for verdicts.  A replayed
//!   command that fails validation is logged and published as
//!   [`EventPayload::CommandRejected`] on [`Topic::SystemAlerts`].
//!
//! # Shutdown
//!
//! [`MotionController::shutdown`] marks the controller not-running (pattern
//! replays stop before their next command), closes the queue, lets the worker
//! execute whatever was already accepted, stops the worker, and finally
//! disables every motor.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use kinesis_middleware::{EventBus, Topic};
use kinesis_types::{EventPayload, KinesisError, MotorCommand, MotorId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::motor::{Motor, MotorSpec, MotorTable};
use crate::pattern::MovementPattern;

const SOURCE: &str = "kinesis-motion::controller";
const COMPONENT: &str = "motion_controller";

/// Tunables for a [`MotionController`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Capacity of the command queue.
    pub queue_capacity: usize,
    /// Integration period, in milliseconds.
    pub tick_ms: u64,
    /// Minimum interval between worker heartbeats, in milliseconds.
    pub heartbeat_ms: u64,
    /// The motor roster.
    pub motors: Vec<MotorSpec>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            tick_ms: 10,
            heartbeat_ms: 250,
            motors: MotorSpec::default_roster(),
        }
    }
}

type Verdict = Result<(), KinesisError>;

/// A request on its way to the worker.
enum Request {
    /// `reply` is `None` for pattern replay.
    Command {
        command: MotorCommand,
        reply: Option<oneshot::Sender<Verdict>>,
    },
    /// Zero the speed of every enabled motor; replies with how many.
    HoldAll { reply: oneshot::Sender<usize> },
}

/// Sole owner of the motor table.
///
/// Construct inside a Tokio runtime: [`MotionController::new`] spawns the
/// worker.
pub struct MotionController {
    motors: Arc<RwLock<MotorTable>>,
    patterns: RwLock<HashMap<String, MovementPattern>>,
    /// `None` once the controller has been shut down.
    sender: Mutex<Option<mpsc::Sender<Request>>>,
    running: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    bus: EventBus,
}

impl MotionController {
    /// Build the motor table from `config.motors` and start the worker.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, or when
    /// `config.queue_capacity` is zero.
    pub fn new(config: MotionConfig, bus: EventBus) -> Self {
        let motors = Arc::new(RwLock::new(MotorTable::from_specs(&config.motors)));
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(run_worker(
            rx,
            Arc::clone(&motors),
            shutdown_rx,
            bus.clone(),
            Duration::from_millis(config.tick_ms.max(1)),
            Duration::from_millis(config.heartbeat_ms),
        ));
        info!(
            motors = motors.read().len(),
            tick_ms = config.tick_ms,
            "motion controller started"
        );

        Self {
            motors,
            patterns: RwLock::new(HashMap::new()),
            sender: Mutex::new(Some(tx)),
            running: Arc::new(AtomicBool::new(true)),
            shutdown,
            worker: Mutex::new(Some(worker)),
            bus,
        }
    }

    /// Enqueue `command` and wait for the worker to execute it.
    ///
    /// Waits while the command queue is full.
    ///
    /// # Errors
    ///
    /// - [`KinesisError::MotorNotFound`], [`KinesisError::MotorDisabled`] or
    ///   [`KinesisError::OutOfRange`] when the worker rejects the command.
    ///   The motor is unchanged in that case.
    /// - [`KinesisError::Closed`] when the controller has been shut down.
    pub async fn submit_command(&self, command: MotorCommand) -> Verdict {
        let sender = self.sender()?;
        let (reply, verdict) = oneshot::channel();
        enqueue(
            &sender,
            &self.bus,
            Request::Command {
                command,
                reply: Some(reply),
            },
        )
        .await?;
        verdict
            .await
            .map_err(|_| KinesisError::closed(COMPONENT))?
    }

    /// Stop every enabled motor where it is, in one step on the worker, and
    /// return how many were held.
    ///
    /// # Errors
    ///
    /// [`KinesisError::Closed`] when the controller has been shut down.
    pub async fn hold_all(&self) -> Result<usize, KinesisError> {
        let sender = self.sender()?;
        let (reply, held) = oneshot::channel();
        enqueue(&sender, &self.bus, Request::HoldAll { reply }).await?;
        held.await.map_err(|_| KinesisError::closed(COMPONENT))
    }

    /// Add or replace a named pattern.
    pub fn register_pattern(&self, pattern: MovementPattern) {
        debug!(
            pattern = %pattern.name,
            commands = pattern.commands.len(),
            "movement pattern registered"
        );
        self.patterns.write().insert(pattern.name.clone(), pattern);
    }

    /// Names of every registered pattern, sorted.
    pub fn pattern_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.patterns.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Start replaying the named pattern in the background.
    ///
    /// Returns immediately.  The replay enqueues command `i` at roughly
    /// `i * spacing` after the start and stops early once the controller
    /// stops running.  The returned handle completes when the replay ends.
    ///
    /// # Errors
    ///
    /// - [`KinesisError::PatternNotFound`] for an unknown name.
    /// - [`KinesisError::Closed`] when the controller has been shut down.
    pub fn run_pattern(&self, name: &str) -> Result<JoinHandle<()>, KinesisError> {
        let pattern = self
            .patterns
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| KinesisError::PatternNotFound(name.to_string()))?;
        if !self.is_running() {
            return Err(KinesisError::closed(COMPONENT));
        }
        let sender = self.sender()?;
        info!(pattern = name, commands = pattern.commands.len(), "pattern replay started");
        Ok(tokio::spawn(replay(
            pattern,
            sender,
            Arc::clone(&self.running),
            self.bus.clone(),
        )))
    }

    /// Snapshot of every motor, ordered by id.
    pub fn motors(&self) -> Vec<Motor> {
        self.motors.read().snapshot()
    }

    /// Snapshot of one motor.
    pub fn motor(&self, id: &str) -> Option<Motor> {
        self.motors.read().get(id).cloned()
    }

    pub fn motor_ids(&self) -> Vec<MotorId> {
        self.motors.read().ids()
    }

    /// Stop and disable one motor.
    ///
    /// # Errors
    ///
    /// [`KinesisError::MotorNotFound`] for an unknown id.
    pub fn disable_motor(&self, id: &str) -> Verdict {
        let mut motors = self.motors.write();
        let motor = motors
            .get_mut(id)
            .ok_or_else(|| KinesisError::MotorNotFound(id.to_string()))?;
        motor.disable();
        info!(motor_id = id, "motor disabled");
        Ok(())
    }

    /// Re-enable one motor.
    ///
    /// # Errors
    ///
    /// - [`KinesisError::Closed`] after shutdown; motors stay disabled.
    /// - [`KinesisError::MotorNotFound`] for an unknown id.
    pub fn enable_motor(&self, id: &str) -> Verdict {
        if !self.is_running() {
            return Err(KinesisError::closed(COMPONENT));
        }
        let mut motors = self.motors.write();
        let motor = motors
            .get_mut(id)
            .ok_or_else(|| KinesisError::MotorNotFound(id.to_string()))?;
        motor.enable();
        info!(motor_id = id, "motor enabled");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop replays, execute the commands already queued, stop the worker and
    /// disable every motor.  On return no motor is moving, also when an
    /// earlier call was cancelled or is still in flight.
    ///
    /// A second call changes nothing.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        let first = self.sender.lock().take().is_some();
        if first {
            // Receivers only disappear if the worker already exited.
            let _ = self.shutdown.send(true);
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            warn!(error = %e, "motion worker ended abnormally");
        }
        // A worker still draining elsewhere can only be rejected by disabled
        // motors from here on.
        self.motors.write().disable_all();
        if first {
            info!("motion controller shut down");
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<Request>, KinesisError> {
        self.sender
            .lock()
            .clone()
            .ok_or_else(|| KinesisError::closed(COMPONENT))
    }
}

/// Put `queued` on the command queue, alerting on backpressure.
async fn enqueue(
    sender: &mpsc::Sender<Request>,
    bus: &EventBus,
    queued: Request,
) -> Result<(), KinesisError> {
    match sender.try_send(queued) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Full(queued)) => {
            warn!("motor command queue full; waiting for space");
            bus.emit(
                Topic::SystemAlerts,
                SOURCE,
                EventPayload::Backpressure {
                    component: COMPONENT.to_string(),
                },
            );
            sender
                .send(queued)
                .await
                .map_err(|_| KinesisError::closed(COMPONENT))
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Err(KinesisError::closed(COMPONENT)),
    }
}

async fn replay(
    pattern: MovementPattern,
    sender: mpsc::Sender<Request>,
    running: Arc<AtomicBool>,
    bus: EventBus,
) {
    let spacing = pattern.spacing();
    let total = pattern.commands.len();
    for (i, command) in pattern.commands.into_iter().enumerate() {
        if !running.load(Ordering::Acquire) {
            debug!(pattern = %pattern.name, sent = i, total, "pattern replay abandoned");
            return;
        }
        let queued = Request::Command {
            command,
            reply: None,
        };
        if enqueue(&sender, &bus, queued).await.is_err() {
            debug!(pattern = %pattern.name, sent = i, total, "pattern replay abandoned");
            return;
        }
        tokio::time::sleep(spacing).await;
    }
    debug!(pattern = %pattern.name, total, "pattern replay finished");
}

async fn run_worker(
    mut rx: mpsc::Receiver<Request>,
    motors: Arc<RwLock<MotorTable>>,
    mut shutdown: watch::Receiver<bool>,
    bus: EventBus,
    tick: Duration,
    heartbeat: Duration,
) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let dt = tick.as_secs_f64();
    let mut last_heartbeat: Option<Instant> = None;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            queued = rx.recv() => match queued {
                Some(queued) => execute(&motors, &bus, queued),
                None => break,
            },
            _ = ticker.tick() => {
                motors.write().integrate(dt);
                if last_heartbeat.is_none_or(|at| at.elapsed() >= heartbeat) {
                    bus.emit(
                        Topic::Telemetry,
                        SOURCE,
                        EventPayload::Heartbeat { component: COMPONENT.to_string() },
                    );
                    last_heartbeat = Some(Instant::now());
                }
            }
        }
    }

    rx.close();
    let mut drained = 0usize;
    while let Some(queued) = rx.recv().await {
        execute(&motors, &bus, queued);
        drained += 1;
    }
    debug!(drained, "motion worker stopped");
}

fn execute(motors: &RwLock<MotorTable>, bus: &EventBus, request: Request) {
    let (command, reply) = match request {
        Request::Command { command, reply } => (command, reply),
        Request::HoldAll { reply } => {
            let held = motors.write().hold_all();
            debug!(held, "motors holding position");
            // The submitter may have given up waiting.
            let _ = reply.send(held);
            return;
        }
    };
    let verdict = motors.write().execute(&command);
    match &verdict {
        Ok(()) => debug!(
            motor_id = %command.motor_id,
            position = command.target_position,
            speed = command.target_speed,
            "motor command applied"
        ),
        Err(e) => {
            warn!(motor_id = %command.motor_id, error = %e, "motor command rejected");
            if reply.is_none() {
                bus.emit(
                    Topic::SystemAlerts,
                    SOURCE,
                    EventPayload::CommandRejected {
                        motor_id: command.motor_id.clone(),
                        reason: e.to_string(),
                    },
                );
            }
        }
    }
    if let Some(reply) = reply {
        // The submitter may have given up waiting.
        let _ = reply.send(verdict);
    }
}
