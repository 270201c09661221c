//! [`SensorHub`] – ring-buffered store of recent readings per category.
//!
//! Producers call [`SensorHub::ingest`], which places the reading on a bounded
//! queue.  When the queue is full the call waits until the worker frees a slot
//! (backpressure, never drop) and a [`EventPayload::Backpressure`] alert is
//! published so the safety supervisor can take note.
//!
//! A single background worker moves readings from the queue into the
//! per-category [`SensorBuffer`]s.  Readers call [`SensorHub::snapshot`],
//! which copies one buffer under a shared lock; snapshots never block each
//! other.
//!
//! # Example
//!
//! ```rust
//! use kinesis_middleware::EventBus;
//! use kinesis_sensor::{HubConfig, SensorHub};
//! use kinesis_types::{SensorCategory, SensorReading};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hub = SensorHub::new(HubConfig::default(), EventBus::default());
//! hub.ingest(SensorReading::new(SensorCategory::Touch, 0.4)).await.unwrap();
//! hub.shutdown().await;
//!
//! assert_eq!(hub.snapshot(SensorCategory::Touch), vec![0.4]);
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kinesis_middleware::{EventBus, Topic};
use kinesis_types::{EventPayload, KinesisError, SensorCategory, SensorReading};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::buffer::SensorBuffer;

const SOURCE: &str = "kinesis-sensor::hub";
const COMPONENT: &str = "sensor_hub";

/// Tunables for a [`SensorHub`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Capacity of the ingest queue.
    pub queue_capacity: usize,
    /// Capacity of every per-category buffer.
    pub buffer_capacity: usize,
    /// Interval between worker heartbeats, in milliseconds.
    pub heartbeat_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            buffer_capacity: 1000,
            heartbeat_ms: 250,
        }
    }
}

type Buffers = Arc<RwLock<HashMap<SensorCategory, SensorBuffer>>>;

/// Concurrent sensor store fed by a bounded queue.
///
/// Construct inside a Tokio runtime: [`SensorHub::new`] spawns the ingest
/// worker.
pub struct SensorHub {
    buffers: Buffers,
    /// `None` once the hub has been shut down.
    sender: Mutex<Option<mpsc::Sender<SensorReading>>>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    bus: EventBus,
}

impl SensorHub {
    /// Create the hub and start its ingest worker.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, or when
    /// `config.queue_capacity` is zero.
    pub fn new(config: HubConfig, bus: EventBus) -> Self {
        let buffers: Buffers = Arc::new(RwLock::new(
            SensorCategory::ALL
                .iter()
                .map(|c| (*c, SensorBuffer::new(config.buffer_capacity)))
                .collect(),
        ));
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(run_worker(
            rx,
            Arc::clone(&buffers),
            shutdown_rx,
            bus.clone(),
            Duration::from_millis(config.heartbeat_ms.max(1)),
        ));
        info!(
            queue_capacity = config.queue_capacity,
            buffer_capacity = config.buffer_capacity,
            "sensor hub started"
        );

        Self {
            buffers,
            sender: Mutex::new(Some(tx)),
            shutdown,
            worker: Mutex::new(Some(worker)),
            bus,
        }
    }

    /// Enqueue `reading` for storage.
    ///
    /// Waits while the ingest queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`KinesisError::HubClosed`] when the hub has been shut down,
    /// including when shutdown happens while this call is waiting for space.
    pub async fn ingest(&self, reading: SensorReading) -> Result<(), KinesisError> {
        let sender = self.sender.lock().clone().ok_or(KinesisError::HubClosed)?;
        match sender.try_send(reading) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(reading)) => {
                warn!(category = %reading.category, "sensor ingest queue full; waiting for space");
                self.bus.emit(
                    Topic::SystemAlerts,
                    SOURCE,
                    EventPayload::Backpressure {
                        component: COMPONENT.to_string(),
                    },
                );
                sender
                    .send(reading)
                    .await
                    .map_err(|_| KinesisError::HubClosed)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(KinesisError::HubClosed),
        }
    }

    /// Copy of the current buffer for `category`, most-recent-last.
    pub fn snapshot(&self, category: SensorCategory) -> Vec<f64> {
        self.buffers
            .read()
            .get(&category)
            .map(SensorBuffer::to_vec)
            .unwrap_or_default()
    }

    /// Most recent value for `category`, if any.
    pub fn latest(&self, category: SensorCategory) -> Option<f64> {
        self.buffers
            .read()
            .get(&category)
            .and_then(SensorBuffer::latest)
    }

    /// `true` once [`shutdown`][Self::shutdown] has been called.
    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stop accepting readings, store the ones already queued, and stop the
    /// worker.  Buffers stay readable afterwards.
    ///
    /// A second call is a no-op.
    pub async fn shutdown(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        drop(sender);
        // Receivers only disappear if the worker already exited.
        let _ = self.shutdown.send(true);

        let worker = self.worker.lock().take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            warn!(error = %e, "sensor hub worker ended abnormally");
        }
        info!("sensor hub shut down");
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<SensorReading>,
    buffers: Buffers,
    mut shutdown: watch::Receiver<bool>,
    bus: EventBus,
    heartbeat: Duration,
) {
    let mut heartbeat_tick = tokio::time::interval(heartbeat);
    heartbeat_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            reading = rx.recv() => match reading {
                Some(reading) => store(&buffers, reading),
                None => break,
            },
            _ = heartbeat_tick.tick() => {
                bus.emit(
                    Topic::Telemetry,
                    SOURCE,
                    EventPayload::Heartbeat { component: COMPONENT.to_string() },
                );
            }
        }
    }

    // Refuse new (and waiting) producers, then keep what was already accepted.
    rx.close();
    let mut drained = 0usize;
    while let Some(reading) = rx.recv().await {
        store(&buffers, reading);
        drained += 1;
    }
    debug!(drained, "sensor hub worker stopped");
}

fn store(buffers: &Buffers, reading: SensorReading) {
    let mut guard = buffers.write();
    if let Some(buffer) = guard.get_mut(&reading.category) {
        buffer.push(reading.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub_with(config: HubConfig) -> (SensorHub, EventBus) {
        let bus = EventBus::default();
        (SensorHub::new(config, bus.clone()), bus)
    }

    #[tokio::test]
    async fn snapshot_is_bounded_and_fifo() {
        let (hub, _bus) = hub_with(HubConfig::default());
        for i in 0..1500 {
            hub.ingest(SensorReading::new(SensorCategory::Pressure, i as f64))
                .await
                .unwrap();
        }
        hub.shutdown().await;

        let snap = hub.snapshot(SensorCategory::Pressure);
        assert_eq!(snap.len(), 1000);
        assert_eq!(snap.first().copied(), Some(500.0));
        assert_eq!(snap.last().copied(), Some(1499.0));
        assert!(snap.windows(2).all(|w| w[0] < w[1]), "order must be preserved");
    }

    #[tokio::test]
    async fn categories_are_kept_apart() {
        let (hub, _bus) = hub_with(HubConfig::default());
        hub.ingest(SensorReading::new(SensorCategory::Touch, 1.0))
            .await
            .unwrap();
        hub.ingest(SensorReading::new(SensorCategory::Motion, 2.0))
            .await
            .unwrap();
        hub.shutdown().await;

        assert_eq!(hub.snapshot(SensorCategory::Touch), vec![1.0]);
        assert_eq!(hub.snapshot(SensorCategory::Motion), vec![2.0]);
        assert!(hub.snapshot(SensorCategory::Temperature).is_empty());
        assert_eq!(hub.latest(SensorCategory::Motion), Some(2.0));
        assert_eq!(hub.latest(SensorCategory::Pressure), None);
    }

    #[tokio::test]
    async fn ingest_after_shutdown_fails_with_hub_closed() {
        let (hub, _bus) = hub_with(HubConfig::default());
        hub.shutdown().await;
        assert!(hub.is_closed());

        let result = hub
            .ingest(SensorReading::new(SensorCategory::Touch, 1.0))
            .await;
        assert_eq!(result, Err(KinesisError::HubClosed));
    }

    #[tokio::test]
    async fn second_shutdown_is_a_noop() {
        let (hub, _bus) = hub_with(HubConfig::default());
        hub.ingest(SensorReading::new(SensorCategory::Touch, 3.0))
            .await
            .unwrap();
        hub.shutdown().await;
        let before = hub.snapshot(SensorCategory::Touch);
        hub.shutdown().await;
        assert_eq!(hub.snapshot(SensorCategory::Touch), before);
    }

    #[tokio::test]
    async fn full_queue_waits_and_reports_backpressure() {
        let (hub, bus) = hub_with(HubConfig {
            queue_capacity: 4,
            ..HubConfig::default()
        });
        let mut alerts = bus.subscribe(Topic::SystemAlerts);

        // On the current-thread runtime the worker cannot run until this task
        // yields, so the fifth reading finds the queue full.
        for i in 0..5 {
            hub.ingest(SensorReading::new(SensorCategory::Touch, i as f64))
                .await
                .unwrap();
        }
        hub.shutdown().await;

        let event = alerts.try_recv().expect("backpressure alert expected");
        assert!(matches!(
            event.payload,
            EventPayload::Backpressure { ref component } if component == "sensor_hub"
        ));
        // Nothing was dropped.
        assert_eq!(
            hub.snapshot(SensorCategory::Touch),
            vec![0.0, 1.0, 2.0, 3.0, 4.0]
        );
    }

    #[tokio::test]
    async fn worker_emits_heartbeats() {
        let bus = EventBus::default();
        let mut telemetry = bus.subscribe(Topic::Telemetry);
        let hub = SensorHub::new(
            HubConfig {
                heartbeat_ms: 5,
                ..HubConfig::default()
            },
            bus.clone(),
        );

        let event = tokio::time::timeout(Duration::from_secs(1), telemetry.recv())
            .await
            .expect("heartbeat within a second")
            .expect("bus open");
        assert!(matches!(event.payload, EventPayload::Heartbeat { .. }));
        hub.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_and_readers() {
        let (hub, _bus) = hub_with(HubConfig::default());
        let hub = Arc::new(hub);

        let mut tasks = Vec::new();
        for p in 0..4 {
            let hub = Arc::clone(&hub);
            tasks.push(tokio::spawn(async move {
                for i in 0..500 {
                    hub.ingest(SensorReading::new(SensorCategory::Motion, (p * 1000 + i) as f64))
                        .await
                        .unwrap();
                }
            }));
        }
        for _ in 0..4 {
            let hub = Arc::clone(&hub);
            tasks.push(tokio::spawn(async move {
                for _ in 0..200 {
                    assert!(hub.snapshot(SensorCategory::Motion).len() <= 1000);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        hub.shutdown().await;
        assert_eq!(hub.snapshot(SensorCategory::Motion).len(), 1000);
    }
}
