//! `kinesis-runtime` – The Control Loop
//!
//! Wires the four subsystems together and exposes the operator boundary.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]: owns the
//!   sensor hub, motion controller, behavior classifier and safety supervisor,
//!   runs the periodic analysis loop (sensor snapshots → metrics →
//!   classifier), executes [`Intent`][intent::Intent]s and shuts everything
//!   down in dependency order.
//! - [`metrics`] – [`derive_metrics`][metrics::derive_metrics]: turns raw
//!   sensor snapshots into [`PatternMetrics`][kinesis_types::PatternMetrics].
//! - [`intent`] – [`Intent`][intent::Intent] and
//!   [`IntentOutcome`][intent::IntentOutcome]: the typed commands an external
//!   intent producer hands to the orchestrator.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.

pub mod intent;
pub mod metrics;
pub mod orchestrator;
pub mod telemetry;

pub use intent::{Intent, IntentOutcome, SystemStatus};
pub use metrics::derive_metrics;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
