//! `kinesis-safety` – Safety Supervisor
//!
//! An observability surface: it accumulates warnings, escalates an ordered
//! [`SafetyLevel`][kinesis_types::SafetyLevel] and watches component
//! heartbeats.  It never halts anything itself; stopping the machine is the
//! orchestrator's or the operator's call.
//!
//! # Modules
//!
//! - [`supervisor`] – [`SafetySupervisor`][supervisor::SafetySupervisor]:
//!   warning counter, escalation policy, bus listener and periodic checks.
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]: heartbeat deadlines per
//!   component.

pub mod supervisor;
pub mod watchdog;

pub use supervisor::{SafetyConfig, SafetySupervisor, escalate};
pub use watchdog::Watchdog;
