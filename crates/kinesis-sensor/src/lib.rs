//! `kinesis-sensor` – Sensor Ingestion
//!
//! # Modules
//!
//! - [`buffer`] – [`SensorBuffer`][buffer::SensorBuffer]: a capacity-bounded
//!   FIFO of recent values for one sensor category.
//! - [`hub`] – [`SensorHub`][hub::SensorHub]: accepts readings through a
//!   bounded queue (producers wait when it is full), appends them to the
//!   per-category buffers from a single background worker, and serves
//!   point-in-time snapshots under a shared lock.

pub mod buffer;
pub mod hub;

pub use buffer::SensorBuffer;
pub use hub::{HubConfig, SensorHub};
