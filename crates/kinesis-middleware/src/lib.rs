//! `kinesis-middleware` – The Nervous System
//!
//! Routes signals between the control-loop components without any of them
//! holding a reference to (or a lock of) another.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
