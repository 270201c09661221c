//! `kinesis-behavior` – Behavior Classifier
//!
//! Turns a stream of [`PatternMetrics`][kinesis_types::PatternMetrics] into a
//! discrete [`BehaviorType`][kinesis_types::BehaviorType] with a confidence
//! score.
//!
//! Two noise-rejection mechanisms keep the visible state from flickering:
//!
//! 1. **Window-then-average** – each classification uses the mean of the last
//!    `window` samples, not a single sample.
//! 2. **Confidence gate** – the current state only changes when a
//!    classification's confidence reaches the threshold.  Every
//!    classification is still recorded in the history.
//!
//! # Modules
//!
//! - [`rules`] – pure averaging and classification rules.
//! - [`classifier`] – [`BehaviorClassifier`][classifier::BehaviorClassifier],
//!   the queue-fed periodic worker holding state and history.

pub mod classifier;
pub mod rules;

pub use classifier::{BehaviorClassifier, ClassifierConfig};
pub use rules::{average, classify, classify_metrics};
