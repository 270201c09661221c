//! Simulated sensor feed.
//!
//! Produces deterministic, bounded waveforms per category so the control
//! loop has something to chew on without hardware attached.  The feed drifts
//! through calm and agitated phases, which makes the classifier move between
//! states over a few minutes.

use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use kinesis_runtime::Orchestrator;
use kinesis_types::SensorCategory;
use tokio::sync::watch;
use tracing::{debug, info};

/// Samples per full agitation cycle.
const PHASE_STEPS: f64 = 1200.0;

/// Value of `category` at step `n`.  Always within `[0, 1]`.
pub fn sample(category: SensorCategory, n: u64) -> f64 {
    let t = n as f64;
    // 0 when calm, 1 when agitated.
    let agitation = 0.5 - 0.5 * (TAU * t / PHASE_STEPS).cos();
    let value = match category {
        SensorCategory::Touch => 0.1 + 0.8 * agitation + 0.05 * (t * 0.7).sin(),
        SensorCategory::Pressure => 0.1 + 0.75 * agitation + 0.05 * (t * 0.3).cos(),
        SensorCategory::Motion => {
            // Steps more often as agitation rises.
            let hold = 1 + ((1.0 - agitation) * 8.0) as u64;
            ((n / hold) % 2) as f64
        }
        SensorCategory::Temperature => 0.35 + 0.05 * (TAU * t / (PHASE_STEPS * 4.0)).sin(),
    };
    value.clamp(0.0, 1.0)
}

/// Ingest one sample per category every `period` until `stop` flips or the
/// hub closes.
pub async fn run(orch: Arc<Orchestrator>, period: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    let mut n: u64 = 0;
    info!(period_ms = period.as_millis() as u64, "simulated sensor feed started");

    'feed: loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                for category in SensorCategory::ALL {
                    if let Err(e) = orch.ingest(category, sample(category, n)).await {
                        debug!(error = %e, "sensor hub closed; feed stopping");
                        break 'feed;
                    }
                }
                n += 1;
            }
        }
    }
    info!(samples = n, "simulated sensor feed stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_are_bounded_and_deterministic() {
        for n in 0..5000 {
            for category in SensorCategory::ALL {
                let v = sample(category, n);
                assert!((0.0..=1.0).contains(&v), "{category} at {n}: {v}");
                assert_eq!(v, sample(category, n));
            }
        }
    }

    #[test]
    fn agitated_phase_is_more_intense_than_calm_phase() {
        let calm = sample(SensorCategory::Touch, 0);
        let agitated = sample(SensorCategory::Touch, 600);
        assert!(calm < 0.3, "calm touch {calm}");
        assert!(agitated > 0.8, "agitated touch {agitated}");
    }

    #[test]
    fn motion_changes_faster_when_agitated() {
        let changes = |from: u64| {
            (from..from + 40)
                .filter(|n| sample(SensorCategory::Motion, *n) != sample(SensorCategory::Motion, n + 1))
                .count()
        };
        assert!(changes(590) > changes(0));
    }
}
