//! Metric derivation from raw sensor snapshots.
//!
//! | Metric | Formula |
//! |---|---|
//! | `intensity` | mean of the latest touch and the latest pressure value |
//! | `frequency` | changes between consecutive motion samples / motion samples |
//! | `consistency` | `1 / (1 + variance)` over touch, pressure and motion together |
//! | `duration` | the analysis period, in seconds |

use kinesis_types::PatternMetrics;

/// Metrics for one analysis tick, or `None` when touch, pressure or motion
/// has no samples yet.
pub fn derive_metrics(
    touch: &[f64],
    pressure: &[f64],
    motion: &[f64],
    period_secs: f64,
) -> Option<PatternMetrics> {
    let intensity = intensity(touch, pressure)?;
    if motion.is_empty() {
        return None;
    }
    Some(PatternMetrics {
        intensity,
        frequency: frequency(motion),
        duration: period_secs,
        consistency: consistency(&[touch, pressure, motion]),
    })
}

fn intensity(touch: &[f64], pressure: &[f64]) -> Option<f64> {
    Some((touch.last()? + pressure.last()?) / 2.0)
}

fn frequency(motion: &[f64]) -> f64 {
    if motion.len() < 2 {
        return 0.0;
    }
    let changes = motion.windows(2).filter(|w| w[0] != w[1]).count();
    changes as f64 / motion.len() as f64
}

fn consistency(series: &[&[f64]]) -> f64 {
    let n: usize = series.iter().map(|s| s.len()).sum();
    if n < 2 {
        return 1.0;
    }
    let values = || series.iter().flat_map(|s| s.iter().copied());
    let mean = values().sum::<f64>() / n as f64;
    let variance = values().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
    (1.0 / (1.0 + variance)).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn missing_category_skips_tick() {
        assert!(derive_metrics(&[], &[0.5], &[0.1], 1.0).is_none());
        assert!(derive_metrics(&[0.5], &[], &[0.1], 1.0).is_none());
        assert!(derive_metrics(&[0.5], &[0.5], &[], 1.0).is_none());
    }

    #[test]
    fn intensity_uses_latest_readings() {
        let m = derive_metrics(&[0.0, 0.2], &[1.0, 0.6], &[0.0], 1.0).unwrap();
        assert!((m.intensity - 0.4).abs() < 1e-12);
    }

    #[test]
    fn frequency_counts_changes() {
        let m = derive_metrics(&[0.0], &[0.0], &[1.0, 1.0, 2.0, 3.0], 1.0).unwrap();
        assert_eq!(m.frequency, 0.5);

        let single = derive_metrics(&[0.0], &[0.0], &[1.0], 1.0).unwrap();
        assert_eq!(single.frequency, 0.0);
    }

    #[test]
    fn constant_signal_is_fully_consistent() {
        let m = derive_metrics(&[0.5; 10], &[0.5; 10], &[0.5; 10], 1.0).unwrap();
        assert_eq!(m.consistency, 1.0);
        assert_eq!(m.duration, 1.0);
    }

    #[test]
    fn spread_lowers_consistency() {
        // Values 0 and 2 around mean 1: variance 1.
        let m = derive_metrics(&[0.0], &[2.0], &[0.0, 2.0], 1.0).unwrap();
        assert_eq!(m.consistency, 0.5);
    }

    proptest! {
        #[test]
        fn scores_stay_in_range(
            touch in proptest::collection::vec(0.0f64..1.0, 1..50),
            pressure in proptest::collection::vec(0.0f64..1.0, 1..50),
            motion in proptest::collection::vec(0.0f64..1.0, 1..50),
        ) {
            let m = derive_metrics(&touch, &pressure, &motion, 1.0).unwrap();
            prop_assert!((0.0..=1.0).contains(&m.intensity));
            prop_assert!((0.0..1.0).contains(&m.frequency));
            prop_assert!(m.consistency > 0.0 && m.consistency <= 1.0);
        }
    }
}
