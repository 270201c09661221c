//! Classification rules.
//!
//! | Averaged metrics | Result |
//! |---|---|
//! | `intensity > 0.8` and `frequency > 0.8` | `aggressive` |
//! | `intensity < 0.2` and `frequency < 0.2` | `passive` |
//! | `|intensity - frequency| > 0.5` | `erratic` |
//! | otherwise | `normal` |
//!
//! Rules are tried top to bottom.  Confidence is the mean `consistency`
//! clamped to `[0, 1]`.

use chrono::Utc;
use kinesis_types::{BehaviorPattern, BehaviorType, PatternMetrics};

const HIGH: f64 = 0.8;
const LOW: f64 = 0.2;
const SPREAD: f64 = 0.5;

/// Field-wise arithmetic mean, or `None` for an empty window.
pub fn average<'a, I>(window: I) -> Option<PatternMetrics>
where
    I: IntoIterator<Item = &'a PatternMetrics>,
{
    let mut sum = PatternMetrics::default();
    let mut n = 0usize;
    for m in window {
        sum.intensity += m.intensity;
        sum.frequency += m.frequency;
        sum.duration += m.duration;
        sum.consistency += m.consistency;
        n += 1;
    }
    if n == 0 {
        return None;
    }
    let n = n as f64;
    Some(PatternMetrics {
        intensity: sum.intensity / n,
        frequency: sum.frequency / n,
        duration: sum.duration / n,
        consistency: sum.consistency / n,
    })
}

/// Behaviour type and confidence for already-averaged metrics.
pub fn classify_metrics(metrics: &PatternMetrics) -> (BehaviorType, f64) {
    let (i, f) = (metrics.intensity, metrics.frequency);
    let behavior = if i > HIGH && f > HIGH {
        BehaviorType::Aggressive
    } else if i < LOW && f < LOW {
        BehaviorType::Passive
    } else if (i - f).abs() > SPREAD {
        BehaviorType::Erratic
    } else {
        BehaviorType::Normal
    };
    (behavior, confidence(metrics.consistency))
}

fn confidence(consistency: f64) -> f64 {
    if consistency.is_nan() {
        0.0
    } else {
        consistency.clamp(0.0, 1.0)
    }
}

/// Average `window` and classify the result, stamping it with the current
/// time.  `None` for an empty window.
pub fn classify<'a, I>(window: I) -> Option<BehaviorPattern>
where
    I: IntoIterator<Item = &'a PatternMetrics>,
{
    let metrics = average(window)?;
    let (behavior, confidence) = classify_metrics(&metrics);
    Some(BehaviorPattern {
        behavior,
        confidence,
        timestamp: Utc::now(),
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn m(intensity: f64, frequency: f64, consistency: f64) -> PatternMetrics {
        PatternMetrics {
            intensity,
            frequency,
            duration: 1.0,
            consistency,
        }
    }

    #[test]
    fn empty_window_has_no_classification() {
        let empty: [PatternMetrics; 0] = [];
        assert!(average(&empty).is_none());
        assert!(classify(&empty).is_none());
    }

    #[test]
    fn averages_every_field() {
        let avg = average(&[m(0.0, 1.0, 0.5), m(1.0, 0.0, 1.0)]).unwrap();
        assert_eq!(avg.intensity, 0.5);
        assert_eq!(avg.frequency, 0.5);
        assert_eq!(avg.duration, 1.0);
        assert_eq!(avg.consistency, 0.75);
    }

    #[test]
    fn rule_table() {
        assert_eq!(classify_metrics(&m(0.9, 0.9, 1.0)).0, BehaviorType::Aggressive);
        assert_eq!(classify_metrics(&m(0.1, 0.1, 1.0)).0, BehaviorType::Passive);
        assert_eq!(classify_metrics(&m(0.9, 0.2, 1.0)).0, BehaviorType::Erratic);
        assert_eq!(classify_metrics(&m(0.1, 0.7, 1.0)).0, BehaviorType::Erratic);
        assert_eq!(classify_metrics(&m(0.5, 0.5, 1.0)).0, BehaviorType::Normal);
        // Thresholds are strict.
        assert_eq!(classify_metrics(&m(0.8, 0.9, 1.0)).0, BehaviorType::Normal);
        assert_eq!(classify_metrics(&m(0.2, 0.1, 1.0)).0, BehaviorType::Normal);
    }

    #[test]
    fn aggressive_window_with_full_consistency() {
        let window = vec![m(0.9, 0.9, 1.0); 60];
        let pattern = classify(&window).unwrap();
        assert_eq!(pattern.behavior, BehaviorType::Aggressive);
        assert_eq!(pattern.confidence, 1.0);
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(classify_metrics(&m(0.5, 0.5, 3.0)).1, 1.0);
        assert_eq!(classify_metrics(&m(0.5, 0.5, -1.0)).1, 0.0);
        assert_eq!(classify_metrics(&m(0.5, 0.5, f64::NAN)).1, 0.0);
    }

    proptest! {
        #[test]
        fn confidence_always_in_unit_range(
            samples in proptest::collection::vec(
                (-2.0f64..2.0, -2.0f64..2.0, -5.0f64..5.0), 1..80),
        ) {
            let window: Vec<PatternMetrics> =
                samples.iter().map(|(i, f, c)| m(*i, *f, *c)).collect();
            let pattern = classify(&window).unwrap();
            prop_assert!((0.0..=1.0).contains(&pattern.confidence));
        }
    }
}
