//! Session aggregation

use serde::{Deserialize, Serialize};

use crate::{AggregationError, SampleResult, SkinMetric, SkinMetrics};

/// Accepted samples in one complete capture session
pub const SAMPLES_PER_SESSION: usize = 3;

/// Per-metric arithmetic mean over a session's samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    #[serde(flatten)]
    pub metrics: SkinMetrics,
}

impl AggregatedMetrics {
    /// Aggregate a slice, rejecting anything but a full session
    pub fn try_from_samples(samples: &[SampleResult]) -> Result<Self, AggregationError> {
        let samples: &[SampleResult; SAMPLES_PER_SESSION] =
            samples.try_into().map_err(|_| AggregationError::Precondition {
                expected: SAMPLES_PER_SESSION,
                actual: samples.len(),
            })?;
        Ok(aggregate(samples))
    }

    pub fn get(&self, metric: SkinMetric) -> f32 {
        self.metrics.get(metric)
    }
}

/// Mean of exactly three samples
pub fn aggregate(samples: &[SampleResult; SAMPLES_PER_SESSION]) -> AggregatedMetrics {
    let metrics = SkinMetrics::from_fn(|metric| {
        samples.iter().map(|s| s.metrics.get(metric)).sum::<f32>() / SAMPLES_PER_SESSION as f32
    });
    AggregatedMetrics { metrics }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_manager::FaceRegion;
    use proptest::prelude::*;

    fn sample(value: f32) -> SampleResult {
        SampleResult {
            metrics: SkinMetrics::from_fn(|_| value),
            face: FaceRegion {
                x_min: 0.0,
                y_min: 0.0,
                x_max: 10.0,
                y_max: 10.0,
                confidence: 0.9,
            },
        }
    }

    #[test]
    fn test_mean_of_three() {
        let aggregated = aggregate(&[sample(10.0), sample(20.0), sample(30.0)]);
        for (_, value) in aggregated.metrics.iter() {
            assert!((value - 20.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_wrong_count_is_rejected() {
        for n in [0, 1, 2, 4] {
            let samples = vec![sample(50.0); n];
            assert_eq!(
                AggregatedMetrics::try_from_samples(&samples),
                Err(AggregationError::Precondition {
                    expected: 3,
                    actual: n
                })
            );
        }
        assert!(AggregatedMetrics::try_from_samples(&[sample(1.0), sample(2.0), sample(3.0)]).is_ok());
    }

    #[test]
    fn test_serializes_flat() {
        let aggregated = aggregate(&[sample(40.0), sample(40.0), sample(40.0)]);
        let json = serde_json::to_value(aggregated).unwrap();
        assert!(json.get("hydration").is_some());
        assert!(json.get("metrics").is_none());
    }

    proptest! {
        #[test]
        fn prop_mean_stays_in_bounds(a in 0.0f32..=100.0, b in 0.0f32..=100.0, c in 0.0f32..=100.0) {
            let aggregated = aggregate(&[sample(a), sample(b), sample(c)]);
            prop_assert!(aggregated.metrics.in_bounds());
        }
    }
}
