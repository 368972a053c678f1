//! Rolling median / MAD outlier filter
//!
//! For every series a centered window of buckets (truncated at the edges,
//! empty buckets skipped) yields a rolling median and a median absolute
//! deviation. A bucket is an outlier for a series when its raw value lies
//! more than `k` scaled MADs from the rolling median. The spread never drops
//! below a floor relative to the median, so a perfectly flat window does not
//! flag ordinary jitter.

use crate::models::MetricKind;
use crate::stats::{self, MAD_SCALE};

use super::{BucketMetrics, TimeBucket};

/// Minimum spread as a fraction of the rolling median
const MAD_RELATIVE_FLOOR: f64 = 0.05;

/// Robust smoothing pass over a bucket timeline
#[derive(Debug, Clone)]
pub struct OutlierFilter {
    /// Window size in buckets (odd)
    pub window: usize,
    /// MAD multiplier
    pub k: f64,
}

struct Assessment {
    rolling: BucketMetrics,
    flagged: Vec<MetricKind>,
}

impl OutlierFilter {
    pub fn new(window: usize, k: f64) -> Self {
        Self {
            window: window.max(1),
            k,
        }
    }

    /// Flag outliers and fill smoothed values
    ///
    /// Outlier buckets get the rolling medians as smoothed values; empty
    /// buckets carry the previous smoothed values forward.
    pub fn apply(&self, mut buckets: Vec<TimeBucket>) -> Vec<TimeBucket> {
        let assessments: Vec<Option<Assessment>> =
            (0..buckets.len()).map(|i| self.assess(&buckets, i)).collect();

        let mut previous: Option<BucketMetrics> = None;
        for (bucket, assessment) in buckets.iter_mut().zip(assessments) {
            match (bucket.raw, assessment) {
                (Some(raw), Some(assessment)) => {
                    bucket.is_outlier = assessment
                        .flagged
                        .iter()
                        .any(|kind| MetricKind::CORE.contains(kind));
                    bucket.smoothed = Some(if bucket.is_outlier {
                        assessment.rolling
                    } else {
                        raw
                    });
                    bucket.outlier_metrics = assessment.flagged;
                }
                _ => {
                    bucket.smoothed = previous;
                }
            }
            previous = bucket.smoothed;
        }

        buckets
    }

    fn assess(&self, buckets: &[TimeBucket], index: usize) -> Option<Assessment> {
        let raw = buckets[index].raw?;
        let half = self.window / 2;
        let lo = index.saturating_sub(half);
        let hi = (index + half).min(buckets.len() - 1);
        let neighbours: Vec<BucketMetrics> = buckets[lo..=hi].iter().filter_map(|b| b.raw).collect();

        let mut rolling = raw;
        let mut flagged = Vec::new();
        for kind in MetricKind::PERFORMANCE {
            let window: Vec<f64> = neighbours.iter().filter_map(|m| m.get(kind)).collect();
            let (Some(value), Some(center)) = (raw.get(kind), stats::median(&window)) else {
                continue;
            };
            let spread = stats::mad(&window, center).unwrap_or(0.0) * MAD_SCALE;
            let floor = (center.abs() * MAD_RELATIVE_FLOOR).max(kind.absolute_mad_floor());
            if (value - center).abs() > self.k * spread.max(floor) {
                flagged.push(kind);
            }
            rolling.set(kind, center);
        }

        Some(Assessment { rolling, flagged })
    }
}
