//! Degradation detection for performance scopes
//!
//! This module provides:
//! - Degradation criteria for latency, error rate and throughput
//! - Persistence validation (bottleneck vs transient spike)
//! - Composite severity scoring
//! - Throughput plateau detection across concurrency levels
//! - The per-scope analyzer tying the above together

mod persistence;
mod plateau;
mod scope;
mod severity;

pub use persistence::{Persistence, PersistenceValidator};
pub use plateau::{concurrency_levels, plateau_excess, plateau_steps, ConcurrencyLevel, PlateauStep};
pub use scope::{ScopeAnalyzer, ScopeResult};
pub use severity::SeverityScorer;

use crate::bucket::TimeBucket;
use crate::models::MetricKind;

/// Rule deciding whether a bucket is degraded for one series
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    /// Smoothed p90 at or above the threshold
    LatencyAbove { threshold: f64 },
    /// Smoothed error rate at or above the threshold
    ErrorRateAbove { threshold: f64 },
    /// Smoothed throughput below the ceiling
    ThroughputBelow { ceiling: f64 },
}

impl Criterion {
    pub fn metric(&self) -> MetricKind {
        match self {
            Criterion::LatencyAbove { .. } => MetricKind::P90,
            Criterion::ErrorRateAbove { .. } => MetricKind::ErrorRate,
            Criterion::ThroughputBelow { .. } => MetricKind::Throughput,
        }
    }

    pub fn threshold(&self) -> f64 {
        match *self {
            Criterion::LatencyAbove { threshold } | Criterion::ErrorRateAbove { threshold } => {
                threshold
            }
            Criterion::ThroughputBelow { ceiling } => ceiling,
        }
    }

    /// Buckets without metrics are never degraded
    pub fn is_degraded(&self, bucket: &TimeBucket) -> bool {
        let Some(value) = bucket.value(self.metric()) else {
            return false;
        };
        match *self {
            Criterion::LatencyAbove { threshold } | Criterion::ErrorRateAbove { threshold } => {
                value >= threshold
            }
            Criterion::ThroughputBelow { ceiling } => value < ceiling,
        }
    }
}
