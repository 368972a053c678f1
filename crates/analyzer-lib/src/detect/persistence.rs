//! Persistence validation: sustained bottleneck or transient spike

use crate::bucket::TimeBucket;
use crate::config::AnalysisConfig;
use crate::models::Classification;

use super::Criterion;

/// Share of post-onset buckets that stayed degraded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Persistence {
    pub degraded: usize,
    pub total: usize,
    pub ratio: f64,
}

/// Decides whether a degradation was sustained
#[derive(Debug, Clone, Copy)]
pub struct PersistenceValidator {
    persistence_ratio: f64,
    sustained_buckets: usize,
}

impl PersistenceValidator {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            persistence_ratio: config.persistence_ratio,
            sustained_buckets: config.sustained_buckets,
        }
    }

    /// Measure how the usable buckets after `onset_pos` behave
    ///
    /// `usable` holds bucket indices; `onset_pos` is a position in it.
    /// Returns `None` when fewer than `sustained_buckets` buckets follow.
    pub fn measure(
        &self,
        buckets: &[TimeBucket],
        usable: &[usize],
        onset_pos: usize,
        criterion: &Criterion,
    ) -> Option<Persistence> {
        let remaining = usable.get(onset_pos + 1..)?;
        if remaining.len() < self.sustained_buckets || remaining.is_empty() {
            return None;
        }
        let degraded = remaining
            .iter()
            .filter(|&&i| criterion.is_degraded(&buckets[i]))
            .count();
        Some(Persistence {
            degraded,
            total: remaining.len(),
            ratio: degraded as f64 / remaining.len() as f64,
        })
    }

    pub fn classify(&self, persistence: &Persistence) -> Classification {
        if persistence.ratio >= self.persistence_ratio {
            Classification::Bottleneck
        } else {
            Classification::TransientSpike
        }
    }
}
