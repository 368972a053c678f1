//! Baseline estimation per scope
//!
//! A baseline is the mean of each series over the leading usable buckets of
//! a scope, stopping early once the load ramps. The same bucket range is
//! later used as the infrastructure reference window.

mod store;

pub use store::{BaselineSnapshot, BaselineStore};

use serde::{Deserialize, Serialize};

use crate::bucket::{BucketMetrics, TimeBucket};
use crate::config::AnalysisConfig;
use crate::models::{MetricKind, Scope, ScopeKind};
use crate::stats;

/// Where baseline values came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaselineSource {
    Computed,
    Override { run_id: String },
}

/// Reference values for one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub scope: ScopeKind,
    pub scope_name: String,
    pub metric_values: BucketMetrics,
    /// Mean peak concurrency across the window
    pub concurrency: f64,
    pub window_start_index: usize,
    pub window_end_index: usize,
    pub bucket_count: usize,
    pub source: BaselineSource,
}

impl Baseline {
    pub fn value(&self, kind: MetricKind) -> Option<f64> {
        self.metric_values.get(kind)
    }

    pub fn matches(&self, scope: &Scope) -> bool {
        self.scope == scope.kind && self.scope_name == scope.name
    }

    /// Take reference values from a stored baseline, keeping this run's window
    pub fn with_override(mut self, stored: &Baseline, run_id: &str) -> Self {
        self.metric_values = stored.metric_values;
        self.concurrency = stored.concurrency;
        self.source = BaselineSource::Override {
            run_id: run_id.to_string(),
        };
        self
    }
}

/// Chooses the baseline window and averages it
#[derive(Debug, Clone)]
pub struct BaselineEstimator<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> BaselineEstimator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Bucket indices forming the baseline window
    ///
    /// Leading usable buckets, at most `baseline_buckets`, ending before the
    /// concurrency rises by more than `baseline_ramp_pct`, and leaving at
    /// least `sustained_buckets` usable buckets after it whenever possible.
    pub fn window(&self, buckets: &[TimeBucket], usable: &[usize]) -> Vec<usize> {
        let Some(&first) = usable.first() else {
            return Vec::new();
        };
        let cap = self
            .config
            .baseline_buckets
            .min(usable.len().saturating_sub(self.config.sustained_buckets))
            .max(1);
        let ramp_limit =
            buckets[first].concurrency as f64 * (1.0 + self.config.baseline_ramp_pct / 100.0);

        usable
            .iter()
            .copied()
            .take(cap)
            .take_while(|&i| buckets[i].concurrency as f64 <= ramp_limit)
            .collect()
    }

    /// Baseline for `scope`, or `None` when it has no usable buckets
    pub fn estimate(
        &self,
        scope: &Scope,
        buckets: &[TimeBucket],
        usable: &[usize],
    ) -> Option<Baseline> {
        let window = self.window(buckets, usable);
        let (&start, &end) = (window.first()?, window.last()?);

        let mut metric_values = BucketMetrics::default();
        for kind in MetricKind::PERFORMANCE {
            let values: Vec<f64> = window
                .iter()
                .filter_map(|&i| buckets[i].value(kind))
                .collect();
            metric_values.set(kind, stats::mean(&values)?);
        }
        let concurrency: Vec<f64> = window
            .iter()
            .map(|&i| buckets[i].concurrency as f64)
            .collect();

        Some(Baseline {
            scope: scope.kind,
            scope_name: scope.name.clone(),
            metric_values,
            concurrency: stats::mean(&concurrency).unwrap_or(0.0),
            window_start_index: start,
            window_end_index: end,
            bucket_count: window.len(),
            source: BaselineSource::Computed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::usable_indices;

    fn bucket(index: usize, p90: f64, concurrency: u32, warmup: bool, outlier: bool) -> TimeBucket {
        let raw = BucketMetrics {
            p50: p90 / 2.0,
            p90,
            p95: p90 * 1.2,
            avg_rt: p90 / 1.5,
            error_rate: 0.01,
            throughput: 20.0,
        };
        TimeBucket {
            index,
            start_ts: index as i64 * 60_000,
            end_ts: (index as i64 + 1) * 60_000,
            concurrency,
            sample_count: 1200,
            error_count: 12,
            raw: Some(raw),
            smoothed: Some(raw),
            is_outlier: outlier,
            outlier_metrics: Vec::new(),
            is_warmup: warmup,
            is_empty: false,
        }
    }

    #[test]
    fn test_window_skips_warmup_and_outliers() {
        let buckets = vec![
            bucket(0, 900.0, 10, true, false),
            bucket(1, 400.0, 10, false, false),
            bucket(2, 5000.0, 10, false, true),
            bucket(3, 420.0, 10, false, false),
            bucket(4, 410.0, 10, false, false),
            bucket(5, 800.0, 10, false, false),
            bucket(6, 800.0, 10, false, false),
        ];
        let config = AnalysisConfig::default();
        let usable = usable_indices(&buckets);
        assert_eq!(usable, vec![1, 3, 4, 5, 6]);

        let estimator = BaselineEstimator::new(&config);
        let baseline = estimator
            .estimate(&Scope::overall(), &buckets, &usable)
            .unwrap();
        assert_eq!(baseline.bucket_count, 3);
        assert_eq!(baseline.window_start_index, 1);
        assert_eq!(baseline.window_end_index, 4);
        assert!((baseline.metric_values.p90 - 410.0).abs() < 1e-9);
        assert_eq!(baseline.source, BaselineSource::Computed);
    }

    #[test]
    fn test_window_stops_at_ramp() {
        let buckets = vec![
            bucket(0, 400.0, 10, false, false),
            bucket(1, 400.0, 10, false, false),
            bucket(2, 450.0, 20, false, false),
            bucket(3, 500.0, 30, false, false),
            bucket(4, 550.0, 40, false, false),
        ];
        let config = AnalysisConfig {
            warmup_buckets: 0,
            ..AnalysisConfig::default()
        };
        let usable = usable_indices(&buckets);
        let window = BaselineEstimator::new(&config).window(&buckets, &usable);
        assert_eq!(window, vec![0, 1]);
    }

    #[test]
    fn test_window_leaves_room_for_validation() {
        let buckets: Vec<TimeBucket> = (0..4).map(|i| bucket(i, 400.0, 10, false, false)).collect();
        let config = AnalysisConfig {
            baseline_buckets: 10,
            sustained_buckets: 2,
            ..AnalysisConfig::default()
        };
        let usable = usable_indices(&buckets);
        let window = BaselineEstimator::new(&config).window(&buckets, &usable);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_no_usable_buckets_yields_none() {
        let buckets = vec![bucket(0, 400.0, 10, true, false), bucket(1, 400.0, 10, false, true)];
        let config = AnalysisConfig::default();
        let usable = usable_indices(&buckets);
        assert!(usable.is_empty());
        assert!(BaselineEstimator::new(&config)
            .estimate(&Scope::overall(), &buckets, &usable)
            .is_none());
    }

    #[test]
    fn test_override_keeps_window() {
        let buckets: Vec<TimeBucket> = (0..6).map(|i| bucket(i, 400.0, 10, false, false)).collect();
        let config = AnalysisConfig::default();
        let usable = usable_indices(&buckets);
        let computed = BaselineEstimator::new(&config)
            .estimate(&Scope::endpoint("login"), &buckets, &usable)
            .unwrap();

        let mut stored = computed.clone();
        stored.metric_values.p90 = 250.0;
        let merged = computed.clone().with_override(&stored, "run-41");

        assert_eq!(merged.metric_values.p90, 250.0);
        assert_eq!(merged.window_start_index, computed.window_start_index);
        assert_eq!(
            merged.source,
            BaselineSource::Override {
                run_id: "run-41".to_string()
            }
        );
        assert!(merged.matches(&Scope::endpoint("login")));
    }
}
