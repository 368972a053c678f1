//! Phase 2b: capacity risks without performance degradation
//!
//! Scans the whole infra timeline of every entity for sustained high
//! utilization while latency stays within SLA, and for utilization that
//! keeps climbing over the test. Bucket ranges already explained by a
//! correlated bottleneck are not scanned again.

use std::ops::{Range, RangeInclusive};

use tracing::debug;

use crate::bucket::TimeBucket;
use crate::config::AnalysisConfig;
use crate::models::{
    BottleneckType, Classification, Finding, MetricKind, MetricMode, ScopeKind, Severity,
};
use crate::sla::SlaThreshold;
use crate::stats::{self, EPSILON};

use super::{EntitySeries, InfraTimeline};

/// Minimum scanned buckets for the climbing-trend rule
const MIN_TREND_BUCKETS: usize = 4;

/// Share of scanned buckets a saturation run must cover for medium severity
const WIDE_RUN_SHARE: f64 = 0.5;

const RESOURCES: [MetricKind; 2] = [MetricKind::Cpu, MetricKind::Memory];

/// Detects infra stress that has not (yet) hurt performance
#[derive(Debug, Clone)]
pub struct CapacityScanner<'a> {
    config: &'a AnalysisConfig,
    timeline: &'a InfraTimeline,
}

/// One resource series reduced to the buckets the scanner may look at
struct Scanned {
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl<'a> CapacityScanner<'a> {
    pub fn new(config: &'a AnalysisConfig, timeline: &'a InfraTimeline) -> Self {
        Self { config, timeline }
    }

    /// Scan every entity and resource
    ///
    /// `overall` is the overall request timeline (used for the SLA check and
    /// for onset placement), `baseline_range` the overall baseline window,
    /// `excluded` the ranges covered by correlated bottlenecks.
    pub fn scan(
        &self,
        overall: &[TimeBucket],
        overall_sla: &SlaThreshold,
        baseline_range: Option<RangeInclusive<usize>>,
        excluded: &[RangeInclusive<usize>],
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (entity, series) in &self.timeline.entities {
            for kind in RESOURCES {
                let scanned = self.scanned(series, kind, excluded);
                if scanned.indices.is_empty() {
                    continue;
                }
                let reference = baseline_range
                    .clone()
                    .and_then(|range| self.timeline.snapshot(entity, range).average(kind));

                findings.extend(self.saturation(entity, kind, &scanned, reference, overall, overall_sla));
                findings.extend(self.climbing_trend(entity, kind, &scanned, overall));
            }
        }
        findings
    }

    fn scanned(&self, series: &EntitySeries, kind: MetricKind, excluded: &[RangeInclusive<usize>]) -> Scanned {
        let (indices, values): (Vec<usize>, Vec<f64>) = series
            .values(kind)
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i > self.config.warmup_buckets)
            .filter(|(i, _)| !excluded.iter().any(|r| r.contains(i)))
            .filter_map(|(i, v)| v.map(|v| (i, v)))
            .unzip();
        Scanned { indices, values }
    }

    fn high_threshold(&self, kind: MetricKind, reference: Option<f64>) -> Option<f64> {
        match self.timeline.mode {
            MetricMode::Pct => Some(match kind {
                MetricKind::Memory => self.config.memory_high_pct,
                _ => self.config.cpu_high_pct,
            }),
            MetricMode::Raw => reference
                .filter(|r| *r > EPSILON)
                .map(|r| r * (1.0 + self.config.raw_metric_degrade_pct / 100.0)),
        }
    }

    /// Rule (a): sustained high utilization while the SLA holds
    fn saturation(
        &self,
        entity: &str,
        kind: MetricKind,
        scanned: &Scanned,
        reference: Option<f64>,
        overall: &[TimeBucket],
        sla: &SlaThreshold,
    ) -> Option<Finding> {
        let threshold = self.high_threshold(kind, reference)?;
        let min_run = self.config.sustained_buckets + 1;
        let run = first_run_above(scanned, threshold, min_run)?;
        let run_indices = &scanned.indices[run.clone()];

        let sla_metric = sla.percentile_unit.metric();
        let latency: Vec<f64> = run_indices
            .iter()
            .filter_map(|&i| overall.get(i).and_then(|b| b.value(sla_metric)))
            .collect();
        let mean_latency = stats::mean(&latency).unwrap_or(0.0);
        if mean_latency > sla.threshold_ms {
            debug!(entity, resource = %kind, "High utilization alongside SLA breach, not a capacity risk");
            return None;
        }

        let onset = onset_bucket(overall, run_indices)?;
        let run_values = &scanned.values[run.clone()];
        let mean = stats::mean(run_values).unwrap_or(0.0);
        let share = run.len() as f64 / scanned.indices.len() as f64;
        let severity = if share >= WIDE_RUN_SHARE {
            Severity::Medium
        } else {
            Severity::Low
        };
        let unit = unit_label(self.timeline.mode, kind);

        Some(Finding {
            bottleneck_type: BottleneckType::InfraSaturation,
            metric_value: mean,
            baseline_value: reference.unwrap_or(0.0),
            threshold_value: threshold,
            delta_pct: reference.map(|r| stats::pct_change(mean, r)).unwrap_or(0.0),
            persistence_ratio: share,
            severity,
            description: format!(
                "{} {} averaged {:.2}{} over {} buckets (threshold {:.2}{}) while {} stayed within the {:.0}ms SLA",
                entity, kind, mean, unit, run.len(), threshold, unit, sla_metric, sla.threshold_ms
            ),
            ..capacity_finding(entity, kind, onset)
        })
    }

    /// Rule (b): second half of the test runs materially hotter than the first
    fn climbing_trend(
        &self,
        entity: &str,
        kind: MetricKind,
        scanned: &Scanned,
        overall: &[TimeBucket],
    ) -> Option<Finding> {
        let n = scanned.values.len();
        if n < MIN_TREND_BUCKETS {
            return None;
        }
        let half = n / 2;
        let first = stats::mean(&scanned.values[..half])?;
        let second = stats::mean(&scanned.values[half..])?;
        if first < EPSILON {
            return None;
        }
        let trend_pct = self.config.capacity_trend_pct;
        let growth = stats::pct_change(second, first);
        if growth < trend_pct || stats::linear_regression_slope(&scanned.values) <= 0.0 {
            return None;
        }

        let onset = onset_bucket(overall, &scanned.indices[half..])?;
        let severity = if growth >= 2.0 * trend_pct {
            Severity::Medium
        } else {
            Severity::Low
        };
        let unit = unit_label(self.timeline.mode, kind);

        Some(Finding {
            bottleneck_type: BottleneckType::ResourceCoupling,
            metric_value: second,
            baseline_value: first,
            threshold_value: first * (1.0 + trend_pct / 100.0),
            delta_pct: growth,
            severity,
            description: format!(
                "{} {} climbed from {:.2}{} to {:.2}{} ({:+.1}%) between the first and second half of the test",
                entity, kind, first, unit, second, unit, growth
            ),
            ..capacity_finding(entity, kind, onset)
        })
    }
}

/// Positions of the first run of at least `min_run` consecutive buckets above `threshold`
fn first_run_above(scanned: &Scanned, threshold: f64, min_run: usize) -> Option<Range<usize>> {
    let n = scanned.indices.len();
    let mut run: Option<usize> = None;
    for pos in 0..n {
        let above = scanned.values[pos] > threshold;
        let contiguous = pos > 0 && scanned.indices[pos] == scanned.indices[pos - 1] + 1;
        if let Some(start) = run {
            if !(above && contiguous) {
                if pos - start >= min_run {
                    return Some(start..pos);
                }
                run = None;
            }
        }
        if above && run.is_none() {
            run = Some(pos);
        }
    }
    run.filter(|&start| n - start >= min_run).map(|start| start..n)
}

/// First bucket of `indices` that is a valid onset on the request timeline
fn onset_bucket<'b>(overall: &'b [TimeBucket], indices: &[usize]) -> Option<&'b TimeBucket> {
    indices
        .iter()
        .filter_map(|&i| overall.get(i))
        .find(|b| !b.is_outlier && !b.is_empty)
}

fn unit_label(mode: MetricMode, kind: MetricKind) -> &'static str {
    match (mode, kind) {
        (MetricMode::Pct, _) => "%",
        (MetricMode::Raw, MetricKind::Memory) => " GB",
        (MetricMode::Raw, _) => " cores",
    }
}

fn capacity_finding(entity: &str, kind: MetricKind, onset: &TimeBucket) -> Finding {
    Finding {
        bottleneck_type: BottleneckType::InfraSaturation,
        metric: kind,
        scope: ScopeKind::Infrastructure,
        scope_name: entity.to_string(),
        onset_bucket_index: onset.index,
        onset_timestamp: onset.start_ts,
        concurrency_at_onset: onset.concurrency,
        metric_value: 0.0,
        baseline_value: 0.0,
        threshold_value: 0.0,
        delta_pct: 0.0,
        persistence_ratio: 0.0,
        classification: Classification::CapacityRisk,
        severity: Severity::Low,
        severity_score: 0,
        infra_context: None,
        description: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{BucketGrid, BucketMetrics};
    use crate::models::InfraSample;
    use crate::sla::PercentileUnit;

    const BUCKETS: usize = 12;

    fn overall(p90: f64) -> Vec<TimeBucket> {
        (0..BUCKETS)
            .map(|index| {
                let m = BucketMetrics {
                    p90,
                    ..BucketMetrics::default()
                };
                TimeBucket {
                    index,
                    start_ts: index as i64 * 60_000,
                    end_ts: (index as i64 + 1) * 60_000,
                    concurrency: 10 + index as u32,
                    sample_count: 100,
                    error_count: 0,
                    raw: Some(m),
                    smoothed: Some(m),
                    is_outlier: false,
                    outlier_metrics: Vec::new(),
                    is_warmup: index == 0,
                    is_empty: false,
                }
            })
            .collect()
    }

    fn timeline(cpu: impl Fn(usize) -> f64, pct: bool) -> InfraTimeline {
        let grid = BucketGrid::covering(0, BUCKETS as i64 * 60_000 - 1, 60_000);
        let samples: Vec<InfraSample> = (0..BUCKETS)
            .map(|i| InfraSample {
                timestamp_ms: i as i64 * 60_000,
                entity: "db".to_string(),
                cpu_pct: pct.then(|| cpu(i)),
                cpu_cores: (!pct).then(|| cpu(i)),
                ..InfraSample::default()
            })
            .collect();
        InfraTimeline::build(&grid, &samples).unwrap()
    }

    fn sla() -> SlaThreshold {
        SlaThreshold {
            threshold_ms: 1000.0,
            percentile_unit: PercentileUnit::P90,
            error_rate_threshold: 0.05,
        }
    }

    #[test]
    fn test_sustained_high_cpu_within_sla() {
        let timeline = timeline(|_| 85.0, true);
        let config = AnalysisConfig::default();
        let findings = CapacityScanner::new(&config, &timeline).scan(&overall(400.0), &sla(), Some(1..=3), &[]);

        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.classification, Classification::CapacityRisk);
        assert_eq!(finding.bottleneck_type, BottleneckType::InfraSaturation);
        assert_eq!(finding.scope, ScopeKind::Infrastructure);
        assert_eq!(finding.scope_name, "db");
        assert_eq!(finding.onset_bucket_index, 2);
        assert_eq!(finding.severity, Severity::Medium);
    }

    #[test]
    fn test_high_cpu_with_sla_breach_is_not_capacity_risk() {
        let timeline = timeline(|_| 85.0, true);
        let config = AnalysisConfig::default();
        let findings = CapacityScanner::new(&config, &timeline).scan(&overall(1500.0), &sla(), Some(1..=3), &[]);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_excluded_ranges_are_skipped() {
        let timeline = timeline(|_| 85.0, true);
        let config = AnalysisConfig::default();
        let findings =
            CapacityScanner::new(&config, &timeline).scan(&overall(400.0), &sla(), Some(1..=3), &[2..=11]);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_climbing_trend() {
        // 20% -> 65% over the scanned buckets, never above the high threshold
        let timeline = timeline(|i| 10.0 + i as f64 * 5.0, true);
        let config = AnalysisConfig::default();
        let findings = CapacityScanner::new(&config, &timeline).scan(&overall(400.0), &sla(), Some(1..=3), &[]);

        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.bottleneck_type, BottleneckType::ResourceCoupling);
        assert_eq!(finding.classification, Classification::CapacityRisk);
        // scanned 2..=11, second half starts at bucket 7
        assert_eq!(finding.onset_bucket_index, 7);
        assert!(finding.delta_pct >= 30.0);
        assert_eq!(finding.severity, Severity::Medium);
    }

    #[test]
    fn test_raw_mode_uses_baseline_reference() {
        let timeline = timeline(|i| if i < 6 { 0.1 } else { 0.2 }, false);
        let config = AnalysisConfig::default();
        let findings = CapacityScanner::new(&config, &timeline).scan(&overall(400.0), &sla(), Some(1..=3), &[]);

        let saturation: Vec<_> = findings
            .iter()
            .filter(|f| f.bottleneck_type == BottleneckType::InfraSaturation)
            .collect();
        assert_eq!(saturation.len(), 1);
        assert_eq!(saturation[0].onset_bucket_index, 6);
        assert!((saturation[0].threshold_value - 0.15).abs() < 1e-9);
        assert!(saturation[0].description.contains("cores"));
    }

    #[test]
    fn test_first_run_needs_consecutive_buckets() {
        let scanned = Scanned {
            indices: vec![2, 3, 5, 6, 7],
            values: vec![90.0, 90.0, 90.0, 90.0, 90.0],
        };
        assert_eq!(first_run_above(&scanned, 80.0, 3), Some(2..5));
        assert_eq!(first_run_above(&scanned, 95.0, 3), None);
    }
}
