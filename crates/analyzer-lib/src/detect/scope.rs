//! Phase 1 analysis of a single scope
//!
//! One scope is the overall timeline or one endpoint label. Each scope owns
//! its baseline and findings, so scopes can be analysed independently.

use tracing::debug;

use crate::baseline::{Baseline, BaselineEstimator, BaselineSnapshot};
use crate::bucket::{usable_indices, TimeBucket};
use crate::config::AnalysisConfig;
use crate::models::{
    BottleneckType, Classification, Finding, MetricKind, Scope, ScopeStatus, ScopeSummary,
    Severity,
};
use crate::sla::SlaThreshold;
use crate::stats::{self, EPSILON};

use super::{
    concurrency_levels, plateau_excess, plateau_steps, Criterion, Persistence,
    PersistenceValidator, SeverityScorer,
};

/// Outcome of analysing one scope
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeResult {
    pub scope: Scope,
    pub status: ScopeStatus,
    pub usable_buckets: usize,
    pub baseline: Option<Baseline>,
    pub findings: Vec<Finding>,
}

impl ScopeResult {
    pub fn summary(&self) -> ScopeSummary {
        ScopeSummary {
            scope: self.scope.kind,
            scope_name: self.scope.name.clone(),
            status: self.status,
            usable_buckets: self.usable_buckets,
            findings: self.findings.len(),
        }
    }
}

/// Runs baseline estimation and every degradation detector for one scope
#[derive(Debug, Clone)]
pub struct ScopeAnalyzer<'a> {
    config: &'a AnalysisConfig,
    estimator: BaselineEstimator<'a>,
    validator: PersistenceValidator,
    scorer: SeverityScorer,
}

impl<'a> ScopeAnalyzer<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self {
            config,
            estimator: BaselineEstimator::new(config),
            validator: PersistenceValidator::new(config),
            scorer: SeverityScorer::new(config),
        }
    }

    /// Analyse one scope's filtered timeline
    ///
    /// `stored` replaces the computed baseline values when it holds an entry
    /// for this scope.
    pub fn analyze(
        &self,
        scope: Scope,
        buckets: &[TimeBucket],
        sla: &SlaThreshold,
        stored: Option<&BaselineSnapshot>,
    ) -> ScopeResult {
        let usable = usable_indices(buckets);
        let mut result = ScopeResult {
            scope,
            status: ScopeStatus::Analyzed,
            usable_buckets: usable.len(),
            baseline: None,
            findings: Vec::new(),
        };

        let Some(mut baseline) = self.estimator.estimate(&result.scope, buckets, &usable) else {
            result.status = ScopeStatus::InsufficientBaselineData;
            return result;
        };
        if let Some(snapshot) = stored {
            if let Some(previous) = snapshot.find(&result.scope) {
                baseline = baseline.with_override(previous, &snapshot.run_id);
            }
        }

        if usable.len() < self.config.sustained_buckets + 1 {
            result.status = ScopeStatus::InsufficientData;
            result.baseline = Some(baseline);
            return result;
        }

        let scan = &usable[baseline.bucket_count..];
        let scope = &result.scope;
        let mut findings = Vec::new();

        match self.known_slow(scope, buckets, scan, &baseline, sla) {
            Some(finding) => findings.push(finding),
            None => findings.extend(self.detect_latency(scope, buckets, scan, &baseline)),
        }
        findings.extend(self.detect_error_rate(scope, buckets, scan, &baseline));
        if scope.is_overall() {
            findings.extend(self.detect_plateau(scope, buckets, &usable, baseline.bucket_count));
        }

        result.findings = findings;
        result.baseline = Some(baseline);
        result
    }

    /// Baseline already above the SLA: slow regardless of load
    fn known_slow(
        &self,
        scope: &Scope,
        buckets: &[TimeBucket],
        scan: &[usize],
        baseline: &Baseline,
        sla: &SlaThreshold,
    ) -> Option<Finding> {
        let metric = sla.percentile_unit.metric();
        let base = baseline.value(metric)?;
        if base <= sla.threshold_ms {
            return None;
        }
        let bucket = &buckets[*scan.first()?];

        Some(Finding {
            baseline_value: base,
            threshold_value: sla.threshold_ms,
            delta_pct: stats::pct_change(base, sla.threshold_ms),
            classification: Classification::KnownSlowEndpoint,
            severity: Severity::Info,
            description: format!(
                "baseline {} of {:.0}ms already exceeds the {:.0}ms SLA before load increases",
                metric, base, sla.threshold_ms
            ),
            ..finding_at(scope, bucket, detector_type(scope, BottleneckType::Latency), metric)
        })
    }

    fn detect_latency(
        &self,
        scope: &Scope,
        buckets: &[TimeBucket],
        scan: &[usize],
        baseline: &Baseline,
    ) -> Vec<Finding> {
        let base = baseline.metric_values.p90;
        if base < EPSILON {
            debug!(scope = %scope, "Zero p90 baseline, latency detection skipped");
            return Vec::new();
        }
        let degrade_pct = self.config.latency_degrade_pct;
        let criterion = Criterion::LatencyAbove {
            threshold: base * (1.0 + degrade_pct / 100.0),
        };

        self.validate_onsets(buckets, scan, &criterion, |bucket, persistence, classification| {
            let value = bucket.value(MetricKind::P90).unwrap_or(base);
            let delta_pct = stats::pct_change(value, base);
            let (severity, severity_score) =
                self.scorer
                    .assess(classification, delta_pct / degrade_pct, persistence.ratio, scope);
            Finding {
                baseline_value: base,
                threshold_value: criterion.threshold(),
                delta_pct,
                persistence_ratio: persistence.ratio,
                classification,
                severity,
                severity_score,
                description: format!(
                    "p90 rose from {:.0}ms to {:.0}ms ({:+.1}%) at {} concurrent users; degraded in {}/{} following buckets",
                    base, value, delta_pct, bucket.concurrency, persistence.degraded, persistence.total
                ),
                ..finding_at(scope, bucket, detector_type(scope, BottleneckType::Latency), MetricKind::P90)
            }
        })
    }

    fn detect_error_rate(
        &self,
        scope: &Scope,
        buckets: &[TimeBucket],
        scan: &[usize],
        baseline: &Baseline,
    ) -> Vec<Finding> {
        let base = baseline.metric_values.error_rate;
        let degrade_abs = self.config.error_rate_degrade_abs;
        let criterion = Criterion::ErrorRateAbove {
            threshold: base + degrade_abs,
        };

        self.validate_onsets(buckets, scan, &criterion, |bucket, persistence, classification| {
            let value = bucket.value(MetricKind::ErrorRate).unwrap_or(base);
            // percentage points
            let delta_pct = (value - base) * 100.0;
            let (severity, severity_score) = self.scorer.assess(
                classification,
                delta_pct / (degrade_abs * 100.0),
                persistence.ratio,
                scope,
            );
            Finding {
                baseline_value: base,
                threshold_value: criterion.threshold(),
                delta_pct,
                persistence_ratio: persistence.ratio,
                classification,
                severity,
                severity_score,
                description: format!(
                    "error rate rose from {:.1}% to {:.1}% ({:+.1} pp) at {} concurrent users; degraded in {}/{} following buckets",
                    base * 100.0, value * 100.0, delta_pct, bucket.concurrency, persistence.degraded, persistence.total
                ),
                ..finding_at(scope, bucket, detector_type(scope, BottleneckType::ErrorRate), MetricKind::ErrorRate)
            }
        })
    }

    fn detect_plateau(
        &self,
        scope: &Scope,
        buckets: &[TimeBucket],
        usable: &[usize],
        scan_start: usize,
    ) -> Vec<Finding> {
        let plateau_pct = self.config.throughput_plateau_pct;
        let levels = concurrency_levels(buckets, usable);
        let mut findings = Vec::new();
        let mut resume = scan_start;

        for step in plateau_steps(&levels, plateau_pct) {
            if step.onset_pos < resume {
                continue;
            }
            let criterion = Criterion::ThroughputBelow {
                ceiling: step.previous_throughput * (1.0 + plateau_pct / 100.0),
            };
            let Some(persistence) = self.validator.measure(buckets, usable, step.onset_pos, &criterion)
            else {
                debug!(scope = %scope, onset = usable[step.onset_pos], "Plateau too close to end of test");
                break;
            };
            let classification = self.validator.classify(&persistence);
            let (severity, severity_score) = self.scorer.assess(
                classification,
                plateau_excess(step.throughput_growth_pct, plateau_pct),
                persistence.ratio,
                scope,
            );
            let bucket = &buckets[usable[step.onset_pos]];
            findings.push(Finding {
                metric_value: step.level_throughput,
                baseline_value: step.previous_throughput,
                threshold_value: criterion.threshold(),
                delta_pct: step.throughput_growth_pct,
                persistence_ratio: persistence.ratio,
                classification,
                severity,
                severity_score,
                description: format!(
                    "throughput stayed at {:.1} req/s ({:+.1}%) while concurrency rose {:.0}% to {} users",
                    step.level_throughput, step.throughput_growth_pct, step.concurrency_rise_pct, bucket.concurrency
                ),
                ..finding_at(scope, bucket, BottleneckType::ThroughputPlateau, MetricKind::Throughput)
            });

            if classification == Classification::Bottleneck {
                break;
            }
            match first_recovered(buckets, usable, step.onset_pos, &criterion) {
                Some(pos) => resume = pos,
                None => break,
            }
        }
        findings
    }

    /// Scan for onsets and validate each one
    ///
    /// After a transient spike the scan resumes once the series recovers;
    /// a validated bottleneck ends the scan for this series.
    fn validate_onsets(
        &self,
        buckets: &[TimeBucket],
        scan: &[usize],
        criterion: &Criterion,
        mut build: impl FnMut(&TimeBucket, &Persistence, Classification) -> Finding,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut pos = 0;

        while let Some(onset) = (pos..scan.len()).find(|&p| criterion.is_degraded(&buckets[scan[p]])) {
            let Some(persistence) = self.validator.measure(buckets, scan, onset, criterion) else {
                debug!(
                    metric = %criterion.metric(),
                    onset = scan[onset],
                    "Onset too close to end of test to validate"
                );
                break;
            };
            let classification = self.validator.classify(&persistence);
            findings.push(build(&buckets[scan[onset]], &persistence, classification));

            if classification == Classification::Bottleneck {
                break;
            }
            match first_recovered(buckets, scan, onset, criterion) {
                Some(next) => pos = next,
                None => break,
            }
        }
        findings
    }
}

fn first_recovered(
    buckets: &[TimeBucket],
    positions: &[usize],
    onset: usize,
    criterion: &Criterion,
) -> Option<usize> {
    (onset + 1..positions.len()).find(|&p| !criterion.is_degraded(&buckets[positions[p]]))
}

/// Endpoint-scope latency and error findings are multi-tier findings
fn detector_type(scope: &Scope, overall: BottleneckType) -> BottleneckType {
    if scope.is_overall() {
        overall
    } else {
        BottleneckType::MultiTier
    }
}

fn finding_at(
    scope: &Scope,
    bucket: &TimeBucket,
    bottleneck_type: BottleneckType,
    metric: MetricKind,
) -> Finding {
    Finding {
        bottleneck_type,
        metric,
        scope: scope.kind,
        scope_name: scope.name.clone(),
        onset_bucket_index: bucket.index,
        onset_timestamp: bucket.start_ts,
        concurrency_at_onset: bucket.concurrency,
        metric_value: bucket.value(metric).unwrap_or(0.0),
        baseline_value: 0.0,
        threshold_value: 0.0,
        delta_pct: 0.0,
        persistence_ratio: 0.0,
        classification: Classification::Bottleneck,
        severity: Severity::Info,
        severity_score: 0,
        infra_context: None,
        description: String::new(),
    }
}
