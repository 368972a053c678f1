//! Observability for analysis runs
//!
//! Provides:
//! - Prometheus metrics (samples, buckets, outliers, findings, run duration)
//! - Structured logging of significant analysis events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::models::{
    AnalysisReport, Finding, MetricMode, Scope, ScopeStatus, Severity,
};

/// Histogram buckets for analysis duration (in seconds)
const DURATION_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AnalyzerMetricsInner> = OnceLock::new();

struct AnalyzerMetricsInner {
    samples_ingested: IntCounter,
    malformed_rows: IntCounter,
    buckets_built: IntCounter,
    outlier_buckets: IntCounter,
    scopes_skipped: IntCounterVec,
    findings: IntCounterVec,
    analysis_duration_seconds: Histogram,
}

impl AnalyzerMetricsInner {
    fn new() -> Self {
        Self {
            samples_ingested: register_int_counter!(
                "loadscope_samples_ingested_total",
                "Request samples accepted for analysis"
            )
            .expect("Failed to register samples_ingested"),

            malformed_rows: register_int_counter!(
                "loadscope_malformed_rows_total",
                "Result rows skipped because they could not be parsed"
            )
            .expect("Failed to register malformed_rows"),

            buckets_built: register_int_counter!(
                "loadscope_buckets_total",
                "Time buckets built for the overall timeline"
            )
            .expect("Failed to register buckets_built"),

            outlier_buckets: register_int_counter!(
                "loadscope_outlier_buckets_total",
                "Overall buckets flagged by the rolling MAD outlier rule"
            )
            .expect("Failed to register outlier_buckets"),

            scopes_skipped: register_int_counter_vec!(
                "loadscope_scopes_skipped_total",
                "Scopes skipped for lack of data",
                &["reason"]
            )
            .expect("Failed to register scopes_skipped"),

            findings: register_int_counter_vec!(
                "loadscope_findings_total",
                "Findings produced, by classification",
                &["classification"]
            )
            .expect("Failed to register findings"),

            analysis_duration_seconds: register_histogram!(
                "loadscope_analysis_duration_seconds",
                "Wall time of one analysis run",
                DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register analysis_duration_seconds"),
        }
    }
}

/// Analyzer metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same collectors.
#[derive(Clone)]
pub struct AnalyzerMetrics {
    _private: (),
}

impl Default for AnalyzerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerMetrics {
    /// Create a metrics handle (registers global collectors on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AnalyzerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AnalyzerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn add_samples(&self, count: usize) {
        self.inner().samples_ingested.inc_by(count as u64);
    }

    pub fn add_malformed_rows(&self, count: usize) {
        self.inner().malformed_rows.inc_by(count as u64);
    }

    pub fn add_buckets(&self, total: usize, outliers: usize) {
        self.inner().buckets_built.inc_by(total as u64);
        self.inner().outlier_buckets.inc_by(outliers as u64);
    }

    pub fn inc_scope_skipped(&self, status: ScopeStatus) {
        self.inner()
            .scopes_skipped
            .with_label_values(&[&status.to_string()])
            .inc();
    }

    pub fn record_findings(&self, findings: &[Finding]) {
        for finding in findings {
            self.inner()
                .findings
                .with_label_values(&[&finding.classification.to_string()])
                .inc();
        }
    }

    pub fn observe_duration(&self, duration_secs: f64) {
        self.inner().analysis_duration_seconds.observe(duration_secs);
    }

    /// Text exposition of every registered collector
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Structured logger for analysis events
#[derive(Clone)]
pub struct StructuredLogger {
    run_id: String,
}

impl StructuredLogger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn log_analysis_started(&self, samples: usize, labels: usize, buckets: usize, infra_rows: Option<usize>) {
        info!(
            event = "analysis_started",
            run_id = %self.run_id,
            samples = samples,
            labels = labels,
            buckets = buckets,
            infra_rows = ?infra_rows,
            "Load test analysis started"
        );
    }

    pub fn log_analysis_completed(&self, report: &AnalysisReport, duration_secs: f64) {
        info!(
            event = "analysis_completed",
            run_id = %self.run_id,
            status = %report.status,
            findings = report.findings.len(),
            threshold_concurrency = ?report.threshold_concurrency,
            duration_secs = duration_secs,
            headline = %report.headline,
            "Load test analysis completed"
        );
    }

    /// High and critical bottlenecks are logged as warnings
    pub fn log_finding(&self, finding: &Finding) {
        if finding.is_bottleneck() && finding.severity >= Severity::High {
            warn!(
                event = "finding_classified",
                run_id = %self.run_id,
                scope = %finding.scope_name,
                bottleneck_type = %finding.bottleneck_type,
                classification = %finding.classification,
                severity = %finding.severity,
                onset_bucket = finding.onset_bucket_index,
                concurrency = finding.concurrency_at_onset,
                delta_pct = finding.delta_pct,
                "Severe bottleneck detected"
            );
        } else {
            info!(
                event = "finding_classified",
                run_id = %self.run_id,
                scope = %finding.scope_name,
                bottleneck_type = %finding.bottleneck_type,
                classification = %finding.classification,
                severity = %finding.severity,
                onset_bucket = finding.onset_bucket_index,
                concurrency = finding.concurrency_at_onset,
                delta_pct = finding.delta_pct,
                "Finding classified"
            );
        }
    }

    pub fn log_scope_skipped(&self, scope: &Scope, status: ScopeStatus, usable_buckets: usize) {
        info!(
            event = "scope_skipped",
            run_id = %self.run_id,
            scope = %scope,
            status = %status,
            usable_buckets = usable_buckets,
            "Scope skipped for lack of data"
        );
    }

    pub fn log_metric_mode(&self, mode: Option<MetricMode>, entities: usize) {
        match mode {
            Some(MetricMode::Raw) => warn!(
                event = "metric_mode",
                run_id = %self.run_id,
                metric_mode = "raw",
                entities = entities,
                "Utilization percentages are zero, falling back to raw cores/GB"
            ),
            Some(mode) => info!(
                event = "metric_mode",
                run_id = %self.run_id,
                metric_mode = %mode,
                entities = entities,
                "Infrastructure metric mode selected"
            ),
            None => warn!(
                event = "metric_mode",
                run_id = %self.run_id,
                "Infrastructure data has no usable columns"
            ),
        }
    }

    pub fn log_malformed_summary(&self, malformed: usize, total: usize) {
        if malformed == 0 {
            return;
        }
        warn!(
            event = "malformed_rows",
            run_id = %self.run_id,
            malformed = malformed,
            total = total,
            "Malformed result rows skipped"
        );
    }

    pub fn log_baseline_override(&self, baseline_run_id: &str, scopes_matched: usize) {
        info!(
            event = "baseline_override",
            run_id = %self.run_id,
            baseline_run_id = %baseline_run_id,
            scopes_matched = scopes_matched,
            "Baselines replaced from stored run"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyzer_metrics_render() {
        let metrics = AnalyzerMetrics::new();
        metrics.add_samples(10);
        metrics.add_buckets(5, 1);
        metrics.inc_scope_skipped(ScopeStatus::InsufficientData);
        metrics.observe_duration(0.01);

        let text = metrics.render();
        assert!(text.contains("loadscope_samples_ingested_total"));
        assert!(text.contains("insufficient_data"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("nightly-42");
        assert_eq!(logger.run_id, "nightly-42");
        logger.log_malformed_summary(0, 10);
    }
}
