//! Analysis pipeline orchestration
//!
//! Phase 1 analyses the overall scope and every endpoint label
//! independently. Phase 2a correlates each bottleneck with infrastructure
//! usage, Phase 2b scans the infra timeline for capacity risks, and the
//! aggregator orders the findings and writes the headline.
//!
//! [`AnalysisEngine::run`] is synchronous. [`AnalysisEngine::run_parallel`]
//! fans endpoint scopes out onto the tokio blocking pool and merges them in
//! label order, so both produce the same report.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::debug;

use crate::aggregate::aggregate;
use crate::baseline::{BaselineSnapshot, BaselineSource};
use crate::bucket::{BucketGrid, Bucketizer, TimeBucket};
use crate::config::AnalysisConfig;
use crate::detect::{ScopeAnalyzer, ScopeResult};
use crate::error::{AnalysisError, Result};
use crate::infra::{CapacityScanner, InfraCorrelator, InfraTimeline};
use crate::models::{
    AnalysisReport, AnalysisStatus, InfraSample, InfraVerdict, Sample, Scope, ScopeStatus,
};
use crate::observability::{AnalyzerMetrics, StructuredLogger};
use crate::sla::{SlaResolver, SlaThreshold};

/// Everything one analysis run consumes
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    pub samples: Vec<Sample>,
    pub infra: Option<Vec<InfraSample>>,
    /// Stored baselines replacing the computed ones
    pub baseline_override: Option<BaselineSnapshot>,
    /// Result rows rejected during ingestion
    pub malformed_rows: usize,
    /// Result rows seen during ingestion, valid or not
    pub total_rows: usize,
}

impl AnalysisInput {
    pub fn new(samples: Vec<Sample>) -> Self {
        let total_rows = samples.len();
        Self {
            samples,
            total_rows,
            ..Self::default()
        }
    }

    pub fn with_infra(mut self, infra: Vec<InfraSample>) -> Self {
        self.infra = Some(infra);
        self
    }

    pub fn with_baseline_override(mut self, snapshot: BaselineSnapshot) -> Self {
        self.baseline_override = Some(snapshot);
        self
    }

    pub fn with_row_counts(mut self, malformed_rows: usize, total_rows: usize) -> Self {
        self.malformed_rows = malformed_rows;
        self.total_rows = total_rows;
        self
    }
}

/// Shared state computed before scopes are analysed
struct Prepared {
    grid: BucketGrid,
    overall_sla: SlaThreshold,
    label_slas: Vec<(String, SlaThreshold)>,
    overall_buckets: Vec<TimeBucket>,
}

/// Bottleneck detection and classification engine
pub struct AnalysisEngine {
    config: AnalysisConfig,
    sla: Arc<dyn SlaResolver>,
    bucketizer: Bucketizer,
    logger: StructuredLogger,
    metrics: AnalyzerMetrics,
}

impl AnalysisEngine {
    /// Create an engine; the configuration is validated once here
    pub fn new(config: AnalysisConfig, sla: Arc<dyn SlaResolver>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            bucketizer: Bucketizer::new(&config),
            config,
            sla,
            logger: StructuredLogger::new("adhoc"),
            metrics: AnalyzerMetrics::new(),
        })
    }

    /// Tag log records with a run identifier
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.logger = StructuredLogger::new(run_id);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyse one run synchronously
    pub fn run(&self, input: &AnalysisInput) -> Result<AnalysisReport> {
        let started = Instant::now();
        let prepared = self.prepare(input)?;
        let overall = self.analyze_overall(&prepared, input);

        let mut by_label = self.bucketizer.bucketize_by_label(prepared.grid, &input.samples);
        let endpoints = prepared
            .label_slas
            .iter()
            .map(|(label, sla)| {
                let buckets = by_label.remove(label).unwrap_or_default();
                ScopeAnalyzer::new(&self.config).analyze(
                    Scope::endpoint(label.as_str()),
                    &buckets,
                    sla,
                    input.baseline_override.as_ref(),
                )
            })
            .collect();

        Ok(self.finish(input, prepared, overall, endpoints, started))
    }

    /// Analyse one run with endpoint scopes on the blocking pool
    pub async fn run_parallel(self: Arc<Self>, input: Arc<AnalysisInput>) -> Result<AnalysisReport> {
        let started = Instant::now();
        let prepared = self.prepare(&input)?;

        let mut tasks = JoinSet::new();
        for (order, (label, sla)) in prepared.label_slas.iter().cloned().enumerate() {
            let engine = Arc::clone(&self);
            let input = Arc::clone(&input);
            let grid = prepared.grid;
            tasks.spawn_blocking(move || (order, engine.analyze_label(grid, &label, &sla, &input)));
        }

        let overall = self.analyze_overall(&prepared, &input);

        let mut endpoints = Vec::with_capacity(prepared.label_slas.len());
        while let Some(joined) = tasks.join_next().await {
            let (order, result) = joined.map_err(|e| AnalysisError::Task(e.to_string()))?;
            endpoints.push((order, result));
        }
        endpoints.sort_by_key(|(order, _)| *order);
        let endpoints = endpoints.into_iter().map(|(_, result)| result).collect();

        Ok(self.finish(&input, prepared, overall, endpoints, started))
    }

    /// Validate the input, resolve every SLA and bucket the overall timeline
    fn prepare(&self, input: &AnalysisInput) -> Result<Prepared> {
        if input.total_rows > 0 {
            let ratio = input.malformed_rows as f64 / input.total_rows as f64;
            if ratio > self.config.max_malformed_ratio {
                return Err(AnalysisError::TooManyMalformedRows {
                    malformed: input.malformed_rows,
                    total: input.total_rows,
                    max_ratio: self.config.max_malformed_ratio,
                });
            }
        }
        let grid = BucketGrid::from_samples(&input.samples, self.config.bucket_width_ms())
            .ok_or(AnalysisError::NoSamples)?;
        if grid.count > self.config.max_buckets {
            return Err(AnalysisError::TooManyBuckets {
                count: grid.count,
                max: self.config.max_buckets,
            });
        }

        let overall_sla = self.sla.resolve(Scope::OVERALL_NAME)?;
        let labels: Vec<String> = input
            .samples
            .iter()
            .map(|s| s.label.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let label_slas = labels
            .into_iter()
            .map(|label| {
                let sla = self.sla.resolve(&label)?;
                Ok((label, sla))
            })
            .collect::<Result<Vec<_>>>()?;

        self.logger.log_analysis_started(
            input.samples.len(),
            label_slas.len(),
            grid.count,
            input.infra.as_ref().map(Vec::len),
        );
        self.logger
            .log_malformed_summary(input.malformed_rows, input.total_rows);

        let overall_buckets = self.bucketizer.bucketize(grid, &input.samples);
        Ok(Prepared {
            grid,
            overall_sla,
            label_slas,
            overall_buckets,
        })
    }

    fn analyze_overall(&self, prepared: &Prepared, input: &AnalysisInput) -> ScopeResult {
        ScopeAnalyzer::new(&self.config).analyze(
            Scope::overall(),
            &prepared.overall_buckets,
            &prepared.overall_sla,
            input.baseline_override.as_ref(),
        )
    }

    fn analyze_label(
        &self,
        grid: BucketGrid,
        label: &str,
        sla: &SlaThreshold,
        input: &AnalysisInput,
    ) -> ScopeResult {
        let buckets = self
            .bucketizer
            .bucketize(grid, input.samples.iter().filter(|s| s.label == label));
        ScopeAnalyzer::new(&self.config).analyze(
            Scope::endpoint(label),
            &buckets,
            sla,
            input.baseline_override.as_ref(),
        )
    }

    /// Phase 2, aggregation and report assembly
    fn finish(
        &self,
        input: &AnalysisInput,
        prepared: Prepared,
        overall: ScopeResult,
        endpoints: Vec<ScopeResult>,
        started: Instant,
    ) -> AnalysisReport {
        let Prepared {
            grid,
            overall_sla,
            overall_buckets,
            ..
        } = prepared;
        let mut warnings = Vec::new();

        let timeline = match &input.infra {
            None => {
                warnings.push("no infrastructure data supplied; infrastructure correlation skipped".to_string());
                None
            }
            Some(rows) => {
                let timeline = InfraTimeline::build(&grid, rows);
                self.logger.log_metric_mode(
                    timeline.as_ref().map(|t| t.mode),
                    timeline.as_ref().map_or(0, |t| t.entities.len()),
                );
                if timeline.is_none() {
                    warnings.push("infrastructure data has no usable CPU or memory columns".to_string());
                }
                timeline
            }
        };

        let scopes: Vec<ScopeResult> = std::iter::once(overall).chain(endpoints).collect();
        for result in &scopes {
            if result.status != ScopeStatus::Analyzed {
                self.logger
                    .log_scope_skipped(&result.scope, result.status, result.usable_buckets);
                self.metrics.inc_scope_skipped(result.status);
            }
        }
        self.note_baseline_override(input, &scopes, &mut warnings);

        // Phase 2a
        let correlator = InfraCorrelator::new(&self.config, timeline.as_ref());
        let mut excluded: Vec<RangeInclusive<usize>> = Vec::new();
        let mut inconclusive = false;
        let mut findings = Vec::new();
        for result in &scopes {
            for finding in &result.findings {
                let finding = match (&result.baseline, finding.is_bottleneck()) {
                    (Some(baseline), true) => {
                        let context = correlator.correlate(finding, baseline, grid.last_index());
                        match context.verdict {
                            InfraVerdict::InfrastructureCorrelated => {
                                excluded.push(finding.onset_bucket_index..=grid.last_index());
                            }
                            InfraVerdict::Inconclusive => inconclusive = true,
                            InfraVerdict::InfrastructureIndependent => {}
                        }
                        finding.clone().with_infra_context(context)
                    }
                    _ => finding.clone(),
                };
                findings.push(finding);
            }
        }

        // Phase 2b
        if let Some(timeline) = &timeline {
            let baseline_range = scopes[0]
                .baseline
                .as_ref()
                .map(|b| b.window_start_index..=b.window_end_index);
            let risks = CapacityScanner::new(&self.config, timeline).scan(
                &overall_buckets,
                &overall_sla,
                baseline_range,
                &excluded,
            );
            debug!(capacity_risks = risks.len(), "Capacity scan complete");
            findings.extend(risks);
        }

        let aggregate = aggregate(findings);
        let overall_unusable = scopes[0].status == ScopeStatus::InsufficientBaselineData;
        let status = if overall_unusable {
            AnalysisStatus::Failed
        } else if timeline.is_none() || inconclusive {
            AnalysisStatus::Partial
        } else {
            AnalysisStatus::Success
        };

        let mut report = AnalysisReport {
            status,
            metric_mode: timeline.as_ref().map(|t| t.mode),
            headline: aggregate.headline,
            threshold_concurrency: aggregate.threshold_concurrency,
            findings: aggregate.findings,
            baselines: scopes.iter().filter_map(|s| s.baseline.clone()).collect(),
            scopes: scopes.iter().map(ScopeResult::summary).collect(),
            buckets: overall_buckets,
            warnings,
            malformed_rows: input.malformed_rows,
            error: None,
        };
        if overall_unusable {
            let reason = "no usable post-warmup buckets in the overall timeline".to_string();
            report.headline = format!("Analysis failed: {}", reason);
            report.error = Some(reason);
        }

        let duration = started.elapsed().as_secs_f64();
        self.record(input, &report, duration);
        report
    }

    fn note_baseline_override(&self, input: &AnalysisInput, scopes: &[ScopeResult], warnings: &mut Vec<String>) {
        let Some(snapshot) = &input.baseline_override else {
            return;
        };
        let matched = scopes
            .iter()
            .filter_map(|s| s.baseline.as_ref())
            .filter(|b| matches!(b.source, BaselineSource::Override { .. }))
            .count();
        self.logger.log_baseline_override(&snapshot.run_id, matched);
        if snapshot.bucket_seconds != self.config.bucket_seconds {
            warnings.push(format!(
                "baseline run '{}' used {}s buckets, this run uses {}s",
                snapshot.run_id, snapshot.bucket_seconds, self.config.bucket_seconds
            ));
        }
    }

    fn record(&self, input: &AnalysisInput, report: &AnalysisReport, duration_secs: f64) {
        let outliers = report.buckets.iter().filter(|b| b.is_outlier).count();
        self.metrics.add_samples(input.samples.len());
        self.metrics.add_malformed_rows(input.malformed_rows);
        self.metrics.add_buckets(report.buckets.len(), outliers);
        self.metrics.record_findings(&report.findings);
        self.metrics.observe_duration(duration_secs);

        for finding in &report.findings {
            self.logger.log_finding(finding);
        }
        self.logger.log_analysis_completed(report, duration_secs);
    }
}
