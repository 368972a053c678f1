//! The `analyze` command

use std::path::Path;
use std::sync::Arc;

use analyzer_lib::ingest;
use analyzer_lib::{
    AnalysisConfig, AnalysisEngine, AnalysisInput, AnalysisReport, AnalysisStatus,
    AnalyzerMetrics, BaselineSnapshot, BaselineStore, ScopeStatus, SlaTable,
};
use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use tabled::Tabled;
use tracing::error;

use super::baseline::print_baselines;
use crate::output::{
    color_classification, color_severity, color_status, format_delta, format_metric,
    format_timestamp, print_error, print_info, print_json, print_success, print_table,
    print_warning, OutputFormat,
};
use crate::AnalyzeArgs;

/// Row for findings table
#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "Onset")]
    onset: String,
    #[tabled(rename = "Time (UTC)")]
    time: String,
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "Type")]
    bottleneck_type: String,
    #[tabled(rename = "Users")]
    users: u32,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Baseline")]
    baseline: String,
    #[tabled(rename = "Delta")]
    delta: String,
    #[tabled(rename = "Persist")]
    persistence: String,
    #[tabled(rename = "Class")]
    classification: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Infra")]
    infra: String,
}

/// Run an analysis; returns false when the run failed
pub async fn run_analysis(args: AnalyzeArgs, baseline_dir: &Path, format: OutputFormat) -> Result<bool> {
    let config = AnalysisConfig::load(args.config.as_deref())
        .context("Failed to load analysis configuration")?;
    let sla = SlaTable::load(&args.sla)
        .with_context(|| format!("Failed to load SLA table {}", args.sla.display()))?;

    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| Utc::now().format("%Y%m%dT%H%M%SZ").to_string());
    let baseline_run = args.baseline_run.clone().or_else(|| config.baseline_run_id.clone());
    let store = if baseline_run.is_some() || args.save_baseline.is_some() {
        Some(BaselineStore::open(baseline_dir).context("Failed to open baseline store")?)
    } else {
        None
    };

    let bucket_seconds = config.bucket_seconds;
    let engine = Arc::new(AnalysisEngine::new(config, Arc::new(sla))?.with_run_id(run_id.as_str()));

    let report = match execute(&args, engine, store.as_ref(), baseline_run.as_deref()).await {
        Ok(report) => report,
        Err(e) => {
            error!(run_id = %run_id, error = %e, "Analysis failed");
            AnalysisReport::failed(e.to_string())
        }
    };

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }
    if let Some(path) = &args.metrics_out {
        std::fs::write(path, AnalyzerMetrics::new().render())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }

    if report.status == AnalysisStatus::Failed {
        return Ok(false);
    }

    if let (Some(store), Some(save_id)) = (&store, &args.save_baseline) {
        let snapshot = BaselineSnapshot::new(save_id.as_str(), bucket_seconds, report.baselines.clone());
        let path = store.save(&snapshot).context("Failed to save baseline")?;
        if matches!(format, OutputFormat::Table) {
            print_success(&format!("Baselines saved as '{}' ({})", save_id, path.display()));
        }
    }
    if let Some(path) = &args.output {
        if matches!(format, OutputFormat::Table) {
            print_info(&format!("Full report written to {}", path.display()));
        }
    }

    Ok(true)
}

/// Ingest inputs and run the engine; every error here yields a failed report
async fn execute(
    args: &AnalyzeArgs,
    engine: Arc<AnalysisEngine>,
    store: Option<&BaselineStore>,
    baseline_run: Option<&str>,
) -> analyzer_lib::Result<AnalysisReport> {
    let results = ingest::load_results(&args.results).await?;
    let mut input = AnalysisInput::new(results.samples)
        .with_row_counts(results.malformed_rows, results.total_rows);

    if let Some(path) = &args.infra {
        input = input.with_infra(ingest::load_infra(path).await?.samples);
    }
    if let (Some(store), Some(run_id)) = (store, baseline_run) {
        input = input.with_baseline_override(store.load(run_id)?);
    }

    engine.run_parallel(Arc::new(input)).await
}

fn print_report(report: &AnalysisReport) {
    println!("{}", "Load Test Analysis".bold());
    println!("{}", "=".repeat(60));
    if report.status == AnalysisStatus::Failed {
        print_error(&report.headline);
        return;
    }

    println!("Status:      {}", color_status(report.status));
    if let Some(mode) = report.metric_mode {
        println!("Infra units: {}", mode.to_string().cyan());
    }
    match report.threshold_concurrency {
        Some(users) => println!("Threshold:   {} concurrent users", users.to_string().red().bold()),
        None => println!("Threshold:   {}", "none".green()),
    }
    if report.malformed_rows > 0 {
        println!("Malformed:   {} rows skipped", report.malformed_rows);
    }
    println!();
    println!("{}", report.headline.bold());
    println!();

    for warning in &report.warnings {
        print_warning(warning);
    }
    for scope in report
        .scopes
        .iter()
        .filter(|s| s.status != ScopeStatus::Analyzed)
    {
        print_warning(&format!(
            "{} '{}' skipped: {} ({} usable buckets)",
            scope.scope, scope.scope_name, scope.status, scope.usable_buckets
        ));
    }

    if !report.findings.is_empty() {
        println!();
        println!("{}", "Findings".bold());
        let rows: Vec<FindingRow> = report
            .findings
            .iter()
            .map(|f| FindingRow {
                onset: format!("#{}", f.onset_bucket_index),
                time: format_timestamp(f.onset_timestamp),
                scope: f.scope_name.clone(),
                bottleneck_type: f.bottleneck_type.to_string(),
                users: f.concurrency_at_onset,
                value: format_metric(f.metric, f.metric_value, report.metric_mode),
                baseline: format_metric(f.metric, f.baseline_value, report.metric_mode),
                delta: format_delta(f.delta_pct),
                persistence: format!("{:.0}%", f.persistence_ratio * 100.0),
                classification: color_classification(f.classification),
                severity: color_severity(f.severity),
                infra: f
                    .infra_context
                    .as_ref()
                    .map(|c| c.verdict.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            })
            .collect();
        print_table(&rows);
    }

    if !report.baselines.is_empty() {
        println!();
        println!("{}", "Baselines".bold());
        print_baselines(&report.baselines);
    }
}
