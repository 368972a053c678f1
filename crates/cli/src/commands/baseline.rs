//! Stored baseline CLI commands

use std::path::Path;

use analyzer_lib::{Baseline, BaselineSource, BaselineStore};
use anyhow::{Context, Result};
use colored::Colorize;
use tabled::Tabled;

use crate::output::{format_timestamp, print_json, print_table, print_warning, OutputFormat};

/// Row for baselines table
#[derive(Tabled)]
struct BaselineRow {
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Window")]
    window: String,
    #[tabled(rename = "Users")]
    users: String,
    #[tabled(rename = "p90")]
    p90: String,
    #[tabled(rename = "Avg RT")]
    avg_rt: String,
    #[tabled(rename = "Errors")]
    error_rate: String,
    #[tabled(rename = "Throughput")]
    throughput: String,
    #[tabled(rename = "Source")]
    source: String,
}

/// Print a baselines table
pub fn print_baselines(baselines: &[Baseline]) {
    let rows: Vec<BaselineRow> = baselines
        .iter()
        .map(|b| BaselineRow {
            scope: b.scope.to_string(),
            name: b.scope_name.clone(),
            window: format!("#{}-#{}", b.window_start_index, b.window_end_index),
            users: format!("{:.0}", b.concurrency),
            p90: format!("{:.0}ms", b.metric_values.p90),
            avg_rt: format!("{:.0}ms", b.metric_values.avg_rt),
            error_rate: format!("{:.2}%", b.metric_values.error_rate * 100.0),
            throughput: format!("{:.1}/s", b.metric_values.throughput),
            source: match &b.source {
                BaselineSource::Computed => "computed".to_string(),
                BaselineSource::Override { run_id } => format!("stored:{}", run_id),
            },
        })
        .collect();
    print_table(&rows);
}

/// List stored baseline runs
pub fn list_baselines(dir: &Path, format: OutputFormat) -> Result<()> {
    let store = BaselineStore::open(dir).context("Failed to open baseline store")?;
    let ids = store.list().context("Failed to list baselines")?;

    match format {
        OutputFormat::Json => print_json(&ids)?,
        OutputFormat::Table => {
            if ids.is_empty() {
                print_warning(&format!("No baselines stored in {}", dir.display()));
                return Ok(());
            }
            println!("{}", "Stored Baselines".bold());
            for id in ids {
                println!("  {}", id.cyan());
            }
        }
    }
    Ok(())
}

/// Show one stored baseline run
pub fn show_baseline(dir: &Path, run_id: &str, format: OutputFormat) -> Result<()> {
    let store = BaselineStore::open(dir).context("Failed to open baseline store")?;
    let snapshot = store
        .load(run_id)
        .with_context(|| format!("Failed to load baseline '{}'", run_id))?;

    match format {
        OutputFormat::Json => print_json(&snapshot)?,
        OutputFormat::Table => {
            println!("{}", "Baseline Snapshot".bold());
            println!("{}", "=".repeat(60));
            println!("Run:     {}", snapshot.run_id.cyan());
            println!(
                "Created: {}",
                format_timestamp(snapshot.created_at * 1000)
            );
            println!("Buckets: {}s", snapshot.bucket_seconds);
            println!();
            print_baselines(&snapshot.baselines);
        }
    }
    Ok(())
}
