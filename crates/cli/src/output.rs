//! Output formatting utilities

use analyzer_lib::{AnalysisStatus, Classification, MetricKind, MetricMode, Severity};
use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table
pub fn print_table<T: Tabled>(rows: &[T]) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a metric value in its natural unit
pub fn format_metric(kind: MetricKind, value: f64, mode: Option<MetricMode>) -> String {
    match kind {
        MetricKind::P50 | MetricKind::P90 | MetricKind::P95 | MetricKind::AvgRt => {
            format!("{:.0}ms", value)
        }
        MetricKind::ErrorRate => format!("{:.2}%", value * 100.0),
        MetricKind::Throughput => format!("{:.1}/s", value),
        MetricKind::Cpu => match mode {
            Some(MetricMode::Raw) => format!("{:.3} cores", value),
            _ => format!("{:.1}%", value),
        },
        MetricKind::Memory => match mode {
            Some(MetricMode::Raw) => format!("{:.2} GB", value),
            _ => format!("{:.1}%", value),
        },
    }
}

/// Format a signed percentage change
pub fn format_delta(delta_pct: f64) -> String {
    format!("{:+.1}%", delta_pct)
}

/// Format epoch milliseconds as UTC wall time
pub fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// Color severity based on level
pub fn color_severity(severity: Severity) -> String {
    let label = severity.to_string();
    match severity {
        Severity::Critical => label.red().bold().to_string(),
        Severity::High => label.red().to_string(),
        Severity::Medium => label.yellow().to_string(),
        Severity::Low => label.blue().to_string(),
        Severity::Info => label.dimmed().to_string(),
    }
}

/// Color classification based on how actionable it is
pub fn color_classification(classification: Classification) -> String {
    let label = classification.to_string();
    match classification {
        Classification::Bottleneck => label.red().to_string(),
        Classification::CapacityRisk => label.yellow().to_string(),
        Classification::TransientSpike => label.cyan().to_string(),
        Classification::KnownSlowEndpoint => label.dimmed().to_string(),
    }
}

/// Color run status
pub fn color_status(status: AnalysisStatus) -> String {
    let label = status.to_string();
    match status {
        AnalysisStatus::Success => label.green().to_string(),
        AnalysisStatus::Partial => label.yellow().to_string(),
        AnalysisStatus::Failed => label.red().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_metric_units() {
        assert_eq!(format_metric(MetricKind::P90, 412.4, None), "412ms");
        assert_eq!(format_metric(MetricKind::ErrorRate, 0.0625, None), "6.25%");
        assert_eq!(format_metric(MetricKind::Throughput, 12.34, None), "12.3/s");
        assert_eq!(format_metric(MetricKind::Cpu, 85.0, Some(MetricMode::Pct)), "85.0%");
        assert_eq!(
            format_metric(MetricKind::Cpu, 0.18, Some(MetricMode::Raw)),
            "0.180 cores"
        );
    }

    #[test]
    fn test_format_delta_and_timestamp() {
        assert_eq!(format_delta(125.0), "+125.0%");
        assert_eq!(format_delta(-3.24), "-3.2%");
        assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14 22:13:20");
    }
}
