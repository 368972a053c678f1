//! Infrastructure utilization table parsing

use tracing::warn;

use super::jtl::parse_timestamp;
use super::{column, field, is_blank, table_reader};
use crate::error::{AnalysisError, Result};
use crate::models::InfraSample;

/// Entity name used when the table has no entity column
pub const DEFAULT_ENTITY: &str = "default";

/// Parsed infra table with skipped-row accounting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedInfra {
    /// Valid rows, ordered by timestamp
    pub samples: Vec<InfraSample>,
    pub skipped_rows: usize,
}

/// Parse an infra table
///
/// Every measurement column is optional. Blank cells and negative values
/// (the "limit not defined" sentinel) become `None`. Rows without a
/// plausible timestamp are skipped.
pub fn parse_infra(content: &str) -> Result<ParsedInfra> {
    let mut reader = table_reader(content);
    let headers = reader.headers()?.clone();
    if is_blank(&headers) {
        return Err(AnalysisError::Parse("infrastructure table is empty".to_string()));
    }

    let timestamp = column(&headers, &["timestamp", "time"])
        .ok_or_else(|| AnalysisError::Parse("infrastructure table has no 'timestamp' column".to_string()))?;
    let entity = column(&headers, &["entity", "container", "pod", "host"]);
    let cpu_pct = column(&headers, &["cpu_pct", "cpu_percent"]);
    let memory_pct = column(&headers, &["memory_pct", "memory_percent", "mem_pct"]);
    let cpu_cores = column(&headers, &["cpu_cores", "cpu"]);
    let memory_mb = column(&headers, &["memory_mb", "mem_mb"]);
    let cpu_limit = column(&headers, &["cpu_limit_cores", "cpu_limit"]);
    let memory_limit = column(&headers, &["memory_limit_mb", "mem_limit_mb", "memory_limit"]);

    let mut parsed = ParsedInfra::default();
    for result in reader.records() {
        let record = match result {
            Ok(record) if is_blank(&record) => continue,
            Ok(record) => record,
            Err(e) => {
                parsed.skipped_rows += 1;
                warn!(error = %e, "Skipping unreadable infrastructure row");
                continue;
            }
        };
        let Some(timestamp_ms) = field(&record, Some(timestamp)).and_then(parse_timestamp) else {
            parsed.skipped_rows += 1;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            warn!(line, "Skipping infrastructure row without a valid timestamp");
            continue;
        };
        let measure = |index| field(&record, index).and_then(parse_measurement);

        parsed.samples.push(InfraSample {
            timestamp_ms,
            entity: field(&record, entity).unwrap_or(DEFAULT_ENTITY).to_string(),
            cpu_pct: measure(cpu_pct),
            memory_pct: measure(memory_pct),
            cpu_cores: measure(cpu_cores),
            memory_mb: measure(memory_mb),
            cpu_limit_cores: measure(cpu_limit),
            memory_limit_mb: measure(memory_limit),
        });
    }

    parsed.samples.sort_by_key(|s| s.timestamp_ms);
    Ok(parsed)
}

fn parse_measurement(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}
