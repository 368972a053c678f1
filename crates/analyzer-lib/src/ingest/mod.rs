//! Input adapters for result and infrastructure tables
//!
//! File reading is async (tokio); parsing is pure and works on the file
//! content, so it can be tested without touching the filesystem.

mod infra;
mod jtl;

pub use infra::{parse_infra, ParsedInfra, DEFAULT_ENTITY};
pub use jtl::{parse_results, parse_timestamp, ParsedResults, UNLABELED};

use std::path::Path;

use csv::{Reader, ReaderBuilder, StringRecord, Trim};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{AnalysisError, Result};

/// Read and parse a request-level result table
pub async fn load_results(path: &Path) -> Result<ParsedResults> {
    let content = read_input(path).await?;
    let parsed = parse_results(&content)?;
    info!(
        path = %path.display(),
        rows = parsed.total_rows,
        samples = parsed.samples.len(),
        malformed = parsed.malformed_rows,
        "Result table loaded"
    );
    Ok(parsed)
}

/// Read and parse an infrastructure utilization table
pub async fn load_infra(path: &Path) -> Result<ParsedInfra> {
    let content = read_input(path).await?;
    let parsed = parse_infra(&content)?;
    info!(
        path = %path.display(),
        rows = parsed.samples.len(),
        skipped = parsed.skipped_rows,
        "Infrastructure table loaded"
    );
    Ok(parsed)
}

async fn read_input(path: &Path) -> Result<String> {
    debug!(path = %path.display(), "Reading input file");
    fs::read_to_string(path).await.map_err(|e| {
        AnalysisError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read {}: {}", path.display(), e),
        ))
    })
}

/// Header-driven reader; rows may have fewer or more fields than the header
fn table_reader(content: &str) -> Reader<&[u8]> {
    ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(content.trim_start_matches('\u{feff}').as_bytes())
}

/// Index of the first header matching any alias (case-insensitive)
fn column(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|h| h.eq_ignore_ascii_case(alias)))
}

/// Field at `index`, `None` when absent or blank
fn field(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    record.get(index?).filter(|value| !value.is_empty())
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(str::is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_results_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("results.jtl");
        fs::write(
            &path,
            "timestamp,elapsed_ms,label,success,response_code,concurrency\n\
             1700000000000,100,home,true,200,5\n\
             1700000001000,oops,home,true,200,5\n",
        )
        .await
        .unwrap();

        let parsed = load_results(&path).await.unwrap();
        assert_eq!(parsed.samples.len(), 1);
        assert_eq!(parsed.malformed_rows, 1);
        assert_eq!(parsed.total_rows, 2);
    }

    #[tokio::test]
    async fn test_load_infra_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("infra.csv");
        fs::write(&path, "timestamp,entity,cpu_pct\n1700000000000,api,42\n")
            .await
            .unwrap();

        let parsed = load_infra(&path).await.unwrap();
        assert_eq!(parsed.samples[0].entity, "api");
        assert_eq!(parsed.samples[0].cpu_pct, Some(42.0));
    }

    #[test]
    fn test_column_aliases() {
        let headers = StringRecord::from(vec!["timeStamp", "elapsed", "label", "allThreads"]);
        assert_eq!(column(&headers, &["timestamp"]), Some(0));
        assert_eq!(column(&headers, &["elapsed_ms", "elapsed"]), Some(1));
        assert_eq!(column(&headers, &["concurrency", "allthreads"]), Some(3));
        assert_eq!(column(&headers, &["missing"]), None);
    }

    #[test]
    fn test_field_blank_is_none() {
        let record = StringRecord::from(vec!["1", "", "x"]);
        assert_eq!(field(&record, Some(0)), Some("1"));
        assert_eq!(field(&record, Some(1)), None);
        assert_eq!(field(&record, Some(5)), None);
        assert_eq!(field(&record, None), None);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_results(&temp_dir.path().join("absent.jtl")).await;
        assert!(matches!(result, Err(AnalysisError::Io(_))));
    }
}
