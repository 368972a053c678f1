//! Request-level result table parsing (JTL-equivalent CSV)

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use csv::StringRecord;
use tracing::warn;

use super::{column, field, is_blank, table_reader};
use crate::error::{AnalysisError, Result};
use crate::models::Sample;

const TIMESTAMP: &[&str] = &["timestamp", "timeStamp", "time"];
const ELAPSED: &[&str] = &["elapsed_ms", "elapsed"];
const LABEL: &[&str] = &["label"];
const SUCCESS: &[&str] = &["success"];
const RESPONSE_CODE: &[&str] = &["response_code", "responseCode"];
const CONCURRENCY: &[&str] = &["concurrency", "allThreads", "grpThreads", "threads"];

/// 2000-01-01T00:00:00Z
const MIN_TIMESTAMP_MS: i64 = 946_684_800_000;
/// 2100-01-01T00:00:00Z
const MAX_TIMESTAMP_MS: i64 = 4_102_444_800_000;

/// Label used when the table has no label column or a row leaves it blank
pub const UNLABELED: &str = "unlabeled";

/// Parsed result table with malformed-row accounting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResults {
    /// Valid samples, ordered by timestamp
    pub samples: Vec<Sample>,
    pub malformed_rows: usize,
    /// Non-blank data rows, valid or not
    pub total_rows: usize,
}

struct Columns {
    timestamp: usize,
    elapsed: usize,
    label: Option<usize>,
    success: Option<usize>,
    response_code: Option<usize>,
    concurrency: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let required = |aliases: &[&str]| {
            column(headers, aliases).ok_or_else(|| {
                AnalysisError::Parse(format!("result table has no '{}' column", aliases[0]))
            })
        };
        Ok(Self {
            timestamp: required(TIMESTAMP)?,
            elapsed: required(ELAPSED)?,
            label: column(headers, LABEL),
            success: column(headers, SUCCESS),
            response_code: column(headers, RESPONSE_CODE),
            concurrency: column(headers, CONCURRENCY),
        })
    }
}

/// Parse a result table
///
/// Rows with an implausible timestamp or unparseable elapsed time are
/// skipped with a warning and counted as malformed. Quoted fields may span
/// lines. A missing header or required column is an error.
pub fn parse_results(content: &str) -> Result<ParsedResults> {
    let mut reader = table_reader(content);
    let headers = reader.headers()?.clone();
    if is_blank(&headers) {
        return Err(AnalysisError::Parse("result table is empty".to_string()));
    }
    let columns = Columns::resolve(&headers)?;

    let mut parsed = ParsedResults::default();
    for result in reader.records() {
        let record = match result {
            Ok(record) if is_blank(&record) => continue,
            Ok(record) => record,
            Err(e) => {
                parsed.total_rows += 1;
                parsed.malformed_rows += 1;
                warn!(error = %e, "Skipping unreadable result row");
                continue;
            }
        };
        parsed.total_rows += 1;
        match parse_row(&record, &columns) {
            Ok(sample) => parsed.samples.push(sample),
            Err(reason) => {
                parsed.malformed_rows += 1;
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                warn!(line, reason = %reason, "Skipping malformed result row");
            }
        }
    }

    parsed.samples.sort_by_key(|s| s.timestamp_ms);
    Ok(parsed)
}

fn parse_row(record: &StringRecord, columns: &Columns) -> std::result::Result<Sample, String> {
    let raw_ts = field(record, Some(columns.timestamp)).ok_or("missing timestamp")?;
    let timestamp_ms =
        parse_timestamp(raw_ts).ok_or_else(|| format!("invalid timestamp '{}'", raw_ts))?;

    let raw_elapsed = field(record, Some(columns.elapsed)).ok_or("missing elapsed time")?;
    let elapsed_ms = raw_elapsed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| format!("unparseable elapsed time '{}'", raw_elapsed))?;

    let response_code = field(record, columns.response_code).unwrap_or_default().to_string();
    let success = field(record, columns.success)
        .and_then(parse_bool)
        .unwrap_or_else(|| is_success_code(&response_code));

    Ok(Sample {
        timestamp_ms,
        elapsed_ms,
        label: field(record, columns.label).unwrap_or(UNLABELED).to_string(),
        success,
        response_code,
        concurrency: field(record, columns.concurrency)
            .and_then(|c| c.parse().ok())
            .unwrap_or(0),
    })
}

/// Epoch milliseconds, RFC 3339, or `YYYY-MM-DD HH:MM:SS[.fff]` in UTC
///
/// Values outside 2000..2100 are rejected; they are almost always epoch
/// seconds, zeroes or counters rather than wall-clock milliseconds.
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let ms = if let Ok(ms) = value.parse::<i64>() {
        ms
    } else if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        dt.timestamp_millis()
    } else {
        ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())?
    };
    (MIN_TIMESTAMP_MS..MAX_TIMESTAMP_MS).contains(&ms).then_some(ms)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// 2xx and 3xx response codes count as successful
fn is_success_code(code: &str) -> bool {
    code.parse::<u16>()
        .map(|c| (200..400).contains(&c))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_header() {
        let content = "\
timestamp,elapsed_ms,label,success,response_code,concurrency
1700000060000,250,login,true,200,10
1700000000000,120.5,home,false,500,8
";
        let parsed = parse_results(content).unwrap();
        assert_eq!(parsed.total_rows, 2);
        assert_eq!(parsed.malformed_rows, 0);
        // sorted by timestamp
        assert_eq!(parsed.samples[0].label, "home");
        assert_eq!(parsed.samples[0].elapsed_ms, 120.5);
        assert!(!parsed.samples[0].success);
        assert_eq!(parsed.samples[1].concurrency, 10);
    }

    #[test]
    fn test_jmeter_header_and_quoted_label() {
        let content = "\
timeStamp,elapsed,label,responseCode,responseMessage,threadName,success,bytes,grpThreads,allThreads
1700000000000,300,\"GET /search?q=a,b\",200,OK,tg 1-1,true,512,5,25
";
        let parsed = parse_results(content).unwrap();
        let sample = &parsed.samples[0];
        assert_eq!(sample.label, "GET /search?q=a,b");
        assert_eq!(sample.response_code, "200");
        // allThreads wins over grpThreads
        assert_eq!(sample.concurrency, 25);
    }

    #[test]
    fn test_quoted_message_spanning_lines() {
        let content = "\
timeStamp,elapsed,label,responseCode,responseMessage,success,allThreads
1700000000000,800,checkout,500,\"Internal
Server Error\",false,30
1700000001000,120,checkout,200,OK,true,30
";
        let parsed = parse_results(content).unwrap();
        assert_eq!(parsed.total_rows, 2);
        assert_eq!(parsed.malformed_rows, 0);
        assert_eq!(parsed.samples.len(), 2);
        let failed = &parsed.samples[0];
        assert!(!failed.success);
        assert_eq!(failed.response_code, "500");
        assert_eq!(failed.concurrency, 30);
    }

    #[test]
    fn test_implausible_timestamps_are_malformed() {
        let content = "\
timestamp,elapsed_ms,label
0,100,home
1700000000,100,home
-1700000000000,100,home
99999999999999999,100,home
1700000000000,100,home
";
        let parsed = parse_results(content).unwrap();
        assert_eq!(parsed.total_rows, 5);
        assert_eq!(parsed.malformed_rows, 4);
        assert_eq!(parsed.samples.len(), 1);
        assert_eq!(parsed.samples[0].timestamp_ms, 1_700_000_000_000);
    }

    #[test]
    fn test_malformed_rows_skipped() {
        let content = "\
timestamp,elapsed_ms,label,success,response_code,concurrency
1700000000000,100,home,true,200,1
not-a-time,100,home,true,200,1
1700000001000,-5,home,true,200,1

1700000002000,abc,home,true,200,1
1700000003000,90,home,true,200,1
";
        let parsed = parse_results(content).unwrap();
        assert_eq!(parsed.total_rows, 5);
        assert_eq!(parsed.malformed_rows, 3);
        assert_eq!(parsed.samples.len(), 2);
    }

    #[test]
    fn test_success_falls_back_to_response_code() {
        let content = "\
timestamp,elapsed_ms,label,response_code
1700000000000,100,home,302
1700000000500,100,home,503
";
        let parsed = parse_results(content).unwrap();
        assert!(parsed.samples[0].success);
        assert!(!parsed.samples[1].success);
        assert_eq!(parsed.samples[0].concurrency, 0);
    }

    #[test]
    fn test_missing_required_column() {
        let err = parse_results("label,success\nhome,true\n").unwrap_err();
        assert!(matches!(err, AnalysisError::Parse(_)));
        assert!(matches!(parse_results(""), Err(AnalysisError::Parse(_))));
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(parse_timestamp("1700000000000"), Some(1_700_000_000_000));
        assert_eq!(
            parse_timestamp("2023-11-14T22:13:20Z"),
            Some(1_700_000_000_000)
        );
        assert_eq!(
            parse_timestamp("2023-11-14 22:13:20.250"),
            Some(1_700_000_000_250)
        );
        assert_eq!(parse_timestamp("2023-11-14 22:13:20"), Some(1_700_000_000_000));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("0"), None);
        assert_eq!(parse_timestamp("1970-01-01T00:00:00Z"), None);
    }
}
