//! Finding aggregation: ordering, threshold concurrency and headline

use crate::models::{Classification, Finding};

/// Merged findings with the run-level summary
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub findings: Vec<Finding>,
    pub threshold_concurrency: Option<u32>,
    pub headline: String,
}

/// Order findings and derive the headline
///
/// Findings are sorted by onset bucket, then scope, then type, so the result
/// does not depend on the order scopes finished in.
pub fn aggregate(mut findings: Vec<Finding>) -> Aggregate {
    findings.sort_by(|a, b| {
        a.onset_bucket_index
            .cmp(&b.onset_bucket_index)
            .then_with(|| a.scope.cmp(&b.scope))
            .then_with(|| a.scope_name.cmp(&b.scope_name))
            .then_with(|| a.bottleneck_type.cmp(&b.bottleneck_type))
            .then_with(|| a.metric.cmp(&b.metric))
    });

    let threshold_concurrency = findings
        .iter()
        .filter(|f| f.is_bottleneck())
        .map(|f| f.concurrency_at_onset)
        .min();
    let headline = headline(&findings, threshold_concurrency);

    Aggregate {
        findings,
        threshold_concurrency,
        headline,
    }
}

/// Human-readable summary; only bottlenecks count toward the tally
pub fn headline(findings: &[Finding], threshold_concurrency: Option<u32>) -> String {
    let count = |c: Classification| findings.iter().filter(|f| f.classification == c).count();
    let bottlenecks = count(Classification::Bottleneck);

    let mut text = match threshold_concurrency {
        Some(users) if bottlenecks > 0 => {
            let worst = findings
                .iter()
                .filter(|f| f.is_bottleneck())
                .map(|f| f.severity)
                .max()
                .map(|s| s.to_string())
                .unwrap_or_default();
            format!(
                "{} bottleneck{} detected (highest severity: {}); sustained degradation begins at {} concurrent users",
                bottlenecks,
                plural(bottlenecks),
                worst,
                users
            )
        }
        _ => "No sustained bottlenecks detected".to_string(),
    };

    let notes: Vec<String> = [
        (Classification::TransientSpike, "transient spike", "transient spikes"),
        (Classification::KnownSlowEndpoint, "known-slow endpoint", "known-slow endpoints"),
        (Classification::CapacityRisk, "capacity risk", "capacity risks"),
    ]
    .iter()
    .filter_map(|&(classification, one, many)| {
        let n = count(classification);
        (n > 0).then(|| format!("{} {}", n, if n == 1 { one } else { many }))
    })
    .collect();

    if !notes.is_empty() {
        text.push_str(&format!(" (also: {})", notes.join(", ")));
    }
    text
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
