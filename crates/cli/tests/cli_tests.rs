//! CLI integration tests

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn loadscope(args: &[&str]) -> Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "loadscope-cli", "--"])
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute command")
}

/// 21 one-minute buckets; p90 jumps from 400ms to 900ms at bucket 10
fn write_results(dir: &Path) -> String {
    let mut content = String::from("timeStamp,elapsed,label,success,responseCode,allThreads\n");
    for bucket in 0..21i64 {
        let elapsed = if bucket < 10 { 400 } else { 900 };
        for second in 0..60i64 {
            let ts = 1_700_000_000_000 + bucket * 60_000 + second * 1_000;
            content.push_str(&format!("{},{},checkout,true,200,50\n", ts, elapsed));
        }
    }
    let path = dir.join("results.jtl");
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

fn write_sla(dir: &Path) -> String {
    let path = dir.join("sla.json");
    std::fs::write(
        &path,
        r#"{"default": {"threshold_ms": 2000, "percentile_unit": "p90", "error_rate_threshold": 0.05}}"#,
    )
    .unwrap();
    path.to_string_lossy().into_owned()
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = loadscope(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("Load test bottleneck detection"),
        "Should show app description"
    );
    assert!(stdout.contains("analyze"), "Should show analyze command");
    assert!(stdout.contains("baseline"), "Should show baseline command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = loadscope(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("loadscope"), "Should show binary name");
}

/// Test analyze subcommand help
#[test]
fn test_analyze_help() {
    let output = loadscope(&["analyze", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Analyze help should succeed");
    assert!(stdout.contains("--results"), "Should show results option");
    assert!(stdout.contains("--infra"), "Should show infra option");
    assert!(stdout.contains("--sla"), "Should show sla option");
    assert!(stdout.contains("--save-baseline"), "Should show save-baseline option");
}

/// Test that analyze requires the results and SLA files
#[test]
fn test_analyze_requires_inputs() {
    let output = loadscope(&["analyze"]);
    assert!(!output.status.success(), "Analyze without inputs should fail");
}

/// Test a full analysis with JSON output and a saved baseline
#[test]
fn test_analyze_json_and_save_baseline() {
    let temp_dir = TempDir::new().unwrap();
    let results = write_results(temp_dir.path());
    let sla = write_sla(temp_dir.path());
    let baseline_dir = temp_dir.path().join("baselines");
    let baseline_dir = baseline_dir.to_string_lossy();

    let output = loadscope(&[
        "--format",
        "json",
        "--baseline-dir",
        &baseline_dir,
        "analyze",
        "--results",
        &results,
        "--sla",
        &sla,
        "--save-baseline",
        "golden",
    ]);
    assert!(output.status.success(), "Analysis should succeed");

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "partial");
    assert_eq!(report["threshold_concurrency"], 50);
    let findings = report["findings"].as_array().unwrap();
    assert!(findings
        .iter()
        .any(|f| f["classification"] == "bottleneck" && f["onset_bucket_index"] == 10));

    let output = loadscope(&["--format", "json", "--baseline-dir", &baseline_dir, "baseline", "list"]);
    assert!(output.status.success(), "Baseline list should succeed");
    let ids: Vec<String> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(ids, vec!["golden".to_string()]);
}

/// Test that a run without usable samples exits non-zero with a failed report
#[test]
fn test_analyze_empty_results_fails() {
    let temp_dir = TempDir::new().unwrap();
    let results = temp_dir.path().join("empty.jtl");
    std::fs::write(&results, "timeStamp,elapsed,label,success\n").unwrap();
    let sla = write_sla(temp_dir.path());

    let output = loadscope(&[
        "--format",
        "json",
        "analyze",
        "--results",
        &results.to_string_lossy(),
        "--sla",
        &sla,
    ]);
    assert!(!output.status.success(), "Empty input should fail");

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "failed");
    assert!(report["error"].as_str().unwrap().contains("no usable"));
}
