//! Core data models for the analysis engine

use serde::{Deserialize, Serialize};

use crate::baseline::Baseline;
use crate::bucket::TimeBucket;

/// One request result from the load-test result table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub elapsed_ms: f64,
    pub label: String,
    pub success: bool,
    pub response_code: String,
    pub concurrency: u32,
}

/// One row of the infrastructure utilization table
///
/// Every measurement is optional. Limits reported upstream as a negative
/// sentinel are stored as `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InfraSample {
    pub timestamp_ms: i64,
    pub entity: String,
    pub cpu_pct: Option<f64>,
    pub memory_pct: Option<f64>,
    pub cpu_cores: Option<f64>,
    pub memory_mb: Option<f64>,
    pub cpu_limit_cores: Option<f64>,
    pub memory_limit_mb: Option<f64>,
}

/// Which part of the system a baseline or finding describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Overall,
    Endpoint,
    Infrastructure,
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeKind::Overall => write!(f, "overall"),
            ScopeKind::Endpoint => write!(f, "endpoint"),
            ScopeKind::Infrastructure => write!(f, "infrastructure"),
        }
    }
}

/// Scope key used while running the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub name: String,
}

impl Scope {
    pub const OVERALL_NAME: &'static str = "overall";

    pub fn overall() -> Self {
        Self {
            kind: ScopeKind::Overall,
            name: Self::OVERALL_NAME.to_string(),
        }
    }

    pub fn endpoint(label: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Endpoint,
            name: label.into(),
        }
    }

    pub fn is_overall(&self) -> bool {
        self.kind == ScopeKind::Overall
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ScopeKind::Overall => write!(f, "{}", self.name),
            _ => write!(f, "{}:{}", self.kind, self.name),
        }
    }
}

/// Per-bucket metric series tracked by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    P50,
    P90,
    P95,
    AvgRt,
    ErrorRate,
    Throughput,
    Cpu,
    Memory,
}

impl MetricKind {
    /// Request-level series computed for every bucket
    pub const PERFORMANCE: [MetricKind; 6] = [
        MetricKind::P50,
        MetricKind::P90,
        MetricKind::P95,
        MetricKind::AvgRt,
        MetricKind::ErrorRate,
        MetricKind::Throughput,
    ];

    /// Series whose outlier flag marks the whole bucket as an outlier
    pub const CORE: [MetricKind; 3] = [MetricKind::P90, MetricKind::AvgRt, MetricKind::ErrorRate];

    /// Smallest spread the outlier rule will assume for this series
    pub fn absolute_mad_floor(&self) -> f64 {
        match self {
            MetricKind::P50 | MetricKind::P90 | MetricKind::P95 | MetricKind::AvgRt => 1.0,
            MetricKind::ErrorRate => 0.005,
            MetricKind::Throughput => 0.01,
            MetricKind::Cpu | MetricKind::Memory => 0.0,
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::P50 => write!(f, "p50"),
            MetricKind::P90 => write!(f, "p90"),
            MetricKind::P95 => write!(f, "p95"),
            MetricKind::AvgRt => write!(f, "avg_rt"),
            MetricKind::ErrorRate => write!(f, "error_rate"),
            MetricKind::Throughput => write!(f, "throughput"),
            MetricKind::Cpu => write!(f, "cpu"),
            MetricKind::Memory => write!(f, "memory"),
        }
    }
}

/// Detector family that produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckType {
    Latency,
    ErrorRate,
    ThroughputPlateau,
    InfraSaturation,
    ResourceCoupling,
    MultiTier,
}

impl std::fmt::Display for BottleneckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BottleneckType::Latency => write!(f, "latency"),
            BottleneckType::ErrorRate => write!(f, "error_rate"),
            BottleneckType::ThroughputPlateau => write!(f, "throughput_plateau"),
            BottleneckType::InfraSaturation => write!(f, "infra_saturation"),
            BottleneckType::ResourceCoupling => write!(f, "resource_coupling"),
            BottleneckType::MultiTier => write!(f, "multi_tier"),
        }
    }
}

/// Final classification of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Bottleneck,
    TransientSpike,
    KnownSlowEndpoint,
    CapacityRisk,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Bottleneck => write!(f, "bottleneck"),
            Classification::TransientSpike => write!(f, "transient_spike"),
            Classification::KnownSlowEndpoint => write!(f, "known_slow_endpoint"),
            Classification::CapacityRisk => write!(f, "capacity_risk"),
        }
    }
}

/// Severity levels, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map a composite 0-7 score onto a severity level
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s >= 7 => Severity::Critical,
            s if s >= 5 => Severity::High,
            s if s >= 3 => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Units used for infrastructure thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricMode {
    /// Utilization percentages against defined limits
    Pct,
    /// Raw usage (CPU cores, memory GB) compared against baseline
    Raw,
}

impl std::fmt::Display for MetricMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricMode::Pct => write!(f, "pct"),
            MetricMode::Raw => write!(f, "raw"),
        }
    }
}

/// Outcome of correlating a bottleneck with infrastructure usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfraVerdict {
    InfrastructureCorrelated,
    InfrastructureIndependent,
    Inconclusive,
}

impl std::fmt::Display for InfraVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfraVerdict::InfrastructureCorrelated => write!(f, "infrastructure_correlated"),
            InfraVerdict::InfrastructureIndependent => write!(f, "infrastructure_independent"),
            InfraVerdict::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

/// Average and peak utilization over a range of buckets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub avg_cpu: Option<f64>,
    pub max_cpu: Option<f64>,
    pub avg_memory: Option<f64>,
    pub max_memory: Option<f64>,
    /// Buckets in the range holding at least one infra row
    pub buckets_with_data: usize,
    /// Buckets in the range
    pub buckets_in_window: usize,
}

impl ResourceSnapshot {
    /// Window average of `Cpu` or `Memory`
    pub fn average(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::Cpu => self.avg_cpu,
            MetricKind::Memory => self.avg_memory,
            _ => None,
        }
    }

    /// Fraction of the window backed by infrastructure data
    pub fn coverage(&self) -> f64 {
        if self.buckets_in_window == 0 {
            return 0.0;
        }
        self.buckets_with_data as f64 / self.buckets_in_window as f64
    }
}

/// Baseline vs degradation utilization for one infrastructure entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureWindow {
    pub entity: String,
    pub metric_mode: MetricMode,
    pub limits_available: bool,
    pub baseline_window: ResourceSnapshot,
    pub degradation_window: ResourceSnapshot,
    pub cpu_delta_pct: Option<f64>,
    pub memory_delta_pct: Option<f64>,
}

/// Infrastructure evidence attached to a bottleneck finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfraContext {
    pub verdict: InfraVerdict,
    pub metric_mode: Option<MetricMode>,
    pub windows: Vec<InfrastructureWindow>,
}

/// A classified degradation, spike, slow endpoint or capacity risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub bottleneck_type: BottleneckType,
    pub metric: MetricKind,
    pub scope: ScopeKind,
    pub scope_name: String,
    pub onset_bucket_index: usize,
    /// Start of the onset bucket, epoch milliseconds
    pub onset_timestamp: i64,
    pub concurrency_at_onset: u32,
    pub metric_value: f64,
    pub baseline_value: f64,
    pub threshold_value: f64,
    pub delta_pct: f64,
    pub persistence_ratio: f64,
    pub classification: Classification,
    pub severity: Severity,
    /// Composite 0-7 score; transient spikes keep it but are forced to low.
    /// Known-slow endpoints and capacity risks carry 0
    pub severity_score: u8,
    pub infra_context: Option<InfraContext>,
    pub description: String,
}

impl Finding {
    pub fn is_bottleneck(&self) -> bool {
        self.classification == Classification::Bottleneck
    }

    /// Attach Phase 2 infrastructure evidence
    pub fn with_infra_context(mut self, context: InfraContext) -> Self {
        self.infra_context = Some(context);
        self
    }
}

/// Overall status of one analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    /// Performance and infrastructure data fully analysed
    Success,
    /// Performance analysed, infrastructure missing or degraded
    Partial,
    /// No usable performance data
    Failed,
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisStatus::Success => write!(f, "success"),
            AnalysisStatus::Partial => write!(f, "partial"),
            AnalysisStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Whether a scope could be analysed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeStatus {
    Analyzed,
    InsufficientData,
    InsufficientBaselineData,
}

impl std::fmt::Display for ScopeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeStatus::Analyzed => write!(f, "analyzed"),
            ScopeStatus::InsufficientData => write!(f, "insufficient_data"),
            ScopeStatus::InsufficientBaselineData => write!(f, "insufficient_baseline_data"),
        }
    }
}

/// Per-scope outcome summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeSummary {
    pub scope: ScopeKind,
    pub scope_name: String,
    pub status: ScopeStatus,
    pub usable_buckets: usize,
    pub findings: usize,
}

/// Everything produced by one analysis run, ready for report rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub status: AnalysisStatus,
    pub metric_mode: Option<MetricMode>,
    pub headline: String,
    pub threshold_concurrency: Option<u32>,
    pub findings: Vec<Finding>,
    pub baselines: Vec<Baseline>,
    pub scopes: Vec<ScopeSummary>,
    /// Overall timeline with raw and smoothed values
    pub buckets: Vec<TimeBucket>,
    pub warnings: Vec<String>,
    pub malformed_rows: usize,
    pub error: Option<String>,
}

impl AnalysisReport {
    /// Report for a run that could not analyse any performance data
    pub fn failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            status: AnalysisStatus::Failed,
            metric_mode: None,
            headline: format!("Analysis failed: {}", reason),
            threshold_concurrency: None,
            findings: Vec::new(),
            baselines: Vec::new(),
            scopes: Vec::new(),
            buckets: Vec::new(),
            warnings: Vec::new(),
            malformed_rows: 0,
            error: Some(reason),
        }
    }

    /// Count findings with the given classification
    pub fn count(&self, classification: Classification) -> usize {
        self.findings
            .iter()
            .filter(|f| f.classification == classification)
            .count()
    }
}
