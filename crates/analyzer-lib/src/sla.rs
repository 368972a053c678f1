//! SLA thresholds per scope
//!
//! The engine consumes SLAs through the [`SlaResolver`] trait. [`SlaTable`]
//! is the file-backed implementation used by the CLI: exact scope names with
//! an optional default entry. A scope with neither is an error.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::models::MetricKind;

/// Response-time statistic an SLA threshold applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentileUnit {
    P50,
    P90,
    P95,
    Avg,
}

impl PercentileUnit {
    /// Bucket metric holding this statistic
    pub fn metric(&self) -> MetricKind {
        match self {
            PercentileUnit::P50 => MetricKind::P50,
            PercentileUnit::P90 => MetricKind::P90,
            PercentileUnit::P95 => MetricKind::P95,
            PercentileUnit::Avg => MetricKind::AvgRt,
        }
    }
}

/// Resolved SLA for one scope
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlaThreshold {
    pub threshold_ms: f64,
    #[serde(default = "default_percentile_unit")]
    pub percentile_unit: PercentileUnit,
    pub error_rate_threshold: f64,
}

fn default_percentile_unit() -> PercentileUnit {
    PercentileUnit::P90
}

/// Resolves the SLA that applies to a scope name
pub trait SlaResolver: Send + Sync {
    /// Resolve the SLA for `scope_name` ("overall" or an endpoint label)
    fn resolve(&self, scope_name: &str) -> Result<SlaThreshold>;
}

/// Static SLA table keyed by exact scope name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlaTable {
    #[serde(default)]
    pub default: Option<SlaThreshold>,
    #[serde(default)]
    pub scopes: BTreeMap<String, SlaThreshold>,
}

impl SlaTable {
    /// Table with a single default applying to every scope
    pub fn with_default(sla: SlaThreshold) -> Self {
        Self {
            default: Some(sla),
            scopes: BTreeMap::new(),
        }
    }

    /// Add or replace an exact-name entry
    pub fn with_scope(mut self, scope_name: impl Into<String>, sla: SlaThreshold) -> Self {
        self.scopes.insert(scope_name.into(), sla);
        self
    }

    /// Load an SLA table from a JSON file
    ///
    /// JSON keeps scope names verbatim; endpoint labels are case-sensitive.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let table: SlaTable = serde_json::from_str(&content)?;

        if table.default.is_none() && table.scopes.is_empty() {
            return Err(AnalysisError::InvalidConfig(format!(
                "SLA file {} defines no thresholds",
                path.display()
            )));
        }
        Ok(table)
    }
}

impl SlaResolver for SlaTable {
    fn resolve(&self, scope_name: &str) -> Result<SlaThreshold> {
        self.scopes
            .get(scope_name)
            .or(self.default.as_ref())
            .copied()
            .ok_or_else(|| AnalysisError::MissingSla(scope_name.to_string()))
    }
}
