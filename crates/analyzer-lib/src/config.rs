//! Analysis configuration
//!
//! One immutable value carrying every tunable. Components receive it by
//! reference; nothing reads thresholds from ambient state.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "LOADSCOPE";

/// Tunables for bucketing, filtering, detection and infra correlation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Width of a time bucket in seconds
    #[serde(default = "default_bucket_seconds")]
    pub bucket_seconds: u64,

    /// Leading buckets kept for charting but excluded from analysis
    #[serde(default = "default_warmup_buckets")]
    pub warmup_buckets: usize,

    /// Buckets required after an onset before it can be validated
    #[serde(default = "default_sustained_buckets")]
    pub sustained_buckets: usize,

    /// Share of post-onset buckets that must stay degraded for a bottleneck
    #[serde(default = "default_persistence_ratio")]
    pub persistence_ratio: f64,

    /// Centered rolling window for the outlier filter (odd)
    #[serde(default = "default_rolling_window_buckets")]
    pub rolling_window_buckets: usize,

    /// MAD multiplier for the outlier rule
    #[serde(default = "default_outlier_mad_k")]
    pub outlier_mad_k: f64,

    /// Maximum buckets in a baseline window
    #[serde(default = "default_baseline_buckets")]
    pub baseline_buckets: usize,

    /// Concurrency rise (%) that ends the baseline window
    #[serde(default = "default_baseline_ramp_pct")]
    pub baseline_ramp_pct: f64,

    /// Relative p90 increase (%) that counts as degraded
    #[serde(default = "default_latency_degrade_pct")]
    pub latency_degrade_pct: f64,

    /// Absolute error-rate increase (0-1) that counts as degraded
    #[serde(default = "default_error_rate_degrade_abs")]
    pub error_rate_degrade_abs: f64,

    /// Throughput growth (%) below which a concurrency step is a plateau
    #[serde(default = "default_throughput_plateau_pct")]
    pub throughput_plateau_pct: f64,

    /// CPU utilization (%) considered high
    #[serde(default = "default_cpu_high_pct")]
    pub cpu_high_pct: f64,

    /// Memory utilization (%) considered high
    #[serde(default = "default_memory_high_pct")]
    pub memory_high_pct: f64,

    /// Relative increase (%) over baseline that is material in raw mode
    #[serde(default = "default_raw_metric_degrade_pct")]
    pub raw_metric_degrade_pct: f64,

    /// Percentage-point rise a relative delta also needs in pct mode
    #[serde(default = "default_pct_points_degrade")]
    pub pct_points_degrade: f64,

    /// Second-half over first-half utilization growth (%) flagged as a climbing trend
    #[serde(default = "default_capacity_trend_pct")]
    pub capacity_trend_pct: f64,

    /// Largest tolerated share of malformed result rows (0-1)
    #[serde(default = "default_max_malformed_ratio")]
    pub max_malformed_ratio: f64,

    /// Largest bucket grid a run may span
    #[serde(default = "default_max_buckets")]
    pub max_buckets: usize,

    /// Run whose stored baselines replace the computed ones
    #[serde(default)]
    pub baseline_run_id: Option<String>,
}

fn default_bucket_seconds() -> u64 {
    60
}

fn default_warmup_buckets() -> usize {
    1
}

fn default_sustained_buckets() -> usize {
    2
}

fn default_persistence_ratio() -> f64 {
    0.6
}

fn default_rolling_window_buckets() -> usize {
    3
}

fn default_outlier_mad_k() -> f64 {
    3.0
}

fn default_baseline_buckets() -> usize {
    3
}

fn default_baseline_ramp_pct() -> f64 {
    10.0
}

fn default_latency_degrade_pct() -> f64 {
    25.0
}

fn default_error_rate_degrade_abs() -> f64 {
    0.05
}

fn default_throughput_plateau_pct() -> f64 {
    5.0
}

fn default_cpu_high_pct() -> f64 {
    80.0
}

fn default_memory_high_pct() -> f64 {
    85.0
}

fn default_raw_metric_degrade_pct() -> f64 {
    50.0
}

fn default_capacity_trend_pct() -> f64 {
    30.0
}

fn default_max_malformed_ratio() -> f64 {
    0.5
}

fn default_pct_points_degrade() -> f64 {
    10.0
}

fn default_max_buckets() -> usize {
    100_000
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bucket_seconds: default_bucket_seconds(),
            warmup_buckets: default_warmup_buckets(),
            sustained_buckets: default_sustained_buckets(),
            persistence_ratio: default_persistence_ratio(),
            rolling_window_buckets: default_rolling_window_buckets(),
            outlier_mad_k: default_outlier_mad_k(),
            baseline_buckets: default_baseline_buckets(),
            baseline_ramp_pct: default_baseline_ramp_pct(),
            latency_degrade_pct: default_latency_degrade_pct(),
            error_rate_degrade_abs: default_error_rate_degrade_abs(),
            throughput_plateau_pct: default_throughput_plateau_pct(),
            cpu_high_pct: default_cpu_high_pct(),
            memory_high_pct: default_memory_high_pct(),
            raw_metric_degrade_pct: default_raw_metric_degrade_pct(),
            pct_points_degrade: default_pct_points_degrade(),
            capacity_trend_pct: default_capacity_trend_pct(),
            max_malformed_ratio: default_max_malformed_ratio(),
            max_buckets: default_max_buckets(),
            baseline_run_id: None,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from an optional file and `LOADSCOPE_*` environment
    ///
    /// The file format is inferred from its extension (toml, json, yaml).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let loaded: AnalysisConfig = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values that would make the pipeline meaningless
    pub fn validate(&self) -> Result<()> {
        if self.bucket_seconds == 0 {
            return Err(invalid("bucket_seconds must be greater than zero"));
        }
        if self.sustained_buckets == 0 {
            return Err(invalid("sustained_buckets must be at least 1"));
        }
        if !(self.persistence_ratio > 0.0 && self.persistence_ratio <= 1.0) {
            return Err(invalid("persistence_ratio must be in (0, 1]"));
        }
        if self.rolling_window_buckets == 0 || self.rolling_window_buckets % 2 == 0 {
            return Err(invalid("rolling_window_buckets must be a positive odd number"));
        }
        if self.outlier_mad_k <= 0.0 {
            return Err(invalid("outlier_mad_k must be positive"));
        }
        if self.baseline_buckets == 0 {
            return Err(invalid("baseline_buckets must be at least 1"));
        }
        if self.latency_degrade_pct <= 0.0 {
            return Err(invalid("latency_degrade_pct must be positive"));
        }
        if !(self.error_rate_degrade_abs > 0.0 && self.error_rate_degrade_abs <= 1.0) {
            return Err(invalid("error_rate_degrade_abs must be in (0, 1]"));
        }
        if self.throughput_plateau_pct <= 0.0 {
            return Err(invalid("throughput_plateau_pct must be positive"));
        }
        for (name, value) in [
            ("cpu_high_pct", self.cpu_high_pct),
            ("memory_high_pct", self.memory_high_pct),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(invalid(&format!("{} must be in (0, 100]", name)));
            }
        }
        if self.raw_metric_degrade_pct <= 0.0 || self.capacity_trend_pct <= 0.0 {
            return Err(invalid(
                "raw_metric_degrade_pct and capacity_trend_pct must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.max_malformed_ratio) {
            return Err(invalid("max_malformed_ratio must be in [0, 1]"));
        }
        if !(0.0..=100.0).contains(&self.pct_points_degrade) {
            return Err(invalid("pct_points_degrade must be in [0, 100]"));
        }
        if self.max_buckets == 0 {
            return Err(invalid("max_buckets must be greater than zero"));
        }
        Ok(())
    }

    /// Bucket width in milliseconds
    pub fn bucket_width_ms(&self) -> i64 {
        self.bucket_seconds as i64 * 1000
    }
}

fn invalid(message: &str) -> AnalysisError {
    AnalysisError::InvalidConfig(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bucket_seconds, 60);
        assert_eq!(config.persistence_ratio, 0.6);
        assert_eq!(config.rolling_window_buckets, 3);
        assert_eq!(config.bucket_width_ms(), 60_000);
    }

    #[test]
    fn test_rejects_even_window() {
        let config = AnalysisConfig {
            rolling_window_buckets: 4,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_bad_persistence_ratio() {
        let config = AnalysisConfig {
            persistence_ratio: 1.5,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AnalysisConfig {
            persistence_ratio: 0.0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_max_buckets() {
        let config = AnalysisConfig {
            max_buckets: 0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "bucket_seconds = 30\nlatency_degrade_pct = 40.0\nbaseline_run_id = \"run-7\""
        )
        .unwrap();

        let config = AnalysisConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.bucket_seconds, 30);
        assert_eq!(config.latency_degrade_pct, 40.0);
        assert_eq!(config.baseline_run_id.as_deref(), Some("run-7"));
        // Untouched keys keep their defaults
        assert_eq!(config.warmup_buckets, 1);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "bucket_seconds = 0").unwrap();
        assert!(AnalysisConfig::load(Some(file.path())).is_err());
    }
}
