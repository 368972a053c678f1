//! Load test bottleneck detection and classification
//!
//! This crate provides the core functionality for:
//! - Ingesting request-level results and infrastructure utilization tables
//! - Time bucketing with warmup exclusion and rolling MAD outlier filtering
//! - Baseline estimation and degradation onset detection per scope
//! - Persistence validation and severity scoring
//! - Infrastructure correlation and capacity risk scanning
//! - Baseline snapshots, metrics and structured logging

pub mod aggregate;
pub mod baseline;
pub mod bucket;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod infra;
pub mod ingest;
pub mod models;
pub mod observability;
pub mod sla;
pub mod stats;

pub use baseline::{Baseline, BaselineSnapshot, BaselineSource, BaselineStore};
pub use bucket::{BucketGrid, BucketMetrics, TimeBucket};
pub use config::AnalysisConfig;
pub use engine::{AnalysisEngine, AnalysisInput};
pub use error::{AnalysisError, Result};
pub use models::*;
pub use observability::{AnalyzerMetrics, StructuredLogger};
pub use sla::{PercentileUnit, SlaResolver, SlaTable, SlaThreshold};
