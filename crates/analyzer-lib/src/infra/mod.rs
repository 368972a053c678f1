//! Infrastructure utilization timeline and Phase 2 analysis
//!
//! Infra rows are bucketed on the same grid as the request samples, one
//! series per entity. The metric mode decides the units: utilization
//! percentages when limits are defined, raw cores and GB otherwise.

mod capacity;
mod correlator;

pub use capacity::CapacityScanner;
pub use correlator::InfraCorrelator;

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::bucket::BucketGrid;
use crate::models::{InfraSample, MetricKind, MetricMode, ResourceSnapshot};

/// Percentages at or below this are treated as "limits not defined"
pub const PCT_ZERO_EPSILON: f64 = 0.01;

const MB_PER_GB: f64 = 1024.0;

/// CPU utilization in percent, derived from usage and limit when absent
pub fn effective_cpu_pct(sample: &InfraSample) -> Option<f64> {
    sample
        .cpu_pct
        .or_else(|| derive_pct(sample.cpu_cores, sample.cpu_limit_cores))
}

/// Memory utilization in percent, derived from usage and limit when absent
pub fn effective_memory_pct(sample: &InfraSample) -> Option<f64> {
    sample
        .memory_pct
        .or_else(|| derive_pct(sample.memory_mb, sample.memory_limit_mb))
}

fn derive_pct(usage: Option<f64>, limit: Option<f64>) -> Option<f64> {
    match (usage, limit) {
        (Some(usage), Some(limit)) if limit > 0.0 => Some(usage / limit * 100.0),
        _ => None,
    }
}

/// Pick the units for Phase 2
///
/// Percentages win when any of them is materially above zero. Uniformly
/// zero percentages mean the limits were never set upstream, so raw usage
/// is used instead. `None` when the table holds no usable columns at all.
pub fn detect_metric_mode(samples: &[InfraSample]) -> Option<MetricMode> {
    let has_pct = samples.iter().any(|s| {
        effective_cpu_pct(s).is_some_and(|v| v > PCT_ZERO_EPSILON)
            || effective_memory_pct(s).is_some_and(|v| v > PCT_ZERO_EPSILON)
    });
    if has_pct {
        return Some(MetricMode::Pct);
    }
    let has_raw = samples
        .iter()
        .any(|s| s.cpu_cores.is_some() || s.memory_mb.is_some());
    has_raw.then_some(MetricMode::Raw)
}

/// Bucket-level utilization of one entity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InfraPoint {
    pub cpu: Option<f64>,
    pub cpu_max: Option<f64>,
    pub memory: Option<f64>,
    pub memory_max: Option<f64>,
}

impl InfraPoint {
    /// Bucket average for `Cpu` or `Memory`
    pub fn get(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::Cpu => self.cpu,
            MetricKind::Memory => self.memory,
            _ => None,
        }
    }
}

/// Bucketed series of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySeries {
    pub limits_available: bool,
    /// One slot per grid bucket; `None` where the entity reported nothing
    pub points: Vec<Option<InfraPoint>>,
}

impl EntitySeries {
    /// Bucket averages of one resource, aligned to the grid
    pub fn values(&self, kind: MetricKind) -> Vec<Option<f64>> {
        self.points
            .iter()
            .map(|p| p.and_then(|p| p.get(kind)))
            .collect()
    }
}

#[derive(Debug, Default)]
struct PointCell {
    cpu: Vec<f64>,
    memory: Vec<f64>,
}

/// Per-entity infra series on the shared bucket grid
#[derive(Debug, Clone, PartialEq)]
pub struct InfraTimeline {
    pub mode: MetricMode,
    pub entities: BTreeMap<String, EntitySeries>,
}

impl InfraTimeline {
    /// Bucket infra rows; `None` when the table has no usable columns
    pub fn build(grid: &BucketGrid, samples: &[InfraSample]) -> Option<Self> {
        let mode = detect_metric_mode(samples)?;

        let mut cells: BTreeMap<String, (bool, Vec<PointCell>)> = BTreeMap::new();
        for sample in samples {
            let Some(index) = grid.index_of(sample.timestamp_ms) else {
                continue;
            };
            let (limits, entity) = cells.entry(sample.entity.clone()).or_insert_with(|| {
                (false, (0..grid.count).map(|_| PointCell::default()).collect())
            });
            *limits |= has_limits(sample);

            let (cpu, memory) = match mode {
                MetricMode::Pct => (effective_cpu_pct(sample), effective_memory_pct(sample)),
                MetricMode::Raw => (sample.cpu_cores, sample.memory_mb.map(|mb| mb / MB_PER_GB)),
            };
            let cell = &mut entity[index];
            cell.cpu.extend(cpu);
            cell.memory.extend(memory);
        }

        let entities = cells
            .into_iter()
            .map(|(name, (limits_available, cells))| {
                let points = cells.into_iter().map(PointCell::finish).collect();
                (
                    name,
                    EntitySeries {
                        limits_available: limits_available || mode == MetricMode::Pct,
                        points,
                    },
                )
            })
            .collect();

        Some(Self { mode, entities })
    }

    /// Average and peak utilization of `entity` over a bucket range
    pub fn snapshot(&self, entity: &str, range: RangeInclusive<usize>) -> ResourceSnapshot {
        let Some(series) = self.entities.get(entity) else {
            return ResourceSnapshot::default();
        };
        let points: Vec<Option<InfraPoint>> = range
            .filter_map(|i| series.points.get(i).copied())
            .collect();
        let present: Vec<InfraPoint> = points.iter().flatten().copied().collect();

        let avg = |f: fn(&InfraPoint) -> Option<f64>| {
            let values: Vec<f64> = present.iter().filter_map(f).collect();
            crate::stats::mean(&values)
        };
        let max = |f: fn(&InfraPoint) -> Option<f64>| {
            present.iter().filter_map(f).reduce(f64::max)
        };

        ResourceSnapshot {
            avg_cpu: avg(|p| p.cpu),
            max_cpu: max(|p| p.cpu_max),
            avg_memory: avg(|p| p.memory),
            max_memory: max(|p| p.memory_max),
            buckets_with_data: present.len(),
            buckets_in_window: points.len(),
        }
    }
}

impl PointCell {
    fn finish(self) -> Option<InfraPoint> {
        if self.cpu.is_empty() && self.memory.is_empty() {
            return None;
        }
        Some(InfraPoint {
            cpu: crate::stats::mean(&self.cpu),
            cpu_max: self.cpu.iter().copied().reduce(f64::max),
            memory: crate::stats::mean(&self.memory),
            memory_max: self.memory.iter().copied().reduce(f64::max),
        })
    }
}

fn has_limits(sample: &InfraSample) -> bool {
    sample.cpu_limit_cores.is_some_and(|v| v > 0.0)
        || sample.memory_limit_mb.is_some_and(|v| v > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ts: i64, entity: &str) -> InfraSample {
        InfraSample {
            timestamp_ms: ts,
            entity: entity.to_string(),
            ..InfraSample::default()
        }
    }

    #[test]
    fn test_zero_pct_falls_back_to_raw() {
        let samples = vec![
            InfraSample {
                cpu_pct: Some(0.0),
                memory_pct: Some(0.0),
                cpu_cores: Some(0.1),
                memory_mb: Some(512.0),
                ..row(0, "api")
            },
            InfraSample {
                cpu_pct: Some(0.0),
                cpu_cores: Some(0.2),
                ..row(60_000, "api")
            },
        ];
        assert_eq!(detect_metric_mode(&samples), Some(MetricMode::Raw));
    }

    #[test]
    fn test_pct_mode_and_derived_pct() {
        let derived = InfraSample {
            cpu_cores: Some(0.5),
            cpu_limit_cores: Some(2.0),
            ..row(0, "api")
        };
        assert_eq!(effective_cpu_pct(&derived), Some(25.0));
        assert_eq!(detect_metric_mode(&[derived]), Some(MetricMode::Pct));
        assert_eq!(detect_metric_mode(&[row(0, "api")]), None);
    }

    #[test]
    fn test_timeline_buckets_per_entity() {
        let grid = BucketGrid::covering(0, 179_999, 60_000);
        let samples = vec![
            InfraSample {
                cpu_cores: Some(0.1),
                memory_mb: Some(1024.0),
                ..row(0, "api")
            },
            InfraSample {
                cpu_cores: Some(0.3),
                memory_mb: Some(2048.0),
                ..row(30_000, "api")
            },
            InfraSample {
                cpu_cores: Some(1.0),
                ..row(150_000, "db")
            },
        ];
        let timeline = InfraTimeline::build(&grid, &samples).unwrap();
        assert_eq!(timeline.mode, MetricMode::Raw);
        assert_eq!(timeline.entities.len(), 2);

        let api = &timeline.entities["api"];
        assert!(!api.limits_available);
        let first = api.points[0].unwrap();
        assert!((first.cpu.unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(first.cpu_max, Some(0.3));
        assert!((first.memory.unwrap() - 1.5).abs() < 1e-9);
        assert!(api.points[1].is_none());

        let snapshot = timeline.snapshot("api", 0..=2);
        assert_eq!(snapshot.buckets_with_data, 1);
        assert_eq!(snapshot.buckets_in_window, 3);
        assert!((snapshot.coverage() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(timeline.snapshot("missing", 0..=2), ResourceSnapshot::default());
    }
}
