//! Time bucketing of request samples
//!
//! Samples are grouped into fixed-width windows on a grid anchored at the
//! earliest sample. Every bucket between the first and last sample exists,
//! including empty ones, so the timeline has no gaps. The outlier filter runs
//! as the last step; buckets are not modified afterwards.

mod outlier;

pub use outlier::OutlierFilter;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::models::{MetricKind, Sample};
use crate::stats;

/// Aggregate statistics for one bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketMetrics {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub avg_rt: f64,
    pub error_rate: f64,
    /// Requests per second
    pub throughput: f64,
}

impl BucketMetrics {
    /// Read one series; infrastructure kinds are not held here
    pub fn get(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::P50 => Some(self.p50),
            MetricKind::P90 => Some(self.p90),
            MetricKind::P95 => Some(self.p95),
            MetricKind::AvgRt => Some(self.avg_rt),
            MetricKind::ErrorRate => Some(self.error_rate),
            MetricKind::Throughput => Some(self.throughput),
            MetricKind::Cpu | MetricKind::Memory => None,
        }
    }

    pub fn set(&mut self, kind: MetricKind, value: f64) {
        match kind {
            MetricKind::P50 => self.p50 = value,
            MetricKind::P90 => self.p90 = value,
            MetricKind::P95 => self.p95 = value,
            MetricKind::AvgRt => self.avg_rt = value,
            MetricKind::ErrorRate => self.error_rate = value,
            MetricKind::Throughput => self.throughput = value,
            MetricKind::Cpu | MetricKind::Memory => {}
        }
    }
}

/// One fixed-width window of the timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub index: usize,
    /// Inclusive start, epoch milliseconds
    pub start_ts: i64,
    /// Exclusive end, epoch milliseconds
    pub end_ts: i64,
    /// Peak concurrency observed in the bucket
    pub concurrency: u32,
    pub sample_count: usize,
    pub error_count: usize,
    /// Metrics computed from the bucket's own samples
    pub raw: Option<BucketMetrics>,
    /// Metrics used by the detectors
    pub smoothed: Option<BucketMetrics>,
    pub is_outlier: bool,
    /// Series that individually tripped the outlier rule
    pub outlier_metrics: Vec<MetricKind>,
    pub is_warmup: bool,
    pub is_empty: bool,
}

impl TimeBucket {
    /// Post-warmup, non-empty and not an outlier
    pub fn is_usable(&self) -> bool {
        !self.is_warmup && !self.is_outlier && !self.is_empty
    }

    /// Smoothed value of a series
    pub fn value(&self, kind: MetricKind) -> Option<f64> {
        self.smoothed.and_then(|m| m.get(kind))
    }
}

/// Indices of usable buckets, in timeline order
pub fn usable_indices(buckets: &[TimeBucket]) -> Vec<usize> {
    buckets
        .iter()
        .filter(|b| b.is_usable())
        .map(|b| b.index)
        .collect()
}

/// Fixed bucket layout shared by every scope of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketGrid {
    pub origin_ms: i64,
    pub width_ms: i64,
    pub count: usize,
}

impl BucketGrid {
    /// Grid covering `[min(timestamp), max(timestamp)]`
    pub fn from_samples(samples: &[Sample], width_ms: i64) -> Option<Self> {
        let min = samples.iter().map(|s| s.timestamp_ms).min()?;
        let max = samples.iter().map(|s| s.timestamp_ms).max()?;
        Some(Self::covering(min, max, width_ms))
    }

    /// Spans wider than `i64` saturate; callers cap `count` before allocating
    pub fn covering(min_ts: i64, max_ts: i64, width_ms: i64) -> Self {
        let width_ms = width_ms.max(1);
        let span = max_ts.checked_sub(min_ts).map_or(i64::MAX, |span| span.max(0));
        let count = usize::try_from(span / width_ms)
            .unwrap_or(usize::MAX)
            .saturating_add(1);
        Self {
            origin_ms: min_ts,
            width_ms,
            count,
        }
    }

    /// Bucket holding `timestamp_ms`, if it falls on the grid
    pub fn index_of(&self, timestamp_ms: i64) -> Option<usize> {
        if timestamp_ms < self.origin_ms {
            return None;
        }
        let index = usize::try_from(timestamp_ms.checked_sub(self.origin_ms)? / self.width_ms).ok()?;
        (index < self.count).then_some(index)
    }

    pub fn start_of(&self, index: usize) -> i64 {
        self.origin_ms + index as i64 * self.width_ms
    }

    pub fn end_of(&self, index: usize) -> i64 {
        self.start_of(index) + self.width_ms
    }

    pub fn last_index(&self) -> usize {
        self.count.saturating_sub(1)
    }
}

#[derive(Debug, Default)]
struct BucketCell {
    elapsed: Vec<f64>,
    errors: usize,
    max_concurrency: u32,
}

/// Incremental per-bucket accumulation
///
/// Only per-bucket elapsed values are retained, so samples can be pushed
/// straight from a reader without holding the whole result table.
#[derive(Debug)]
pub struct BucketAccumulator {
    grid: BucketGrid,
    cells: Vec<BucketCell>,
    dropped: usize,
}

impl BucketAccumulator {
    pub fn new(grid: BucketGrid) -> Self {
        let cells = (0..grid.count).map(|_| BucketCell::default()).collect();
        Self {
            grid,
            cells,
            dropped: 0,
        }
    }

    /// Add one sample; returns false when it lies outside the grid
    pub fn push(&mut self, sample: &Sample) -> bool {
        let Some(index) = self.grid.index_of(sample.timestamp_ms) else {
            self.dropped += 1;
            return false;
        };
        let cell = &mut self.cells[index];
        cell.elapsed.push(sample.elapsed_ms);
        if !sample.success {
            cell.errors += 1;
        }
        cell.max_concurrency = cell.max_concurrency.max(sample.concurrency);
        true
    }

    /// Samples rejected for falling outside the grid
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Compute raw bucket metrics; smoothed values start equal to raw
    pub fn finish(self, warmup_buckets: usize) -> Vec<TimeBucket> {
        let width_secs = self.grid.width_ms as f64 / 1000.0;
        let mut last_concurrency = 0;
        let grid = self.grid;

        self.cells
            .into_iter()
            .enumerate()
            .map(|(index, mut cell)| {
                let is_empty = cell.elapsed.is_empty();
                let raw = if is_empty {
                    None
                } else {
                    cell.elapsed
                        .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                    let count = cell.elapsed.len() as f64;
                    last_concurrency = cell.max_concurrency;
                    Some(BucketMetrics {
                        p50: stats::percentile_sorted(&cell.elapsed, 50.0),
                        p90: stats::percentile_sorted(&cell.elapsed, 90.0),
                        p95: stats::percentile_sorted(&cell.elapsed, 95.0),
                        avg_rt: cell.elapsed.iter().sum::<f64>() / count,
                        error_rate: cell.errors as f64 / count,
                        throughput: count / width_secs,
                    })
                };

                TimeBucket {
                    index,
                    start_ts: grid.start_of(index),
                    end_ts: grid.end_of(index),
                    concurrency: last_concurrency,
                    sample_count: cell.elapsed.len(),
                    error_count: cell.errors,
                    raw,
                    smoothed: raw,
                    is_outlier: false,
                    outlier_metrics: Vec::new(),
                    is_warmup: index < warmup_buckets,
                    is_empty,
                }
            })
            .collect()
    }
}

/// Builds filtered bucket timelines from samples
#[derive(Debug, Clone)]
pub struct Bucketizer {
    warmup_buckets: usize,
    filter: OutlierFilter,
}

impl Bucketizer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            warmup_buckets: config.warmup_buckets,
            filter: OutlierFilter::new(config.rolling_window_buckets, config.outlier_mad_k),
        }
    }

    /// Bucket and outlier-filter one sample stream on `grid`
    pub fn bucketize<'a>(
        &self,
        grid: BucketGrid,
        samples: impl IntoIterator<Item = &'a Sample>,
    ) -> Vec<TimeBucket> {
        let mut accumulator = BucketAccumulator::new(grid);
        for sample in samples {
            accumulator.push(sample);
        }
        if accumulator.dropped() > 0 {
            tracing::debug!(
                dropped = accumulator.dropped(),
                "Samples outside the bucket grid ignored"
            );
        }
        self.filter.apply(accumulator.finish(self.warmup_buckets))
    }

    /// Separate timelines per label, all on the shared grid
    pub fn bucketize_by_label(
        &self,
        grid: BucketGrid,
        samples: &[Sample],
    ) -> BTreeMap<String, Vec<TimeBucket>> {
        group_by_label(samples)
            .into_iter()
            .map(|(label, group)| {
                let buckets = self.bucketize(grid, group);
                (label, buckets)
            })
            .collect()
    }
}

/// Samples grouped by label, labels in sorted order
pub fn group_by_label(samples: &[Sample]) -> BTreeMap<String, Vec<&Sample>> {
    let mut groups: BTreeMap<String, Vec<&Sample>> = BTreeMap::new();
    for sample in samples {
        groups.entry(sample.label.clone()).or_default().push(sample);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: i64, elapsed: f64, success: bool, concurrency: u32) -> Sample {
        Sample {
            timestamp_ms: ts,
            elapsed_ms: elapsed,
            label: "home".to_string(),
            success,
            response_code: if success { "200" } else { "500" }.to_string(),
            concurrency,
        }
    }

    #[test]
    fn test_grid_covers_range() {
        let grid = BucketGrid::covering(1_000, 180_999, 60_000);
        assert_eq!(grid.count, 4);
        assert_eq!(grid.index_of(1_000), Some(0));
        assert_eq!(grid.index_of(61_000), Some(1));
        assert_eq!(grid.index_of(180_999), Some(3));
        assert_eq!(grid.index_of(999), None);
        assert_eq!(grid.index_of(241_000), None);
        assert_eq!(grid.start_of(2), 121_000);
        assert_eq!(grid.end_of(2), 181_000);
    }

    #[test]
    fn test_grid_extreme_span_saturates() {
        let grid = BucketGrid::covering(i64::MIN, i64::MAX, 1);
        assert_eq!(grid.count, usize::try_from(i64::MAX).unwrap() + 1);
        assert_eq!(grid.index_of(i64::MAX), None);

        // one stray zero timestamp stretches the grid across decades
        let grid = BucketGrid::covering(0, 1_700_000_060_000, 60_000);
        assert_eq!(grid.count, 28_333_335);
    }

    #[test]
    fn test_bucket_metrics() {
        let grid = BucketGrid::covering(0, 59_999, 60_000);
        let mut acc = BucketAccumulator::new(grid);
        for (i, elapsed) in [100.0, 200.0, 300.0, 400.0, 500.0].iter().enumerate() {
            acc.push(&sample(i as i64 * 1000, *elapsed, i != 4, 10 + i as u32));
        }
        let buckets = acc.finish(0);
        assert_eq!(buckets.len(), 1);
        let raw = buckets[0].raw.unwrap();
        assert_eq!(raw.p50, 300.0);
        // rank 3.6 -> 400 + 0.6 * 100
        assert!((raw.p90 - 460.0).abs() < 1e-9);
        assert_eq!(raw.avg_rt, 300.0);
        assert!((raw.error_rate - 0.2).abs() < 1e-9);
        assert!((raw.throughput - 5.0 / 60.0).abs() < 1e-9);
        assert_eq!(buckets[0].concurrency, 14);
    }

    #[test]
    fn test_empty_buckets_fill_gaps() {
        let samples = vec![
            sample(0, 100.0, true, 5),
            sample(150_000, 120.0, true, 8),
        ];
        let grid = BucketGrid::from_samples(&samples, 60_000).unwrap();
        let mut acc = BucketAccumulator::new(grid);
        for s in &samples {
            acc.push(s);
        }
        let buckets = acc.finish(1);
        assert_eq!(buckets.len(), 3);
        assert!(buckets[0].is_warmup);
        assert!(buckets[1].is_empty);
        assert!(!buckets[1].is_outlier);
        assert!(buckets[1].raw.is_none());
        // concurrency carries forward across the gap
        assert_eq!(buckets[1].concurrency, 5);
        assert_eq!(buckets[2].concurrency, 8);
        assert!(buckets[2].is_usable());
        assert!(!buckets[1].is_usable());
    }

    #[test]
    fn test_bucketize_by_label_shares_grid() {
        let mut samples = vec![sample(0, 100.0, true, 1), sample(130_000, 100.0, true, 1)];
        samples.push(Sample {
            label: "search".to_string(),
            ..sample(70_000, 300.0, true, 1)
        });
        let config = AnalysisConfig::default();
        let grid = BucketGrid::from_samples(&samples, config.bucket_width_ms()).unwrap();
        let by_label = Bucketizer::new(&config).bucketize_by_label(grid, &samples);

        assert_eq!(by_label.len(), 2);
        for buckets in by_label.values() {
            assert_eq!(buckets.len(), grid.count);
        }
        let search = &by_label["search"];
        assert!(search[0].is_empty);
        assert_eq!(search[1].sample_count, 1);
    }

    #[test]
    fn test_samples_outside_grid_dropped() {
        let grid = BucketGrid::covering(10_000, 20_000, 60_000);
        let mut acc = BucketAccumulator::new(grid);
        assert!(!acc.push(&sample(5_000, 1.0, true, 1)));
        assert!(acc.push(&sample(10_000, 1.0, true, 1)));
        assert_eq!(acc.dropped(), 1);
    }
}
