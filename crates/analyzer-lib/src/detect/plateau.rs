//! Throughput plateau detection over concurrency levels
//!
//! Usable buckets are grouped into runs of equal concurrency. Each level is
//! compared with the last level where throughput still scaled, so a slow
//! ramp accumulates into a material step. A material rise in concurrency
//! that does not buy a matching throughput gain is a saturation onset.

use crate::bucket::TimeBucket;
use crate::models::MetricKind;
use crate::stats::{self, EPSILON};

/// Consecutive usable buckets sharing one concurrency value
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyLevel {
    pub concurrency: u32,
    /// Positions in the usable-index slice the levels were built from
    pub positions: Vec<usize>,
    pub mean_throughput: f64,
}

/// A concurrency step where throughput failed to keep up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateauStep {
    /// Position of the first bucket of the new level
    pub onset_pos: usize,
    pub previous_throughput: f64,
    pub level_throughput: f64,
    pub concurrency_rise_pct: f64,
    pub throughput_growth_pct: f64,
}

pub fn concurrency_levels(buckets: &[TimeBucket], usable: &[usize]) -> Vec<ConcurrencyLevel> {
    let mut levels: Vec<ConcurrencyLevel> = Vec::new();
    for (pos, &index) in usable.iter().enumerate() {
        let concurrency = buckets[index].concurrency;
        match levels.last_mut() {
            Some(level) if level.concurrency == concurrency => level.positions.push(pos),
            _ => levels.push(ConcurrencyLevel {
                concurrency,
                positions: vec![pos],
                mean_throughput: 0.0,
            }),
        }
    }

    for level in &mut levels {
        let throughput: Vec<f64> = level
            .positions
            .iter()
            .filter_map(|&pos| buckets[usable[pos]].value(MetricKind::Throughput))
            .collect();
        level.mean_throughput = stats::mean(&throughput).unwrap_or(0.0);
    }
    levels
}

/// Steps where concurrency rose by at least `plateau_pct` over the last
/// scaling level but throughput grew less than `plateau_pct`
pub fn plateau_steps(levels: &[ConcurrencyLevel], plateau_pct: f64) -> Vec<PlateauStep> {
    let mut steps = Vec::new();
    let Some(mut anchor) = levels.first() else {
        return steps;
    };

    for level in &levels[1..] {
        if level.concurrency <= anchor.concurrency
            || anchor.concurrency == 0
            || anchor.mean_throughput < EPSILON
        {
            anchor = level;
            continue;
        }
        let concurrency_rise_pct = stats::pct_change(level.concurrency as f64, anchor.concurrency as f64);
        let throughput_growth_pct = stats::pct_change(level.mean_throughput, anchor.mean_throughput);
        if throughput_growth_pct >= plateau_pct {
            anchor = level;
        } else if concurrency_rise_pct >= plateau_pct {
            steps.push(PlateauStep {
                onset_pos: level.positions[0],
                previous_throughput: anchor.mean_throughput,
                level_throughput: level.mean_throughput,
                concurrency_rise_pct,
                throughput_growth_pct,
            });
        }
    }
    steps
}

/// Excess ratio used for the severity magnitude of a plateau
pub fn plateau_excess(growth_pct: f64, plateau_pct: f64) -> f64 {
    1.0 + (plateau_pct - growth_pct) / plateau_pct
}
