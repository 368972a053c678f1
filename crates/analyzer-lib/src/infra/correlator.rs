//! Phase 2a: infrastructure correlation for validated bottlenecks

use tracing::debug;

use crate::baseline::Baseline;
use crate::config::AnalysisConfig;
use crate::models::{
    Finding, InfraContext, InfraVerdict, InfrastructureWindow, MetricMode, ResourceSnapshot,
};
use crate::stats;

use super::InfraTimeline;

/// Minimum share of a window that must carry infra data
const MIN_WINDOW_COVERAGE: f64 = 0.5;

/// Compares each entity's utilization before and after a bottleneck onset
#[derive(Debug, Clone)]
pub struct InfraCorrelator<'a> {
    config: &'a AnalysisConfig,
    timeline: Option<&'a InfraTimeline>,
}

impl<'a> InfraCorrelator<'a> {
    pub fn new(config: &'a AnalysisConfig, timeline: Option<&'a InfraTimeline>) -> Self {
        Self { config, timeline }
    }

    /// Build the infra context of a bottleneck finding
    ///
    /// The reference window is the scope's baseline window; the degradation
    /// window runs from the onset to `last_index`.
    pub fn correlate(&self, finding: &Finding, baseline: &Baseline, last_index: usize) -> InfraContext {
        let Some(timeline) = self.timeline else {
            return InfraContext {
                verdict: InfraVerdict::Inconclusive,
                metric_mode: None,
                windows: Vec::new(),
            };
        };

        let baseline_range = baseline.window_start_index..=baseline.window_end_index;
        let degradation_range = finding.onset_bucket_index..=last_index.max(finding.onset_bucket_index);

        let mut conclusive = 0;
        let mut correlated = 0;
        let windows: Vec<InfrastructureWindow> = timeline
            .entities
            .iter()
            .map(|(entity, series)| {
                let baseline_window = timeline.snapshot(entity, baseline_range.clone());
                let degradation_window = timeline.snapshot(entity, degradation_range.clone());
                let window = InfrastructureWindow {
                    entity: entity.clone(),
                    metric_mode: timeline.mode,
                    limits_available: series.limits_available,
                    cpu_delta_pct: delta(baseline_window.avg_cpu, degradation_window.avg_cpu),
                    memory_delta_pct: delta(baseline_window.avg_memory, degradation_window.avg_memory),
                    baseline_window,
                    degradation_window,
                };
                if is_conclusive(&window) {
                    conclusive += 1;
                    if self.is_correlated(&window) {
                        correlated += 1;
                    }
                }
                window
            })
            .collect();

        let verdict = if conclusive == 0 {
            InfraVerdict::Inconclusive
        } else if correlated > 0 {
            InfraVerdict::InfrastructureCorrelated
        } else {
            InfraVerdict::InfrastructureIndependent
        };
        debug!(
            scope = %finding.scope_name,
            onset = finding.onset_bucket_index,
            entities = windows.len(),
            conclusive,
            correlated,
            verdict = %verdict,
            "Bottleneck correlated with infrastructure"
        );

        InfraContext {
            verdict,
            metric_mode: Some(timeline.mode),
            windows,
        }
    }

    /// Raw mode: a relative rise of `raw_metric_degrade_pct`. Pct mode: the
    /// degradation window reaches the high threshold, or the relative rise
    /// also adds at least `pct_points_degrade` points.
    fn is_correlated(&self, window: &InfrastructureWindow) -> bool {
        let material = self.config.raw_metric_degrade_pct;
        let (before, after) = (&window.baseline_window, &window.degradation_window);
        let rises = [
            (window.cpu_delta_pct, points(before.avg_cpu, after.avg_cpu)),
            (window.memory_delta_pct, points(before.avg_memory, after.avg_memory)),
        ];
        match window.metric_mode {
            MetricMode::Raw => rises.iter().any(|(delta, _)| delta.is_some_and(|d| d >= material)),
            MetricMode::Pct => {
                self.reaches_high(after)
                    || rises.iter().any(|&(delta, points)| {
                        delta.is_some_and(|d| d >= material)
                            && points.is_some_and(|p| p >= self.config.pct_points_degrade)
                    })
            }
        }
    }

    fn reaches_high(&self, snapshot: &ResourceSnapshot) -> bool {
        snapshot.avg_cpu.is_some_and(|v| v >= self.config.cpu_high_pct)
            || snapshot
                .avg_memory
                .is_some_and(|v| v >= self.config.memory_high_pct)
    }
}

fn delta(baseline: Option<f64>, degraded: Option<f64>) -> Option<f64> {
    Some(stats::pct_change(degraded?, baseline?))
}

fn points(baseline: Option<f64>, degraded: Option<f64>) -> Option<f64> {
    Some(degraded? - baseline?)
}

fn is_conclusive(window: &InfrastructureWindow) -> bool {
    window.baseline_window.coverage() >= MIN_WINDOW_COVERAGE
        && window.degradation_window.coverage() >= MIN_WINDOW_COVERAGE
}
