//! Composite severity scoring
//!
//! Score = magnitude (0-3) + persistence (0-3) + scope (0-1).

use crate::config::AnalysisConfig;
use crate::models::{Classification, Scope, Severity};

#[derive(Debug, Clone, Copy)]
pub struct SeverityScorer {
    persistence_ratio: f64,
}

impl SeverityScorer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            persistence_ratio: config.persistence_ratio,
        }
    }

    /// `excess_ratio` is the observed delta divided by the configured threshold
    pub fn magnitude_score(excess_ratio: f64) -> u8 {
        match excess_ratio {
            r if r >= 4.0 => 3,
            r if r >= 2.0 => 2,
            r if r >= 1.0 => 1,
            _ => 0,
        }
    }

    pub fn persistence_score(&self, persisted: f64) -> u8 {
        match persisted {
            p if p >= 0.9 => 3,
            p if p >= 0.75 => 2,
            p if p >= self.persistence_ratio => 1,
            _ => 0,
        }
    }

    pub fn scope_score(scope: &Scope) -> u8 {
        u8::from(scope.is_overall())
    }

    pub fn score(&self, excess_ratio: f64, persisted: f64, scope: &Scope) -> u8 {
        Self::magnitude_score(excess_ratio) + self.persistence_score(persisted) + Self::scope_score(scope)
    }

    /// Severity and score for a validated onset; transient spikes are always low
    pub fn assess(
        &self,
        classification: Classification,
        excess_ratio: f64,
        persisted: f64,
        scope: &Scope,
    ) -> (Severity, u8) {
        let score = self.score(excess_ratio, persisted, scope);
        let severity = if classification == Classification::TransientSpike {
            Severity::Low
        } else {
            Severity::from_score(score)
        };
        (severity, score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maximum_score_is_critical() {
        let scorer = SeverityScorer::new(&AnalysisConfig::default());
        // +125% against a 25% threshold, fully persisted, overall scope
        let (severity, score) =
            scorer.assess(Classification::Bottleneck, 5.0, 1.0, &Scope::overall());
        assert_eq!(score, 7);
        assert_eq!(severity, Severity::Critical);
    }

    #[test]
    fn test_endpoint_scope_scores_lower() {
        let scorer = SeverityScorer::new(&AnalysisConfig::default());
        let (severity, score) =
            scorer.assess(Classification::Bottleneck, 1.2, 0.65, &Scope::endpoint("login"));
        assert_eq!(score, 2);
        assert_eq!(severity, Severity::Low);

        let (severity, score) =
            scorer.assess(Classification::Bottleneck, 2.5, 0.8, &Scope::endpoint("login"));
        assert_eq!(score, 4);
        assert_eq!(severity, Severity::Medium);
    }

    #[test]
    fn test_transient_forced_low() {
        let scorer = SeverityScorer::new(&AnalysisConfig::default());
        let (severity, score) =
            scorer.assess(Classification::TransientSpike, 10.0, 0.2, &Scope::overall());
        assert_eq!(severity, Severity::Low);
        assert_eq!(score, 4);
    }

    #[test]
    fn test_persistence_bands() {
        let scorer = SeverityScorer::new(&AnalysisConfig::default());
        assert_eq!(scorer.persistence_score(0.95), 3);
        assert_eq!(scorer.persistence_score(0.8), 2);
        assert_eq!(scorer.persistence_score(0.6), 1);
        assert_eq!(scorer.persistence_score(0.59), 0);
        assert_eq!(SeverityScorer::magnitude_score(0.5), 0);
    }
}
