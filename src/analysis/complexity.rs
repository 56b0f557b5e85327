use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::{ExtractionMode, HarvestRequest};
use crate::probe::PageSnapshot;
use crate::selector::SelectorStrategy;

/// DOM size above which a page is considered heavyweight
const LARGE_DOM_THRESHOLD: usize = 2000;

/// How hard this extraction is going to be, on four axes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityProfile {
    pub selector_complexity: f64,
    pub page_complexity: f64,
    pub data_complexity: f64,
    pub user_requirement_complexity: f64,
    /// Weighted blend of the four axes, 0-100
    pub complexity_score: f64,
    pub risk_level: RiskLevel,
    pub challenges: Vec<Challenge>,
}

impl ComplexityProfile {
    pub fn has_challenge(&self, kind: ChallengeKind) -> bool {
        self.challenges.iter().any(|c| c.kind == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// A detected page characteristic that influences strategy selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub kind: ChallengeKind,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeKind {
    SpaNavigation,
    InfiniteScroll,
    LazyLoading,
    UnreliableSelectors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Scores page, data, selector and user-requirement complexity into a single
/// weighted index and risk tier.
pub struct ComplexityAnalyzer;

impl ComplexityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(
        &self,
        snapshot: &PageSnapshot,
        strategy: Option<&SelectorStrategy>,
        request: &HarvestRequest,
    ) -> ComplexityProfile {
        let selector_complexity = self.selector_complexity(strategy);
        let page_complexity = self.page_complexity(snapshot);
        let data_complexity = self.data_complexity(snapshot);
        let user_requirement_complexity = self.user_requirement_complexity(request);

        let complexity_score = (0.30 * selector_complexity
            + 0.25 * page_complexity
            + 0.25 * data_complexity
            + 0.20 * user_requirement_complexity)
            .clamp(0.0, 100.0);

        let risk_level = if complexity_score < 30.0 {
            RiskLevel::Low
        } else if complexity_score < 60.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        };

        let challenges = self.detect_challenges(snapshot, strategy);

        debug!(
            selector = selector_complexity,
            page = page_complexity,
            data = data_complexity,
            user = user_requirement_complexity,
            score = complexity_score,
            ?risk_level,
            "complexity analyzed"
        );

        ComplexityProfile {
            selector_complexity,
            page_complexity,
            data_complexity,
            user_requirement_complexity,
            complexity_score,
            risk_level,
            challenges,
        }
    }

    fn selector_complexity(&self, strategy: Option<&SelectorStrategy>) -> f64 {
        let Some(strategy) = strategy else {
            return 50.0;
        };

        let mut score: f64 = 0.0;
        if strategy.primary.stability_score < 0.5 {
            score += 30.0;
        }
        if strategy.primary.match_count > 100 {
            score += 20.0;
        }
        if strategy.primary.match_count == 0 {
            score += 40.0;
        }
        if strategy.fallbacks.len() < 2 {
            score += 15.0;
        }
        score.clamp(0.0, 100.0)
    }

    fn page_complexity(&self, snapshot: &PageSnapshot) -> f64 {
        let mut score: f64 = 0.0;
        if snapshot.is_spa {
            score += 25.0;
        }
        if snapshot.has_infinite_scroll {
            score += 20.0;
        }
        if snapshot.has_lazy_loading {
            score += 15.0;
        }
        if snapshot.element_count > LARGE_DOM_THRESHOLD {
            score += 20.0;
        }
        if snapshot.framework_hint.is_some() {
            score += 10.0;
        }
        score.clamp(0.0, 100.0)
    }

    fn data_complexity(&self, snapshot: &PageSnapshot) -> f64 {
        if snapshot.detected_targets.is_empty() {
            return 30.0;
        }

        let mut score: f64 = 0.0;
        if snapshot.target_kind_count() > 3 {
            score += 15.0;
        }
        let aggregate = snapshot.aggregate_target_count();
        if aggregate > 100 {
            score += 20.0;
        }
        if aggregate > 500 {
            score += 30.0;
        }
        score.clamp(0.0, 100.0)
    }

    fn user_requirement_complexity(&self, request: &HarvestRequest) -> f64 {
        let mut score: f64 = 0.0;
        if request.manual_selector.is_none() && request.mode == ExtractionMode::Automatic {
            score += 20.0;
        }
        if request.needs_navigation {
            score += 25.0;
        }
        if request.needs_interaction {
            score += 30.0;
        }
        score.clamp(0.0, 100.0)
    }

    fn detect_challenges(
        &self,
        snapshot: &PageSnapshot,
        strategy: Option<&SelectorStrategy>,
    ) -> Vec<Challenge> {
        let mut challenges = Vec::new();

        if snapshot.is_spa {
            challenges.push(Challenge {
                kind: ChallengeKind::SpaNavigation,
                severity: Severity::High,
            });
        }
        if snapshot.has_infinite_scroll {
            challenges.push(Challenge {
                kind: ChallengeKind::InfiniteScroll,
                severity: Severity::High,
            });
        }
        if snapshot.has_lazy_loading {
            challenges.push(Challenge {
                kind: ChallengeKind::LazyLoading,
                severity: Severity::Medium,
            });
        }

        match strategy {
            None => challenges.push(Challenge {
                kind: ChallengeKind::UnreliableSelectors,
                severity: Severity::High,
            }),
            Some(s) if s.primary.stability_score < 0.5 => challenges.push(Challenge {
                kind: ChallengeKind::UnreliableSelectors,
                severity: if s.primary.stability_score < 0.3 {
                    Severity::High
                } else {
                    Severity::Medium
                },
            }),
            Some(_) => {}
        }

        challenges
    }
}

impl Default for ComplexityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{DetectedTarget, Viewport};
    use crate::selector::{CandidateKind, RankedCandidate};
    use std::collections::HashMap;

    fn snapshot() -> PageSnapshot {
        PageSnapshot {
            element_count: 100,
            element_counts: HashMap::new(),
            class_frequency: HashMap::new(),
            detected_targets: vec![DetectedTarget {
                kind: "list".to_string(),
                selector: "ul > li".to_string(),
                match_count: 10,
            }],
            visual_blocks: Vec::new(),
            viewport: Viewport::default(),
            framework_hint: None,
            is_spa: false,
            has_infinite_scroll: false,
            has_lazy_loading: false,
        }
    }

    fn ranked(selector: &str, match_count: usize, stability: f64) -> RankedCandidate {
        RankedCandidate {
            selector: selector.to_string(),
            source_kind: CandidateKind::StructuralPattern,
            match_count,
            specificity: 10,
            stability_score: stability,
            performance_ms: 1.0,
            total_score: 80.0,
        }
    }

    fn strategy(stability: f64, fallback_count: usize) -> SelectorStrategy {
        SelectorStrategy {
            primary: ranked("ul > li", 10, stability),
            fallbacks: (0..fallback_count).map(|i| ranked(&format!(".f{}", i), 5, 1.0)).collect(),
            is_manual: false,
            confidence: 0.8,
        }
    }

    #[test]
    fn test_score_bounds() {
        let analyzer = ComplexityAnalyzer::new();
        let profile = analyzer.analyze(&snapshot(), None, &HarvestRequest::automatic());
        assert!((0.0..=100.0).contains(&profile.complexity_score));
        assert!((0.0..=100.0).contains(&profile.selector_complexity));
        assert!((0.0..=100.0).contains(&profile.page_complexity));
    }

    #[test]
    fn test_simple_page_is_low_risk() {
        let analyzer = ComplexityAnalyzer::new();
        let profile = analyzer.analyze(
            &snapshot(),
            Some(&strategy(1.0, 3)),
            &HarvestRequest::with_manual_selector("ul > li"),
        );
        assert_eq!(profile.risk_level, RiskLevel::Low);
        assert!(profile.challenges.is_empty());
    }

    #[test]
    fn test_missing_strategy_flags_unreliable_selectors() {
        let analyzer = ComplexityAnalyzer::new();
        let profile = analyzer.analyze(&snapshot(), None, &HarvestRequest::automatic());
        assert_eq!(profile.selector_complexity, 50.0);
        assert!(profile.has_challenge(ChallengeKind::UnreliableSelectors));
    }

    #[test]
    fn test_unstable_primary_penalized() {
        let analyzer = ComplexityAnalyzer::new();
        let profile = analyzer.analyze(
            &snapshot(),
            Some(&strategy(0.2, 1)),
            &HarvestRequest::automatic(),
        );
        // +30 low stability, +15 thin fallback chain
        assert_eq!(profile.selector_complexity, 45.0);
        assert!(profile.has_challenge(ChallengeKind::UnreliableSelectors));
    }

    #[test]
    fn test_spa_with_infinite_scroll_is_medium_or_high() {
        // SPA, infinite scroll, 3000 elements, one target of 10 items
        let mut snap = snapshot();
        snap.is_spa = true;
        snap.has_infinite_scroll = true;
        snap.element_count = 3000;
        snap.framework_hint = Some("react".to_string());

        let analyzer = ComplexityAnalyzer::new();
        let profile = analyzer.analyze(&snap, None, &HarvestRequest::automatic());

        assert!(matches!(profile.risk_level, RiskLevel::Medium | RiskLevel::High));
        assert!(profile.has_challenge(ChallengeKind::SpaNavigation));
        assert!(profile.has_challenge(ChallengeKind::InfiniteScroll));
    }

    #[test]
    fn test_no_targets_raises_data_complexity() {
        let mut snap = snapshot();
        snap.detected_targets.clear();

        let analyzer = ComplexityAnalyzer::new();
        let profile = analyzer.analyze(&snap, Some(&strategy(1.0, 3)), &HarvestRequest::automatic());
        assert_eq!(profile.data_complexity, 30.0);
    }

    #[test]
    fn test_large_aggregate_counts() {
        let mut snap = snapshot();
        snap.detected_targets = vec![DetectedTarget {
            kind: "product".to_string(),
            selector: ".product".to_string(),
            match_count: 600,
        }];

        let analyzer = ComplexityAnalyzer::new();
        let profile = analyzer.analyze(&snap, Some(&strategy(1.0, 3)), &HarvestRequest::automatic());
        // both the >100 and >500 thresholds apply
        assert_eq!(profile.data_complexity, 50.0);
    }
}
