use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::analysis::{
    ComplexityAnalyzer, ComplexityProfile, ExecutionPlan, HarvestRequest, StrategyPlanner,
};
use crate::config::AppConfig;
use crate::error::HarvestResult;
use crate::harvest::{ConsolidatedResult, DomSource, ExtractionSource, HarvestCoordinator};
use crate::probe::{DomProbe, PageSnapshot};
use crate::selector::{CandidateGenerator, SelectorRanker, SelectorStrategy};

/// Everything the analysis stage produced for one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestReport {
    pub strategy: Option<SelectorStrategy>,
    pub profile: ComplexityProfile,
    pub plan: ExecutionPlan,
    pub result: ConsolidatedResult,
}

/// Wires the discovery, planning and coordination stages together.
///
/// All collaborators are injected: the caller decides which probe backs the
/// engine and which extraction sources a harvest dispatches.
pub struct HarvestEngine {
    probe: Arc<dyn DomProbe>,
    generator: CandidateGenerator,
    ranker: SelectorRanker,
    analyzer: ComplexityAnalyzer,
    planner: StrategyPlanner,
    coordinator: Arc<HarvestCoordinator>,
    sample_limit: usize,
}

impl HarvestEngine {
    pub fn new(config: &AppConfig, probe: Arc<dyn DomProbe>) -> Self {
        let generator = CandidateGenerator::new(Arc::clone(&probe), config.selector.clone());
        let ranker = SelectorRanker::new(Arc::clone(&probe), config.selector.clone());
        let analyzer = ComplexityAnalyzer::new();
        let planner = StrategyPlanner::new(config.planner.clone());
        let coordinator = Arc::new(HarvestCoordinator::new(&config.harvest));

        Self {
            probe,
            generator,
            ranker,
            analyzer,
            planner,
            coordinator,
            sample_limit: config.selector.sample_limit,
        }
    }

    /// Session-level harvest API (start, submit, force-complete, fetch)
    pub fn coordinator(&self) -> &Arc<HarvestCoordinator> {
        &self.coordinator
    }

    /// Take a fresh structural snapshot through the probe
    pub fn snapshot(&self) -> HarvestResult<PageSnapshot> {
        self.probe.page_snapshot()
    }

    /// Discover and rank selectors for a snapshot.
    ///
    /// A manual selector that resolves bypasses generation entirely. One
    /// that resolves nothing falls through to the automatic pipeline with
    /// confidence capped near zero.
    pub fn build_strategy(
        &self,
        snapshot: &PageSnapshot,
        request: &HarvestRequest,
    ) -> Option<SelectorStrategy> {
        if let Some(manual) = request.manual_selector.as_deref() {
            if let Some(strategy) = self.ranker.rank_manual(manual) {
                info!(selector = manual, "manual selector resolved");
                return Some(strategy);
            }
            debug!(selector = manual, "manual selector missed, running automatic discovery");
            let candidates = self.generator.generate(snapshot);
            return self.ranker.rank(&candidates).map(|mut strategy| {
                strategy.confidence = strategy
                    .confidence
                    .min(SelectorRanker::manual_miss_confidence());
                strategy
            });
        }

        let candidates = self.generator.generate(snapshot);
        self.ranker.rank(&candidates)
    }

    /// Score complexity and derive an execution plan for one request
    pub fn analyze_and_plan(
        &self,
        snapshot: &PageSnapshot,
        request: &HarvestRequest,
    ) -> (Option<SelectorStrategy>, ComplexityProfile, ExecutionPlan) {
        let strategy = self.build_strategy(snapshot, request);
        let profile = self.analyzer.analyze(snapshot, strategy.as_ref(), request);
        let plan = self.planner.plan(&profile);
        (strategy, profile, plan)
    }

    /// DOM-backed stand-in sources for each extraction role the plan calls
    /// for. Real deployments replace these with vision- or
    /// navigation-capable implementations.
    pub fn dom_sources_for(&self, plan: &ExecutionPlan) -> Vec<Arc<dyn ExtractionSource>> {
        plan.extraction_sources()
            .iter()
            .map(|role| {
                Arc::new(DomSource::new(
                    role.id(),
                    Arc::clone(&self.probe),
                    self.sample_limit,
                )) as Arc<dyn ExtractionSource>
            })
            .collect()
    }

    /// Run the full pipeline: snapshot, strategy, plan, dispatch, consolidate
    pub async fn harvest(
        &self,
        request: &HarvestRequest,
        sources: Option<Vec<Arc<dyn ExtractionSource>>>,
    ) -> HarvestResult<HarvestReport> {
        let snapshot = self.snapshot()?;
        let (strategy, profile, plan) = self.analyze_and_plan(&snapshot, request);

        let Some(strategy) = strategy else {
            return Err(crate::error::HarvestError::empty_result(
                "no selector strategy for this page",
            ));
        };

        let sources = sources.unwrap_or_else(|| self.dom_sources_for(&plan));
        info!(
            strategy = ?plan.strategy,
            sources = sources.len(),
            confidence = strategy.confidence,
            "starting harvest"
        );

        let result = self
            .coordinator
            .run_harvest(&plan, &strategy, &sources)
            .await?;

        Ok(HarvestReport {
            strategy: Some(strategy),
            profile,
            plan,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::StaticProbe;

    const LISTING: &str = r#"
        <html><body>
          <main>
            <div class="product"><span class="name">Alpha</span><span class="price">$10.00</span></div>
            <div class="product"><span class="name">Beta</span><span class="price">$12.50</span></div>
            <div class="product"><span class="name">Gamma</span><span class="price">$9.99</span></div>
          </main>
        </body></html>
    "#;

    fn engine() -> HarvestEngine {
        HarvestEngine::new(&AppConfig::default(), Arc::new(StaticProbe::new(LISTING)))
    }

    #[test]
    fn test_automatic_strategy_discovery() {
        let engine = engine();
        let snapshot = engine.snapshot().unwrap();
        let strategy = engine
            .build_strategy(&snapshot, &HarvestRequest::automatic())
            .unwrap();

        assert!(!strategy.is_manual);
        assert_eq!(strategy.primary.match_count, 3);
        for fallback in &strategy.fallbacks {
            assert!(strategy.primary.total_score >= fallback.total_score);
        }
    }

    #[test]
    fn test_manual_selector_bypasses_generation() {
        let engine = engine();
        let snapshot = engine.snapshot().unwrap();
        let strategy = engine
            .build_strategy(&snapshot, &HarvestRequest::with_manual_selector(".product"))
            .unwrap();

        assert!(strategy.is_manual);
        assert!((strategy.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_manual_miss_caps_confidence() {
        let engine = engine();
        let snapshot = engine.snapshot().unwrap();
        let strategy = engine
            .build_strategy(
                &snapshot,
                &HarvestRequest::with_manual_selector(".nope-not-here"),
            )
            .unwrap();

        assert!(!strategy.is_manual);
        assert!(strategy.confidence <= 0.1 + 1e-9);
    }

    #[test]
    fn test_analyze_and_plan_produces_consistent_plan() {
        let engine = engine();
        let snapshot = engine.snapshot().unwrap();
        let (strategy, profile, plan) =
            engine.analyze_and_plan(&snapshot, &HarvestRequest::automatic());

        assert!(strategy.is_some());
        assert!((0.0..=100.0).contains(&profile.complexity_score));
        assert_eq!(
            plan.total_duration_ms,
            plan.timeline.iter().map(|p| p.duration_ms).sum::<u64>()
        );
        assert!(!plan.extraction_sources().is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_harvest() {
        let engine = engine();
        let report = engine
            .harvest(&HarvestRequest::automatic(), None)
            .await
            .unwrap();

        assert!(!report.result.items.is_empty());
        assert!(report.result.sources_succeeded >= 1);
        assert!((0.0..=1.0).contains(&report.result.quality.retention_rate));
        assert!((0.0..=1.0).contains(&report.result.quality.completeness_score));
    }
}
