use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::analysis::complexity::{ChallengeKind, ComplexityProfile};
use crate::config::PlannerConfig;

/// Overall shape of the extraction effort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyType {
    Simple,
    Coordinated,
    Adaptive,
    Robust,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMethod {
    SingleSource,
    MultiSource,
    IntelligentMultiSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanPriority {
    Speed,
    Reliability,
    Adaptability,
    Robustness,
}

/// Worker and extraction-source roles a plan can call for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceRole {
    Coordinator,
    Harvester,
    Formatter,
    FastExtractor,
    ReliableExtractor,
    SmartExtractor,
    VisionExtractor,
    NavigationExtractor,
}

impl SourceRole {
    /// Stable identifier used as the source id in harvest sessions
    pub fn id(&self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Harvester => "harvester",
            Self::Formatter => "formatter",
            Self::FastExtractor => "fast",
            Self::ReliableExtractor => "reliable",
            Self::SmartExtractor => "smart",
            Self::VisionExtractor => "vision",
            Self::NavigationExtractor => "navigation",
        }
    }

    /// Whether this role performs extraction (vs. pipeline bookkeeping)
    pub fn is_extractor(&self) -> bool {
        !matches!(self, Self::Coordinator | Self::Harvester | Self::Formatter)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_memory_mb: u64,
    pub max_cpu_percent: u8,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePlan {
    pub required_sources: BTreeSet<SourceRole>,
    pub optional_sources: BTreeSet<SourceRole>,
    pub concurrency: usize,
    pub limits: ResourceLimits,
}

impl ResourcePlan {
    pub fn has_source(&self, role: SourceRole) -> bool {
        self.required_sources.contains(&role) || self.optional_sources.contains(&role)
    }
}

/// One phase of the planned timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPhase {
    pub name: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessCriteria {
    pub min_items: usize,
    pub min_sources_succeeded: usize,
    pub min_retention_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackTrigger {
    PrimaryTimeout,
    SelectorFailure,
    DomExtractionFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackAction {
    DowngradeToSingleSource,
    PromptManualSelector,
    VisionOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackStrategy {
    pub trigger: FallbackTrigger,
    pub action: FallbackAction,
}

/// Immutable plan for one extraction request. Re-planning builds a new plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub strategy: StrategyType,
    pub method: ExtractionMethod,
    pub priority: PlanPriority,
    pub plan_confidence: f64,
    pub resource_plan: ResourcePlan,
    pub timeline: Vec<PlanPhase>,
    pub total_duration_ms: u64,
    pub success_criteria: SuccessCriteria,
    pub fallback_strategies: Vec<FallbackStrategy>,
}

impl ExecutionPlan {
    /// Extraction-capable roles this plan will dispatch, required first
    pub fn extraction_sources(&self) -> Vec<SourceRole> {
        self.resource_plan
            .required_sources
            .iter()
            .chain(self.resource_plan.optional_sources.iter())
            .filter(|r| r.is_extractor())
            .copied()
            .collect()
    }
}

/// Maps a complexity profile to an execution plan via an ordered decision
/// table; first matching row wins.
pub struct StrategyPlanner {
    config: PlannerConfig,
}

impl StrategyPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn plan(&self, profile: &ComplexityProfile) -> ExecutionPlan {
        let (strategy, method, priority, plan_confidence) = self.select_strategy(profile);
        let resource_plan = self.resource_plan(method, profile);
        let timeline = self.timeline(&resource_plan);
        let total_duration_ms = timeline.iter().map(|p| p.duration_ms).sum();
        let fallback_strategies = self.fallback_strategies(&resource_plan);

        debug!(
            ?strategy,
            ?method,
            concurrency = resource_plan.concurrency,
            total_duration_ms,
            "execution plan built"
        );

        ExecutionPlan {
            strategy,
            method,
            priority,
            plan_confidence,
            resource_plan,
            timeline,
            total_duration_ms,
            success_criteria: SuccessCriteria {
                min_items: 1,
                min_sources_succeeded: 1,
                min_retention_rate: 0.5,
            },
            fallback_strategies,
        }
    }

    fn select_strategy(
        &self,
        profile: &ComplexityProfile,
    ) -> (StrategyType, ExtractionMethod, PlanPriority, f64) {
        if profile.complexity_score < 20.0 {
            return (
                StrategyType::Simple,
                ExtractionMethod::SingleSource,
                PlanPriority::Speed,
                0.9,
            );
        }
        if profile.complexity_score < 50.0 {
            return (
                StrategyType::Coordinated,
                ExtractionMethod::MultiSource,
                PlanPriority::Reliability,
                0.8,
            );
        }
        if profile.has_challenge(ChallengeKind::InfiniteScroll)
            || profile.has_challenge(ChallengeKind::SpaNavigation)
        {
            return (
                StrategyType::Adaptive,
                ExtractionMethod::IntelligentMultiSource,
                PlanPriority::Adaptability,
                0.7,
            );
        }
        (
            StrategyType::Robust,
            ExtractionMethod::IntelligentMultiSource,
            PlanPriority::Robustness,
            0.6,
        )
    }

    fn resource_plan(&self, method: ExtractionMethod, profile: &ComplexityProfile) -> ResourcePlan {
        let mut required: BTreeSet<SourceRole> = [
            SourceRole::Coordinator,
            SourceRole::Harvester,
            SourceRole::Formatter,
        ]
        .into();
        let mut optional = BTreeSet::new();

        let (concurrency, timeout_ms) = match method {
            ExtractionMethod::SingleSource => {
                required.insert(SourceRole::FastExtractor);
                (1, 10_000)
            }
            ExtractionMethod::MultiSource => {
                required.insert(SourceRole::ReliableExtractor);
                required.insert(SourceRole::FastExtractor);
                (2, 20_000)
            }
            ExtractionMethod::IntelligentMultiSource => {
                required.insert(SourceRole::SmartExtractor);
                optional.insert(SourceRole::VisionExtractor);
                (3, 45_000)
            }
        };

        // challenges widen the source set beyond what the method asked for
        if profile.has_challenge(ChallengeKind::UnreliableSelectors)
            && !required.contains(&SourceRole::VisionExtractor)
        {
            optional.insert(SourceRole::VisionExtractor);
        }
        if (profile.has_challenge(ChallengeKind::LazyLoading)
            || profile.has_challenge(ChallengeKind::InfiniteScroll))
            && !required.contains(&SourceRole::NavigationExtractor)
        {
            optional.insert(SourceRole::NavigationExtractor);
        }

        ResourcePlan {
            required_sources: required,
            optional_sources: optional,
            concurrency,
            limits: ResourceLimits {
                max_memory_mb: self.config.max_memory_mb,
                max_cpu_percent: self.config.max_cpu_percent,
                timeout_ms,
            },
        }
    }

    /// Four sequential phases; extraction scales with the optional sources
    /// included and shrinks as concurrency rises.
    fn timeline(&self, resources: &ResourcePlan) -> Vec<PlanPhase> {
        let mut extraction_ms = self.config.extraction_base_ms;
        if resources.has_source(SourceRole::VisionExtractor) {
            extraction_ms += self.config.vision_extra_ms;
        }
        if resources.has_source(SourceRole::NavigationExtractor) {
            extraction_ms += self.config.navigation_extra_ms;
        }
        extraction_ms /= resources.concurrency.saturating_sub(1).max(1) as u64;

        vec![
            PlanPhase { name: "initialization".to_string(), duration_ms: 1_000 },
            PlanPhase { name: "primary-extraction".to_string(), duration_ms: extraction_ms },
            PlanPhase { name: "processing".to_string(), duration_ms: 2_000 },
            PlanPhase { name: "output".to_string(), duration_ms: 1_000 },
        ]
    }

    fn fallback_strategies(&self, resources: &ResourcePlan) -> Vec<FallbackStrategy> {
        let mut strategies = vec![
            FallbackStrategy {
                trigger: FallbackTrigger::PrimaryTimeout,
                action: FallbackAction::DowngradeToSingleSource,
            },
            FallbackStrategy {
                trigger: FallbackTrigger::SelectorFailure,
                action: FallbackAction::PromptManualSelector,
            },
        ];

        // vision-only is pointless when vision already carries the extraction
        let vision_is_primary = resources.required_sources.contains(&SourceRole::VisionExtractor);
        if !vision_is_primary {
            strategies.push(FallbackStrategy {
                trigger: FallbackTrigger::DomExtractionFailure,
                action: FallbackAction::VisionOnly,
            });
        }

        strategies
    }
}
