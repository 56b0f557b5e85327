use serde::{Deserialize, Serialize};

pub mod complexity;
pub mod planner;

pub use complexity::{Challenge, ChallengeKind, ComplexityAnalyzer, ComplexityProfile, RiskLevel};
pub use planner::{ExecutionPlan, StrategyPlanner};

/// What the caller asked the engine to do with the page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestRequest {
    pub mode: ExtractionMode,
    /// User-supplied selector, bypasses candidate generation when it resolves
    pub manual_selector: Option<String>,
    /// Extraction requires navigating between pages or views
    pub needs_navigation: bool,
    /// Extraction requires interactive steps (clicks, form input)
    pub needs_interaction: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMode {
    Automatic,
    Manual,
}

impl Default for HarvestRequest {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Automatic,
            manual_selector: None,
            needs_navigation: false,
            needs_interaction: false,
        }
    }
}

impl HarvestRequest {
    pub fn automatic() -> Self {
        Self::default()
    }

    pub fn with_manual_selector(selector: impl Into<String>) -> Self {
        Self {
            mode: ExtractionMode::Manual,
            manual_selector: Some(selector.into()),
            ..Self::default()
        }
    }
}
