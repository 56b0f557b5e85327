use serde::{Deserialize, Serialize};

pub mod generator;
pub mod ranker;

pub use generator::CandidateGenerator;
pub use ranker::SelectorRanker;

/// Which generation strategy produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateKind {
    /// Selector already identified as matching a named content pattern
    ExplicitTarget,
    /// Generic container catalogue (list items, table rows, card classes)
    StructuralPattern,
    /// Scoped under a semantic or ARIA-role container
    SemanticContainer,
    /// Derived from elements sharing near-equal bounding boxes
    VisualGroup,
    /// Static last-resort ladder
    Fallback,
}

impl CandidateKind {
    /// Score prior: more targeted generation strategies rank higher
    pub fn prior(&self) -> f64 {
        match self {
            Self::ExplicitTarget => 30.0,
            Self::StructuralPattern => 25.0,
            Self::SemanticContainer => 20.0,
            Self::VisualGroup => 15.0,
            Self::Fallback => 5.0,
        }
    }

    /// Ordering used when the same selector arrives from two strategies
    pub fn dedup_rank(&self) -> u8 {
        match self {
            Self::ExplicitTarget => 4,
            Self::StructuralPattern => 3,
            Self::SemanticContainer => 2,
            Self::VisualGroup => 1,
            Self::Fallback => 0,
        }
    }
}

/// An unranked, untested selector hypothesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorCandidate {
    pub selector: String,
    pub source_kind: CandidateKind,
    /// Match count the generating strategy expects, before probing
    pub expected_count: usize,
}

impl SelectorCandidate {
    pub fn new(selector: impl Into<String>, source_kind: CandidateKind, expected_count: usize) -> Self {
        Self {
            selector: selector.into(),
            source_kind,
            expected_count,
        }
    }
}

/// A candidate after probing and scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub selector: String,
    pub source_kind: CandidateKind,
    pub match_count: usize,
    pub specificity: u32,
    pub stability_score: f64,
    pub performance_ms: f64,
    pub total_score: f64,
}

/// Ordered selector chain for one extraction request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorStrategy {
    pub primary: RankedCandidate,
    pub fallbacks: Vec<RankedCandidate>,
    pub is_manual: bool,
    pub confidence: f64,
}

impl SelectorStrategy {
    /// Primary selector followed by the fallback chain, in order
    pub fn selector_chain(&self) -> impl Iterator<Item = &RankedCandidate> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }
}
