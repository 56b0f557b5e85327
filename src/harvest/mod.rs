use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub mod consolidator;
pub mod coordinator;
pub mod source;

pub use consolidator::ResultConsolidator;
pub use coordinator::HarvestCoordinator;
pub use source::{DomSource, ExtractionSource};

/// Outcome of one dispatched extraction attempt. Supplied by extraction
/// sources; failures are encoded here, never thrown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResult {
    pub source_id: String,
    pub success: bool,
    pub items: Vec<serde_json::Value>,
    pub errors: Vec<String>,
    pub processing_time_ms: u64,
}

impl SourceResult {
    pub fn ok(source_id: impl Into<String>, items: Vec<serde_json::Value>, processing_time_ms: u64) -> Self {
        Self {
            source_id: source_id.into(),
            success: true,
            items,
            errors: Vec::new(),
            processing_time_ms,
        }
    }

    pub fn failed(
        source_id: impl Into<String>,
        errors: Vec<String>,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            success: false,
            items: Vec::new(),
            errors,
            processing_time_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
}

/// One coordinated round of dispatching sources and collecting results.
///
/// Owned exclusively by the coordinator; mutated only through its
/// operations. Transitions to `Completed` exactly once.
#[derive(Debug, Clone)]
pub struct HarvestSession {
    pub id: String,
    pub expected_source_ids: BTreeSet<String>,
    pub received_results: HashMap<String, SourceResult>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub consolidated: Option<ConsolidatedResult>,
    pub failure: Option<String>,
}

impl HarvestSession {
    pub fn new(id: String, expected_source_ids: BTreeSet<String>) -> Self {
        Self {
            id,
            expected_source_ids,
            received_results: HashMap::new(),
            status: SessionStatus::Active,
            started_at: Utc::now(),
            consolidated: None,
            failure: None,
        }
    }

    /// All expected sources have reported
    pub fn is_saturated(&self) -> bool {
        self.received_results.len() >= self.expected_source_ids.len()
    }
}

/// Quality metrics for a consolidated dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Final item count over original item count
    pub retention_rate: f64,
    pub duplicates_removed: usize,
    /// Share of non-empty fields across the surviving items
    pub completeness_score: f64,
}

/// Final artifact of a completed harvest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedResult {
    pub items: Vec<serde_json::Value>,
    pub quality: QualityMetrics,
    pub sources_succeeded: usize,
    pub sources_failed: usize,
    /// Errors reported by the sources
    pub errors: Vec<String>,
    /// Items dropped by validation, with human-readable reasons
    pub rejections: Vec<String>,
}
