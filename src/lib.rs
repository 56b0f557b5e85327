//! pageharvest - selector discovery and harvest coordination for
//! structured web extraction
//!
//! This library provides the core pipeline:
//! - Candidate selector generation and multi-signal ranking
//! - Complexity-driven extraction strategy planning
//! - Concurrent harvest coordination and result consolidation
//! - A static DOM probe for driving the engine over saved HTML

pub mod analysis;
pub mod config;
pub mod core;
pub mod error;
pub mod harvest;
pub mod logging;
pub mod probe;
pub mod selector;
pub mod utils;

// Re-export main types for convenience
pub use crate::analysis::{ExecutionPlan, HarvestRequest};
pub use crate::config::AppConfig;
pub use crate::core::HarvestEngine;
pub use crate::error::{HarvestError, HarvestResult};
pub use crate::harvest::{ConsolidatedResult, HarvestCoordinator, SourceResult};
pub use crate::probe::{DomProbe, PageSnapshot, StaticProbe};
pub use crate::selector::SelectorStrategy;
