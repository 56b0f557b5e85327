use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::HarvestResult;

pub mod static_probe;

pub use static_probe::StaticProbe;

/// Read-only query capability over an already-loaded page.
///
/// The engine never drives a browser itself; everything it knows about the
/// page arrives through this trait. Implementations must report malformed
/// selector syntax as `HarvestError::InvalidSelector` and a valid selector
/// with no matches as a zero count, not an error.
pub trait DomProbe: Send + Sync {
    /// Count elements matched by a CSS selector, with measured latency.
    fn count_matches(&self, selector: &str) -> HarvestResult<MatchStats>;

    /// Return summaries for up to `limit` elements matched by the selector.
    fn sample_elements(&self, selector: &str, limit: usize) -> HarvestResult<Vec<ElementSummary>>;

    /// Produce a structural snapshot of the whole page.
    fn page_snapshot(&self) -> HarvestResult<PageSnapshot>;
}

/// Result of probing a single selector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStats {
    pub count: usize,
    pub elapsed_ms: f64,
}

/// Summary of one matched element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSummary {
    pub tag: String,
    pub classes: Vec<String>,
    pub text: String,
    pub attributes: HashMap<String, String>,
}

/// Structural snapshot of a page, input to candidate generation and
/// complexity analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Total number of elements in the document
    pub element_count: usize,
    /// Element count per tag name
    pub element_counts: HashMap<String, usize>,
    /// How often each CSS class occurs
    pub class_frequency: HashMap<String, usize>,
    /// Content patterns already identified by the structural scan
    pub detected_targets: Vec<DetectedTarget>,
    /// Rendered element boxes, when the probe has layout access.
    /// Static probes leave this empty.
    pub visual_blocks: Vec<VisualBlock>,
    pub viewport: Viewport,
    /// Client framework detected on the page, if any
    pub framework_hint: Option<String>,
    pub is_spa: bool,
    pub has_infinite_scroll: bool,
    pub has_lazy_loading: bool,
}

impl PageSnapshot {
    /// Classes repeated at least `min` times, most frequent first.
    pub fn repeated_classes(&self, min: usize) -> Vec<(&str, usize)> {
        let mut classes: Vec<(&str, usize)> = self
            .class_frequency
            .iter()
            .filter(|(_, &n)| n >= min)
            .map(|(c, &n)| (c.as_str(), n))
            .collect();
        classes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        classes
    }

    /// Total item estimate across all detected targets
    pub fn aggregate_target_count(&self) -> usize {
        self.detected_targets.iter().map(|t| t.match_count).sum()
    }

    /// Number of distinct target kinds found by the scan
    pub fn target_kind_count(&self) -> usize {
        let mut kinds: Vec<&str> = self.detected_targets.iter().map(|t| t.kind.as_str()).collect();
        kinds.sort_unstable();
        kinds.dedup();
        kinds.len()
    }
}

/// A content pattern (product grid, list, table, ...) identified upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedTarget {
    /// Pattern name, e.g. "product", "list", "table"
    pub kind: String,
    /// Selector that matched the pattern
    pub selector: String,
    /// How many elements the selector matched
    pub match_count: usize,
}

/// Bounding box of a rendered element, used for visual grouping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualBlock {
    pub tag: String,
    pub classes: Vec<String>,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280, height: 800 }
    }
}
