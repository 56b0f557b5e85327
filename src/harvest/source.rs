use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

use crate::analysis::ExecutionPlan;
use crate::harvest::SourceResult;
use crate::probe::{DomProbe, ElementSummary};
use crate::selector::SelectorStrategy;

/// One independent extraction attempt, dispatched by the coordinator.
///
/// Implementations must not panic: anything that goes wrong is reported as
/// `success: false` with an error list, so one source's failure cannot
/// corrupt its siblings in an all-settle join.
#[async_trait]
pub trait ExtractionSource: Send + Sync {
    /// Stable id this source reports results under
    fn id(&self) -> &str;

    async fn extract(&self, strategy: &SelectorStrategy, plan: &ExecutionPlan) -> SourceResult;
}

/// DOM-backed extraction source.
///
/// Walks the ranked selector chain: the primary first, advancing to the next
/// fallback whenever a selector turns out invalid or matches nothing.
pub struct DomSource {
    id: String,
    probe: Arc<dyn DomProbe>,
    sample_limit: usize,
}

impl DomSource {
    pub fn new(id: impl Into<String>, probe: Arc<dyn DomProbe>, sample_limit: usize) -> Self {
        Self {
            id: id.into(),
            probe,
            sample_limit,
        }
    }

    fn element_to_item(&self, element: &ElementSummary, index: usize) -> serde_json::Value {
        let mut item = serde_json::Map::new();
        item.insert("tag".to_string(), json!(element.tag));
        item.insert("text".to_string(), json!(element.text));
        if let Some(href) = element.attributes.get("href") {
            item.insert("url".to_string(), json!(href));
        }
        if let Some(src) = element.attributes.get("src") {
            item.insert("image".to_string(), json!(src));
        }
        if !element.classes.is_empty() {
            item.insert("classes".to_string(), json!(element.classes.join(" ")));
        }
        // bookkeeping fields, excluded from dedup hashing downstream
        item.insert("_source".to_string(), json!(self.id));
        item.insert("_index".to_string(), json!(index));
        serde_json::Value::Object(item)
    }
}

#[async_trait]
impl ExtractionSource for DomSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn extract(&self, strategy: &SelectorStrategy, _plan: &ExecutionPlan) -> SourceResult {
        let started = Instant::now();
        let mut errors = Vec::new();

        for ranked in strategy.selector_chain() {
            let samples = match self.probe.sample_elements(&ranked.selector, self.sample_limit) {
                Ok(samples) => samples,
                Err(e) => {
                    trace!(selector = %ranked.selector, error = %e, "selector failed, advancing chain");
                    errors.push(e.to_string());
                    continue;
                }
            };

            if samples.is_empty() {
                errors.push(format!("Selector matched no elements: {}", ranked.selector));
                continue;
            }

            let items: Vec<serde_json::Value> = samples
                .iter()
                .enumerate()
                .map(|(i, el)| self.element_to_item(el, i))
                .collect();

            debug!(
                source = %self.id,
                selector = %ranked.selector,
                items = items.len(),
                "extraction succeeded"
            );
            return SourceResult::ok(&self.id, items, started.elapsed().as_millis() as u64);
        }

        errors.push("selector chain exhausted".to_string());
        SourceResult::failed(&self.id, errors, started.elapsed().as_millis() as u64)
    }
}
