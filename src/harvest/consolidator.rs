use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::{HarvestError, HarvestResult};
use crate::harvest::{ConsolidatedResult, QualityMetrics, SourceResult};
use crate::utils::text::{canonicalize_url, collapse_whitespace, extract_numeric, is_blank};

/// Bookkeeping fields sources attach to items; ignored by dedup hashing and
/// by the business-rule check.
const BOOKKEEPING_FIELDS: &[&str] = &["_source", "_index", "_timestamp"];

/// Validates, deduplicates, normalizes and scores the union of all reported
/// results into a final dataset plus quality metrics.
///
/// The pipeline is strictly ordered: structural validation, dedup,
/// normalization, business-rule validation, enrichment, metrics.
pub struct ResultConsolidator;

impl ResultConsolidator {
    pub fn new() -> Self {
        Self
    }

    pub fn consolidate(
        &self,
        results: &HashMap<String, SourceResult>,
    ) -> HarvestResult<ConsolidatedResult> {
        let mut source_ids: Vec<&String> = results.keys().collect();
        source_ids.sort();

        let mut items = Vec::new();
        let mut errors = Vec::new();
        let mut sources_succeeded = 0;
        let mut sources_failed = 0;

        for source_id in source_ids {
            let result = &results[source_id];
            if result.success {
                sources_succeeded += 1;
            } else {
                sources_failed += 1;
            }
            errors.extend(result.errors.iter().cloned());
            items.extend(result.items.iter().cloned());
        }

        let original_count = items.len();
        let mut rejections = Vec::new();

        let items = self.validate_structure(items, &mut rejections);
        let validated_count = items.len();

        let items = self.deduplicate(items)?;
        let duplicates_removed = validated_count - items.len();

        let mut items = items;
        for item in &mut items {
            self.normalize(item);
        }

        let items = self.validate_business_rules(items, &mut rejections);
        let items = self.enrich(items);

        let quality = self.quality_metrics(&items, original_count, duplicates_removed);

        if duplicates_removed > 0 {
            info!(duplicates_removed, "deduplication removed items");
        }
        if !rejections.is_empty() {
            warn!(rejected = rejections.len(), "validation rejected items");
        }
        debug!(
            original = original_count,
            kept = items.len(),
            retention = quality.retention_rate,
            "consolidation finished"
        );

        Ok(ConsolidatedResult {
            items,
            quality,
            sources_succeeded,
            sources_failed,
            errors,
            rejections,
        })
    }

    /// Drop nulls with a recorded reason; wrap non-objects so every item is
    /// a record downstream.
    fn validate_structure(&self, items: Vec<Value>, rejections: &mut Vec<String>) -> Vec<Value> {
        items
            .into_iter()
            .enumerate()
            .filter_map(|(idx, item)| match item {
                Value::Null => {
                    rejections.push(format!("item {} is null", idx));
                    None
                }
                Value::Object(_) => Some(item),
                other => Some(json!({ "value": other })),
            })
            .collect()
    }

    /// First occurrence of a content hash survives; later ones are dropped.
    fn deduplicate(&self, items: Vec<Value>) -> HarvestResult<Vec<Value>> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(items.len());

        for item in items {
            let hash = self.content_hash(&item)?;
            if seen.insert(hash) {
                out.push(item);
            }
        }
        Ok(out)
    }

    /// Canonical hash over all fields except bookkeeping ones, key-sorted so
    /// field order never affects identity.
    fn content_hash(&self, item: &Value) -> HarvestResult<String> {
        let mut hasher = Sha256::new();

        match item {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map
                    .keys()
                    .filter(|k| !BOOKKEEPING_FIELDS.contains(&k.as_str()))
                    .collect();
                keys.sort();
                for key in keys {
                    hasher.update(key.as_bytes());
                    hasher.update(b"=");
                    let serialized = serde_json::to_string(&map[key]).map_err(|e| {
                        HarvestError::consolidation(format!("item not hashable: {}", e))
                    })?;
                    hasher.update(serialized.as_bytes());
                    hasher.update(b";");
                }
            }
            other => {
                let serialized = serde_json::to_string(other)
                    .map_err(|e| HarvestError::consolidation(format!("item not hashable: {}", e)))?;
                hasher.update(serialized.as_bytes());
            }
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Whitespace, URL and price normalization
    fn normalize(&self, item: &mut Value) {
        let Some(obj) = item.as_object_mut() else { return };

        let keys: Vec<String> = obj
            .keys()
            .filter(|k| !k.starts_with('_'))
            .cloned()
            .collect();

        for key in keys {
            let Some(value) = obj.get_mut(&key) else { continue };
            let Some(s) = value.as_str() else { continue };

            let collapsed = collapse_whitespace(s);
            if collapsed.is_empty() {
                *value = Value::Null;
                continue;
            }
            *value = Value::String(collapsed);
        }

        if let Some(url) = obj.get("url").and_then(Value::as_str) {
            if let Some(canonical) = canonicalize_url(url) {
                obj.insert("url".to_string(), Value::String(canonical));
            }
        }

        if let Some(price) = obj.get("price").and_then(Value::as_str) {
            if let Some(numeric) = extract_numeric(price) {
                obj.insert("price_numeric".to_string(), json!(numeric));
            }
        }
    }

    /// An item survives only if at least one non-bookkeeping field holds data
    fn validate_business_rules(
        &self,
        items: Vec<Value>,
        rejections: &mut Vec<String>,
    ) -> Vec<Value> {
        items
            .into_iter()
            .enumerate()
            .filter_map(|(idx, item)| {
                let keeps = item
                    .as_object()
                    .map(|obj| {
                        obj.iter().any(|(k, v)| {
                            !k.starts_with('_') && field_has_content(v)
                        })
                    })
                    .unwrap_or(false);

                if keeps {
                    Some(item)
                } else {
                    rejections.push(format!("item {} has no non-empty fields", idx));
                    None
                }
            })
            .collect()
    }

    fn enrich(&self, mut items: Vec<Value>) -> Vec<Value> {
        let harvested_at = chrono::Utc::now().to_rfc3339();
        for item in &mut items {
            if let Some(obj) = item.as_object_mut() {
                obj.insert("_harvested_at".to_string(), json!(harvested_at));
                obj.insert("_version".to_string(), json!(env!("CARGO_PKG_VERSION")));
            }
        }
        items
    }

    fn quality_metrics(
        &self,
        items: &[Value],
        original_count: usize,
        duplicates_removed: usize,
    ) -> QualityMetrics {
        let retention_rate = if original_count == 0 {
            0.0
        } else {
            items.len() as f64 / original_count as f64
        };

        let mut filled = 0usize;
        let mut total = 0usize;
        for item in items {
            if let Some(obj) = item.as_object() {
                for (key, value) in obj {
                    if key.starts_with('_') {
                        continue;
                    }
                    total += 1;
                    if field_has_content(value) {
                        filled += 1;
                    }
                }
            }
        }
        let completeness_score = if total == 0 { 0.0 } else { filled as f64 / total as f64 };

        QualityMetrics {
            retention_rate,
            duplicates_removed,
            completeness_score,
        }
    }
}

impl Default for ResultConsolidator {
    fn default() -> Self {
        Self::new()
    }
}

fn field_has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !is_blank(s),
        _ => true,
    }
}
