use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::SelectorConfig;
use crate::probe::{DomProbe, PageSnapshot, VisualBlock};
use crate::selector::{CandidateKind, SelectorCandidate};

/// Generic container selectors tried on every page
const STRUCTURAL_CATALOGUE: &[&str] = &[
    "ul > li",
    "ol > li",
    "table tbody tr",
    "table tr",
    ".card",
    ".item",
    ".product",
    ".product-item",
    ".entry",
    ".post",
    "article",
];

/// Containers that scope the semantic-container strategy
const SEMANTIC_SCOPES: &[&str] = &[
    "main",
    "article",
    "section",
    "[role=\"main\"]",
    "[role=\"list\"]",
    "[role=\"feed\"]",
];

/// Last-resort ladder, always emitted
const FALLBACK_LADDER: &[&str] = &["body > *", "main", ".content", "#main", "body"];

/// Pixel quantum for visual grouping; boxes landing in the same bucket are
/// treated as near-equal.
const VISUAL_BUCKET_PX: f32 = 20.0;

/// Produces unranked selector candidates from five independent signal
/// sources. Outputs are unioned and deduplicated by exact selector string;
/// on a collision the higher-ranked source kind wins.
pub struct CandidateGenerator {
    probe: Arc<dyn DomProbe>,
    config: SelectorConfig,
}

impl CandidateGenerator {
    pub fn new(probe: Arc<dyn DomProbe>, config: SelectorConfig) -> Self {
        Self { probe, config }
    }

    /// Generate candidates for a page snapshot.
    ///
    /// Selectors that fail to parse or evaluate against the probe are
    /// discarded here, not deferred to ranking.
    pub fn generate(&self, snapshot: &PageSnapshot) -> Vec<SelectorCandidate> {
        let mut pool = CandidatePool::new();

        self.explicit_targets(snapshot, &mut pool);
        self.structural_patterns(&mut pool);
        self.semantic_containers(snapshot, &mut pool);
        self.visual_groups(&snapshot.visual_blocks, &mut pool);
        self.fallback_ladder(&mut pool);

        let candidates = pool.into_vec();
        debug!(count = candidates.len(), "generated selector candidates");
        candidates
    }

    /// Reuse selectors already identified as matching named content patterns
    fn explicit_targets(&self, snapshot: &PageSnapshot, pool: &mut CandidatePool) {
        for target in &snapshot.detected_targets {
            if !(1 < target.match_count && target.match_count < 100) {
                continue;
            }
            if self.evaluates(&target.selector) {
                pool.insert(SelectorCandidate::new(
                    &target.selector,
                    CandidateKind::ExplicitTarget,
                    target.match_count,
                ));
            }
        }
    }

    /// Fixed catalogue of generic container selectors
    fn structural_patterns(&self, pool: &mut CandidatePool) {
        for selector in STRUCTURAL_CATALOGUE {
            match self.probe.count_matches(selector) {
                Ok(stats) if stats.count >= self.config.structural_min_matches => {
                    pool.insert(SelectorCandidate::new(
                        *selector,
                        CandidateKind::StructuralPattern,
                        stats.count,
                    ));
                }
                Ok(_) => trace!(selector, "structural pattern below match threshold"),
                Err(_) => {}
            }
        }
    }

    /// Semantic scopes combined with repeated child classes
    fn semantic_containers(&self, snapshot: &PageSnapshot, pool: &mut CandidatePool) {
        let repeated = snapshot.repeated_classes(self.config.repeated_class_min);
        if repeated.is_empty() {
            return;
        }

        for scope in SEMANTIC_SCOPES {
            let Ok(scope_stats) = self.probe.count_matches(scope) else { continue };
            if scope_stats.count == 0 {
                continue;
            }

            for (class, _) in repeated.iter().take(5) {
                let selector = format!("{} .{}", scope, class);
                match self.probe.count_matches(&selector) {
                    Ok(stats) if stats.count >= 2 => {
                        pool.insert(SelectorCandidate::new(
                            selector,
                            CandidateKind::SemanticContainer,
                            stats.count,
                        ));
                    }
                    _ => {}
                }
            }
        }
    }

    /// Bucket elements by near-equal bounding boxes; groups of 3-30 members
    /// contribute a selector built from their dominant class or shared tag.
    fn visual_groups(&self, blocks: &[VisualBlock], pool: &mut CandidatePool) {
        if blocks.is_empty() {
            return;
        }

        let mut buckets: HashMap<(i32, i32), Vec<&VisualBlock>> = HashMap::new();
        for block in blocks {
            let key = (
                (block.width / VISUAL_BUCKET_PX).round() as i32,
                (block.height / VISUAL_BUCKET_PX).round() as i32,
            );
            buckets.entry(key).or_default().push(block);
        }

        for group in buckets.values() {
            if !(3..=30).contains(&group.len()) {
                continue;
            }

            let selector = match dominant_class(group) {
                Some(class) => format!(".{}", class),
                None => match shared_tag(group) {
                    Some(tag) => tag,
                    None => continue,
                },
            };

            match self.probe.count_matches(&selector) {
                Ok(stats) if stats.count > 0 => {
                    pool.insert(SelectorCandidate::new(
                        selector,
                        CandidateKind::VisualGroup,
                        group.len(),
                    ));
                }
                _ => {}
            }
        }
    }

    /// Static ladder, always included at lowest priority
    fn fallback_ladder(&self, pool: &mut CandidatePool) {
        for selector in FALLBACK_LADDER {
            if self.evaluates(selector) {
                pool.insert(SelectorCandidate::new(*selector, CandidateKind::Fallback, 1));
            }
        }
    }

    fn evaluates(&self, selector: &str) -> bool {
        self.probe.count_matches(selector).is_ok()
    }
}

/// Class shared by more than half of a visual group
fn dominant_class(group: &[&VisualBlock]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for block in group {
        for class in &block.classes {
            *counts.entry(class.as_str()).or_insert(0) += 1;
        }
    }

    counts
        .into_iter()
        .filter(|(_, n)| *n * 2 > group.len())
        .max_by_key(|(_, n)| *n)
        .map(|(class, _)| class.to_string())
}

/// Tag name if every group member shares it
fn shared_tag(group: &[&VisualBlock]) -> Option<String> {
    let first = group.first()?.tag.as_str();
    group
        .iter()
        .all(|b| b.tag == first)
        .then(|| first.to_string())
}

/// Insertion-ordered candidate set with kind-priority replacement on
/// duplicate selector strings.
struct CandidatePool {
    order: Vec<String>,
    by_selector: HashMap<String, SelectorCandidate>,
}

impl CandidatePool {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            by_selector: HashMap::new(),
        }
    }

    fn insert(&mut self, candidate: SelectorCandidate) {
        match self.by_selector.get(&candidate.selector) {
            Some(existing) if existing.source_kind.dedup_rank() >= candidate.source_kind.dedup_rank() => {
                // first-seen wins over equal or lower-ranked duplicates
            }
            Some(_) => {
                self.by_selector.insert(candidate.selector.clone(), candidate);
            }
            None => {
                self.order.push(candidate.selector.clone());
                self.by_selector.insert(candidate.selector.clone(), candidate);
            }
        }
    }

    fn into_vec(mut self) -> Vec<SelectorCandidate> {
        self.order
            .iter()
            .filter_map(|selector| self.by_selector.remove(selector))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{StaticProbe, Viewport};

    const LISTING: &str = r#"
        <html><body>
          <main>
            <ul>
              <li class="result">one</li>
              <li class="result">two</li>
              <li class="result">three</li>
              <li class="result">four</li>
            </ul>
          </main>
        </body></html>
    "#;

    fn generator(html: &str) -> (CandidateGenerator, PageSnapshot) {
        let probe = Arc::new(StaticProbe::new(html));
        let snapshot = probe.page_snapshot().unwrap();
        (
            CandidateGenerator::new(probe, SelectorConfig::default()),
            snapshot,
        )
    }

    #[test]
    fn test_fallback_ladder_always_present() {
        let (generator, snapshot) = generator("<html><body><p>nothing here</p></body></html>");
        let candidates = generator.generate(&snapshot);

        assert!(candidates
            .iter()
            .any(|c| c.selector == "body" && c.source_kind == CandidateKind::Fallback));
        assert!(candidates.iter().any(|c| c.selector == "body > *"));
    }

    #[test]
    fn test_structural_patterns_require_min_matches() {
        let (generator, snapshot) = generator(LISTING);
        let candidates = generator.generate(&snapshot);

        assert!(candidates
            .iter()
            .any(|c| c.selector == "ul > li" && c.source_kind == CandidateKind::StructuralPattern));
        // only one table-less page: no table rows candidate
        assert!(!candidates.iter().any(|c| c.selector == "table tr"));
    }

    #[test]
    fn test_semantic_containers_combine_scope_and_class() {
        let (generator, snapshot) = generator(LISTING);
        let candidates = generator.generate(&snapshot);

        assert!(candidates
            .iter()
            .any(|c| c.selector == "main .result" && c.source_kind == CandidateKind::SemanticContainer));
    }

    #[test]
    fn test_explicit_target_outranks_duplicate() {
        let probe = Arc::new(StaticProbe::new(LISTING));
        let mut snapshot = probe.page_snapshot().unwrap();
        // force the same selector the structural catalogue will emit
        snapshot.detected_targets.push(crate::probe::DetectedTarget {
            kind: "list".to_string(),
            selector: "ul > li".to_string(),
            match_count: 4,
        });

        let generator = CandidateGenerator::new(probe, SelectorConfig::default());
        let candidates = generator.generate(&snapshot);

        let winner = candidates.iter().find(|c| c.selector == "ul > li").unwrap();
        assert_eq!(winner.source_kind, CandidateKind::ExplicitTarget);
        assert_eq!(
            candidates.iter().filter(|c| c.selector == "ul > li").count(),
            1
        );
    }

    #[test]
    fn test_explicit_target_match_count_bounds() {
        let probe = Arc::new(StaticProbe::new(LISTING));
        let mut snapshot = probe.page_snapshot().unwrap();
        snapshot.detected_targets.clear();
        snapshot.detected_targets.push(crate::probe::DetectedTarget {
            kind: "noise".to_string(),
            selector: "li.result".to_string(),
            match_count: 1,
        });
        snapshot.detected_targets.push(crate::probe::DetectedTarget {
            kind: "noise".to_string(),
            selector: "div".to_string(),
            match_count: 400,
        });

        let generator = CandidateGenerator::new(probe, SelectorConfig::default());
        let candidates = generator.generate(&snapshot);

        assert!(!candidates
            .iter()
            .any(|c| c.source_kind == CandidateKind::ExplicitTarget));
    }

    #[test]
    fn test_visual_groups_from_blocks() {
        let probe = Arc::new(StaticProbe::new(LISTING));
        let mut snapshot = probe.page_snapshot().unwrap();
        snapshot.visual_blocks = (0..4)
            .map(|i| VisualBlock {
                tag: "li".to_string(),
                classes: vec!["result".to_string()],
                width: 300.0 + i as f32, // within one bucket
                height: 80.0,
            })
            .collect();
        snapshot.viewport = Viewport::default();

        let generator = CandidateGenerator::new(probe, SelectorConfig::default());
        let candidates = generator.generate(&snapshot);

        let visual = candidates
            .iter()
            .find(|c| c.source_kind == CandidateKind::VisualGroup)
            .expect("visual group candidate");
        assert_eq!(visual.selector, ".result");
        assert_eq!(visual.expected_count, 4);
    }
}
