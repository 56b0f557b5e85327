use scraper::{Html, Selector};
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

use crate::error::{HarvestError, HarvestResult};
use crate::probe::{
    DetectedTarget, DomProbe, ElementSummary, MatchStats, PageSnapshot, Viewport,
};
use crate::utils::text::collapse_whitespace;

/// Structural patterns the snapshot scan probes for.
///
/// Mirrors the candidate catalogue: anything that commonly wraps repeated
/// content on listing pages.
const TARGET_PATTERNS: &[(&str, &str)] = &[
    ("product", ".product"),
    ("product", ".product-item"),
    ("product", ".product-card"),
    ("card", ".card"),
    ("item", ".item"),
    ("list", "ul > li"),
    ("list", "ol > li"),
    ("table", "table tr"),
    ("article", "article"),
    ("post", ".post"),
    ("entry", ".entry"),
];

/// Class-name keywords that mark extraction-worthy containers, with the
/// target kind they imply. Ported from the e-commerce keyword table the
/// ranking heuristics grew out of.
const CLASS_KEYWORDS: &[(&str, &str)] = &[
    ("product", "product"),
    ("item", "item"),
    ("card", "card"),
    ("listing", "list"),
    ("result", "list"),
    ("row", "table"),
    ("entry", "entry"),
    ("post", "post"),
    ("tile", "card"),
    ("price", "product"),
];

/// DOM probe over a static HTML document.
///
/// The document is re-parsed per query: `scraper::Html` is not `Sync`, and
/// holding it would make the probe unusable behind an `Arc` shared with
/// dispatched extraction tasks. Parse cost is what `MatchStats.elapsed_ms`
/// reports, which is exactly the latency a live probe would measure.
pub struct StaticProbe {
    html: String,
    viewport: Viewport,
}

impl StaticProbe {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            viewport: Viewport::default(),
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    fn parse(&self) -> Html {
        Html::parse_document(&self.html)
    }

    fn parse_selector(selector: &str) -> HarvestResult<Selector> {
        Selector::parse(selector).map_err(|_| HarvestError::invalid_selector(selector))
    }

    fn detect_framework(&self) -> Option<String> {
        let html = &self.html;
        if html.contains("data-reactroot") || html.contains("__NEXT_DATA__") || html.contains("react-dom") {
            Some("react".to_string())
        } else if html.contains("data-v-") || html.contains("__vue__") || html.contains("vue.runtime") {
            Some("vue".to_string())
        } else if html.contains("ng-version") || html.contains("ng-app") {
            Some("angular".to_string())
        } else {
            None
        }
    }

    fn detect_targets(&self, doc: &Html, class_frequency: &HashMap<String, usize>) -> Vec<DetectedTarget> {
        let mut targets = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for (kind, selector) in TARGET_PATTERNS {
            let Ok(sel) = Selector::parse(selector) else { continue };
            let count = doc.select(&sel).count();
            if count >= 2 && seen.insert(selector.to_string()) {
                targets.push(DetectedTarget {
                    kind: kind.to_string(),
                    selector: selector.to_string(),
                    match_count: count,
                });
            }
        }

        // Repeated keyword-bearing classes are targets too, e.g. ".search-result"
        for (class, &count) in class_frequency {
            if !(2..200).contains(&count) {
                continue;
            }
            let lowered = class.to_lowercase();
            let Some((_, kind)) = CLASS_KEYWORDS.iter().find(|(kw, _)| lowered.contains(kw)) else {
                continue;
            };
            let selector = format!(".{}", class);
            if Selector::parse(&selector).is_ok() && seen.insert(selector.clone()) {
                targets.push(DetectedTarget {
                    kind: kind.to_string(),
                    selector,
                    match_count: count,
                });
            }
        }

        targets.sort_by(|a, b| b.match_count.cmp(&a.match_count).then(a.selector.cmp(&b.selector)));
        targets
    }
}

impl DomProbe for StaticProbe {
    fn count_matches(&self, selector: &str) -> HarvestResult<MatchStats> {
        let sel = Self::parse_selector(selector)?;
        let started = Instant::now();
        let doc = self.parse();
        let count = doc.select(&sel).count();
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(selector, count, elapsed_ms, "probed selector");
        Ok(MatchStats { count, elapsed_ms })
    }

    fn sample_elements(&self, selector: &str, limit: usize) -> HarvestResult<Vec<ElementSummary>> {
        let sel = Self::parse_selector(selector)?;
        let doc = self.parse();

        let samples = doc
            .select(&sel)
            .take(limit)
            .map(|el| {
                let attributes = el
                    .value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                ElementSummary {
                    tag: el.value().name().to_string(),
                    classes: el.value().classes().map(str::to_string).collect(),
                    text: collapse_whitespace(&el.text().collect::<String>()),
                    attributes,
                }
            })
            .collect();

        Ok(samples)
    }

    fn page_snapshot(&self) -> HarvestResult<PageSnapshot> {
        let doc = self.parse();

        let mut element_count = 0usize;
        let mut element_counts: HashMap<String, usize> = HashMap::new();
        let mut class_frequency: HashMap<String, usize> = HashMap::new();

        let all = Selector::parse("*").expect("universal selector");
        for el in doc.select(&all) {
            element_count += 1;
            *element_counts.entry(el.value().name().to_string()).or_insert(0) += 1;
            for class in el.value().classes() {
                *class_frequency.entry(class.to_string()).or_insert(0) += 1;
            }
        }

        let detected_targets = self.detect_targets(&doc, &class_frequency);
        let framework_hint = self.detect_framework();
        let html = &self.html;
        let is_spa = framework_hint.is_some()
            && (html.contains("id=\"root\"") || html.contains("id=\"app\"") || html.contains("data-reactroot"));
        let has_infinite_scroll =
            html.contains("infinite-scroll") || html.contains("load-more") || html.contains("data-infinite");
        let has_lazy_loading =
            html.contains("loading=\"lazy\"") || html.contains("lazyload") || html.contains("data-src=");

        Ok(PageSnapshot {
            element_count,
            element_counts,
            class_frequency,
            detected_targets,
            visual_blocks: Vec::new(),
            viewport: self.viewport,
            framework_hint,
            is_spa,
            has_infinite_scroll,
            has_lazy_loading,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <main>
            <ul class="grid">
              <li class="product"><span class="title">Alpha</span><span class="price">$10.00</span></li>
              <li class="product"><span class="title">Beta</span><span class="price">$12.50</span></li>
              <li class="product"><span class="title">Gamma</span><span class="price">$9.99</span></li>
            </ul>
          </main>
        </body></html>
    "#;

    #[test]
    fn test_count_matches() {
        let probe = StaticProbe::new(LISTING);
        let stats = probe.count_matches(".product").unwrap();
        assert_eq!(stats.count, 3);
        assert!(stats.elapsed_ms >= 0.0);
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let probe = StaticProbe::new(LISTING);
        let err = probe.count_matches("div[[broken").unwrap_err();
        assert_eq!(err.category(), "selector");
    }

    #[test]
    fn test_zero_matches_is_not_an_error() {
        let probe = StaticProbe::new(LISTING);
        let stats = probe.count_matches(".does-not-exist").unwrap();
        assert_eq!(stats.count, 0);
    }

    #[test]
    fn test_sample_elements() {
        let probe = StaticProbe::new(LISTING);
        let samples = probe.sample_elements(".product", 2).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].tag, "li");
        assert!(samples[0].text.contains("Alpha"));
        assert!(samples[0].classes.contains(&"product".to_string()));
    }

    #[test]
    fn test_snapshot_detects_targets_and_classes() {
        let probe = StaticProbe::new(LISTING);
        let snapshot = probe.page_snapshot().unwrap();

        assert!(snapshot.element_count > 5);
        assert_eq!(snapshot.class_frequency.get("product"), Some(&3));
        assert!(snapshot
            .detected_targets
            .iter()
            .any(|t| t.kind == "product" && t.match_count == 3));
        assert!(!snapshot.is_spa);
    }

    #[test]
    fn test_snapshot_framework_detection() {
        let html = r#"<html><body><div id="root" data-reactroot></div>
            <div class="infinite-scroll"></div>
            <img loading="lazy" src="x.png"></body></html>"#;
        let snapshot = StaticProbe::new(html).page_snapshot().unwrap();

        assert_eq!(snapshot.framework_hint.as_deref(), Some("react"));
        assert!(snapshot.is_spa);
        assert!(snapshot.has_infinite_scroll);
        assert!(snapshot.has_lazy_loading);
    }
}
