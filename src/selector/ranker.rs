use regex::Regex;
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::{debug, trace, warn};

use crate::config::SelectorConfig;
use crate::probe::DomProbe;
use crate::selector::{CandidateKind, RankedCandidate, SelectorCandidate, SelectorStrategy};

/// Tags that signal author intent about page structure
const SEMANTIC_TAGS: &[&str] = &["main", "article"];

/// Confidence assigned to a manual selector that resolves
const MANUAL_CONFIDENCE: f64 = 0.9;

/// Confidence ceiling when a manual selector resolved nothing and the
/// automatic pipeline took over
const MANUAL_MISS_CONFIDENCE: f64 = 0.1;

fn hash_class_re(min_len: usize) -> Regex {
    Regex::new(&format!(r"^[a-z0-9]{{{},}}$", min_len)).expect("hash class pattern")
}

fn class_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.([A-Za-z0-9_-]+)").unwrap())
}

fn id_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([A-Za-z0-9_-]+)").unwrap())
}

/// Probes candidates, computes composite scores and emits an ordered
/// selector strategy (primary plus fallback chain).
pub struct SelectorRanker {
    probe: Arc<dyn DomProbe>,
    config: SelectorConfig,
    hash_class: Regex,
}

impl SelectorRanker {
    pub fn new(probe: Arc<dyn DomProbe>, config: SelectorConfig) -> Self {
        let hash_class = hash_class_re(config.hash_class_min_len);
        Self {
            probe,
            config,
            hash_class,
        }
    }

    /// Rank candidates into a strategy. Returns `None` when nothing matches.
    pub fn rank(&self, candidates: &[SelectorCandidate]) -> Option<SelectorStrategy> {
        let mut ranked: Vec<RankedCandidate> = candidates
            .iter()
            .filter_map(|c| self.score_candidate(c))
            .collect();

        if ranked.is_empty() {
            warn!("no candidate matched any elements");
            return None;
        }

        ranked.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let primary = ranked.remove(0);
        let mut fallbacks: Vec<RankedCandidate> = ranked
            .into_iter()
            .take(self.config.max_fallbacks)
            .collect();
        self.append_terminal_body(&primary, &mut fallbacks);

        let confidence =
            (primary.total_score / 100.0 + 0.2 * primary.stability_score).clamp(0.0, 1.0);

        debug!(
            primary = %primary.selector,
            score = primary.total_score,
            fallbacks = fallbacks.len(),
            "ranked selector strategy"
        );

        Some(SelectorStrategy {
            primary,
            fallbacks,
            is_manual: false,
            confidence,
        })
    }

    /// Build a strategy from a user-supplied selector.
    ///
    /// A resolving manual selector bypasses generation entirely; its
    /// fallbacks are simplifications of itself. A manual selector that
    /// matches nothing returns `None` so the caller can fall through to the
    /// automatic pipeline (capping confidence at `manual_miss_confidence`).
    pub fn rank_manual(&self, selector: &str) -> Option<SelectorStrategy> {
        let primary = match self.score_manual(selector) {
            Some(ranked) => ranked,
            None => {
                debug!(selector, "manual selector resolved no elements");
                return None;
            }
        };

        let mut fallbacks = Vec::new();
        for simplified in simplify_selector(selector) {
            if fallbacks.len() >= self.config.max_fallbacks {
                break;
            }
            if simplified == selector {
                continue;
            }
            if let Some(mut ranked) = self.score_manual(&simplified) {
                // the chain is ordered by construction, not by score
                ranked.total_score = ranked.total_score.min(primary.total_score);
                fallbacks.push(ranked);
            }
        }
        self.append_terminal_body(&primary, &mut fallbacks);

        Some(SelectorStrategy {
            primary,
            fallbacks,
            is_manual: true,
            confidence: MANUAL_CONFIDENCE,
        })
    }

    /// Confidence ceiling applied when a manual selector missed and the
    /// automatic pipeline produced the strategy instead.
    pub fn manual_miss_confidence() -> f64 {
        MANUAL_MISS_CONFIDENCE
    }

    fn score_manual(&self, selector: &str) -> Option<RankedCandidate> {
        let candidate =
            SelectorCandidate::new(selector, CandidateKind::ExplicitTarget, 0);
        self.score_candidate(&candidate)
    }

    /// Probe and score one candidate; zero matches or invalid syntax drop it.
    fn score_candidate(&self, candidate: &SelectorCandidate) -> Option<RankedCandidate> {
        let stats = match self.probe.count_matches(&candidate.selector) {
            Ok(stats) => stats,
            Err(e) => {
                trace!(selector = %candidate.selector, error = %e, "candidate discarded");
                return None;
            }
        };
        if stats.count == 0 {
            trace!(selector = %candidate.selector, "candidate matched nothing");
            return None;
        }

        let specificity = specificity(&candidate.selector);
        let stability_score = self.stability(&candidate.selector);

        let specificity_bonus = if (10..=100).contains(&specificity) { 10.0 } else { 0.0 };
        let total_score = match_count_fit(stats.count)
            + candidate.source_kind.prior()
            + 10.0 * stability_score
            + (10.0 - stats.elapsed_ms).max(0.0)
            + specificity_bonus;

        Some(RankedCandidate {
            selector: candidate.selector.clone(),
            source_kind: candidate.source_kind,
            match_count: stats.count,
            specificity,
            stability_score,
            performance_ms: stats.elapsed_ms,
            total_score,
        })
    }

    /// Stability heuristic: positional pseudo-classes and generated-looking
    /// class names make a selector brittle; semantic tags make it durable.
    fn stability(&self, selector: &str) -> f64 {
        let mut score: f64 = 1.0;

        if selector.contains(":nth-child") {
            score -= 0.3;
        }
        if selector.contains(":nth-of-type") {
            score -= 0.2;
        }

        let has_hashlike_class = class_token_re()
            .captures_iter(selector)
            .any(|cap| {
                let token = &cap[1];
                self.hash_class.is_match(token) && token.chars().any(|c| c.is_ascii_digit())
            });
        if has_hashlike_class {
            score -= 0.4;
        }

        if tag_tokens(selector)
            .iter()
            .any(|t| SEMANTIC_TAGS.contains(&t.as_str()))
        {
            score += 0.2;
        }

        score.clamp(0.0, 1.0)
    }

    /// Guarantee the chain terminates in a plain `body` fallback.
    fn append_terminal_body(&self, primary: &RankedCandidate, fallbacks: &mut Vec<RankedCandidate>) {
        let already_present =
            primary.selector == "body" || fallbacks.iter().any(|f| f.selector == "body");
        if already_present {
            return;
        }

        let candidate = SelectorCandidate::new("body", CandidateKind::Fallback, 1);
        if let Some(mut body) = self.score_candidate(&candidate) {
            body.total_score = body.total_score.min(primary.total_score);
            fallbacks.push(body);
        }
    }
}

/// Award up to 50 points for a match count inside the useful extraction
/// range. Single matches are usually containers; very large counts are
/// usually noise.
fn match_count_fit(count: usize) -> f64 {
    match count {
        0 => 0.0,
        1..=2 => 25.0,
        3..=50 => 50.0,
        _ => 50.0 * 50.0 / count as f64,
    }
}

/// CSS specificity approximation: 100 per id, 10 per class, 1 per tag token
fn specificity(selector: &str) -> u32 {
    let ids = id_token_re().find_iter(selector).count() as u32;
    let classes = class_token_re().find_iter(selector).count() as u32;
    let tags = tag_tokens(selector).len() as u32;
    100 * ids + 10 * classes + tags
}

/// Tag names appearing at the head of compound selectors
fn tag_tokens(selector: &str) -> Vec<String> {
    selector
        .split([' ', '>', '+', '~', ','])
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let head: String = part
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
                .collect();
            let starts_with_letter = head.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
            (starts_with_letter && part.starts_with(head.as_str())).then_some(head)
        })
        .collect()
}

/// Progressive simplifications of a manual selector: drop the trailing
/// compound segment, then strip pseudo-selectors.
fn simplify_selector(selector: &str) -> Vec<String> {
    let mut out = Vec::new();

    let segments: Vec<&str> = selector
        .split([' ', '>'])
        .filter(|s| !s.is_empty())
        .collect();
    if segments.len() > 1 {
        out.push(segments[..segments.len() - 1].join(" "));
    }

    if selector.contains(':') {
        let stripped: String = selector
            .split([' ', '>'])
            .filter(|s| !s.is_empty())
            .map(|seg| seg.split(':').next().unwrap_or(seg))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !stripped.is_empty() && stripped != selector {
            out.push(stripped);
        }
    }

    out.dedup();
    out
}
