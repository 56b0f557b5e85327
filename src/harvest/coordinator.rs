use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::analysis::ExecutionPlan;
use crate::config::HarvestConfig;
use crate::error::{HarvestError, HarvestResult};
use crate::harvest::{
    ConsolidatedResult, ExtractionSource, HarvestSession, ResultConsolidator, SessionStatus,
    SourceResult,
};
use crate::selector::SelectorStrategy;
use crate::utils::generate_id;

/// Opens harvest sessions, dispatches one extraction task per planned
/// source, and collects results as they arrive.
///
/// Sessions live in a sharded map so results may be submitted concurrently
/// from independent transports; each session is mutated under its own map
/// entry. Sessions are fully independent of one another.
pub struct HarvestCoordinator {
    sessions: DashMap<String, HarvestSession>,
    consolidator: ResultConsolidator,
    retention: chrono::Duration,
    default_timeout: Duration,
}

impl HarvestCoordinator {
    pub fn new(config: &HarvestConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            consolidator: ResultConsolidator::new(),
            retention: chrono::Duration::seconds(config.session_retention_secs as i64),
            default_timeout: Duration::from_millis(config.default_source_timeout_ms),
        }
    }

    /// Open a session for a plan; expected sources are the plan's
    /// extraction-capable roles.
    pub fn start_harvest(&self, plan: &ExecutionPlan) -> String {
        let session_id = generate_id();
        let expected = plan
            .extraction_sources()
            .iter()
            .map(|role| role.id().to_string())
            .collect();

        let session = HarvestSession::new(session_id.clone(), expected);
        info!(
            session_id = %session_id,
            expected = session.expected_source_ids.len(),
            "harvest session opened"
        );
        self.sessions.insert(session_id.clone(), session);
        session_id
    }

    /// Record one source's result and run the completion check.
    ///
    /// Duplicate reports from the same source id overwrite, they do not
    /// accumulate. A result arriving after the session settled is logged
    /// and ignored.
    pub fn submit_source_result(
        &self,
        session_id: &str,
        result: SourceResult,
    ) -> HarvestResult<SessionStatus> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| HarvestError::session_not_found(session_id))?;

        if session.status != SessionStatus::Active {
            warn!(
                session_id,
                source_id = %result.source_id,
                "result for settled session ignored"
            );
            return Ok(session.status);
        }

        debug!(
            session_id,
            source_id = %result.source_id,
            success = result.success,
            items = result.items.len(),
            "source result received"
        );
        session
            .received_results
            .insert(result.source_id.clone(), result);

        if session.is_saturated() {
            self.settle(&mut session);
        }
        Ok(session.status)
    }

    /// Complete a session before all expected sources reported.
    ///
    /// Used by timeout and cleanup paths; requires at least one received
    /// result.
    pub fn force_complete(&self, session_id: &str) -> HarvestResult<SessionStatus> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| HarvestError::session_not_found(session_id))?;

        match session.status {
            SessionStatus::Active => {
                if session.received_results.is_empty() {
                    return Err(HarvestError::NoResults {
                        session_id: session_id.to_string(),
                    });
                }
                info!(
                    session_id,
                    received = session.received_results.len(),
                    expected = session.expected_source_ids.len(),
                    "force-completing session"
                );
                self.settle(&mut session);
                Ok(session.status)
            }
            settled => Ok(settled),
        }
    }

    pub fn get_consolidated_result(&self, session_id: &str) -> HarvestResult<ConsolidatedResult> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| HarvestError::session_not_found(session_id))?;

        match (&session.status, &session.consolidated) {
            (SessionStatus::Completed, Some(result)) => Ok(result.clone()),
            _ => Err(HarvestError::SessionNotCompleted {
                session_id: session_id.to_string(),
            }),
        }
    }

    pub fn session_status(&self, session_id: &str) -> HarvestResult<SessionStatus> {
        self.sessions
            .get(session_id)
            .map(|s| s.status)
            .ok_or_else(|| HarvestError::session_not_found(session_id))
    }

    /// Drop sessions older than the retention window. Returns how many were
    /// purged.
    pub fn purge_stale(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.started_at > cutoff);
        let purged = before - self.sessions.len();
        if purged > 0 {
            info!(purged, "purged stale harvest sessions");
        }
        purged
    }

    /// Dispatch the given sources for a plan and consolidate their results.
    ///
    /// All sources settle independently: a failing or slow source is recorded
    /// as a failed result, never cancelling its siblings. Each source is
    /// bounded by the plan's timeout limit.
    pub async fn run_harvest(
        &self,
        plan: &ExecutionPlan,
        strategy: &SelectorStrategy,
        sources: &[Arc<dyn ExtractionSource>],
    ) -> HarvestResult<ConsolidatedResult> {
        let session_id = self.start_harvest(plan);

        let timeout = match plan.resource_plan.limits.timeout_ms {
            0 => self.default_timeout,
            ms => Duration::from_millis(ms),
        };

        let tasks = sources.iter().map(|source| {
            let source = Arc::clone(source);
            async move {
                let source_id = source.id().to_string();
                match tokio::time::timeout(timeout, source.extract(strategy, plan)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(source_id = %source_id, ?timeout, "source timed out");
                        SourceResult::failed(
                            &source_id,
                            vec![format!("timed out after {}ms", timeout.as_millis())],
                            timeout.as_millis() as u64,
                        )
                    }
                }
            }
        });

        let results = join_all(tasks).await;
        for result in results {
            self.submit_source_result(&session_id, result)?;
        }

        // fewer sources wired than the plan expects: close out what we have
        if self.session_status(&session_id)? == SessionStatus::Active {
            self.force_complete(&session_id)?;
        }

        self.get_consolidated_result(&session_id)
    }

    /// Consolidate and settle a session; called with the session entry held.
    fn settle(&self, session: &mut HarvestSession) {
        match self.consolidator.consolidate(&session.received_results) {
            Ok(result) => {
                info!(
                    session_id = %session.id,
                    items = result.items.len(),
                    sources_failed = result.sources_failed,
                    "harvest session completed"
                );
                session.consolidated = Some(result);
                session.status = SessionStatus::Completed;
            }
            Err(e) => {
                error!(session_id = %session.id, error = %e, "consolidation failed");
                session.failure = Some(e.to_string());
                session.status = SessionStatus::Failed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::complexity::ComplexityAnalyzer;
    use crate::analysis::{HarvestRequest, StrategyPlanner};
    use crate::config::PlannerConfig;
    use crate::probe::{DomProbe, StaticProbe};
    use crate::selector::{CandidateKind, RankedCandidate};
    use async_trait::async_trait;
    use serde_json::json;

    fn coordinator() -> HarvestCoordinator {
        HarvestCoordinator::new(&HarvestConfig::default())
    }

    fn plan() -> ExecutionPlan {
        let snapshot = StaticProbe::new("<html><body><p>x</p></body></html>")
            .page_snapshot()
            .unwrap();
        let profile =
            ComplexityAnalyzer::new().analyze(&snapshot, None, &HarvestRequest::automatic());
        StrategyPlanner::new(PlannerConfig::default()).plan(&profile)
    }

    fn item(title: &str) -> serde_json::Value {
        json!({ "title": title })
    }

    fn start_session_with_expected(
        coordinator: &HarvestCoordinator,
        expected: &[&str],
    ) -> String {
        let session_id = generate_id();
        let session = HarvestSession::new(
            session_id.clone(),
            expected.iter().map(|s| s.to_string()).collect(),
        );
        coordinator.sessions.insert(session_id.clone(), session);
        session_id
    }

    #[test]
    fn test_completes_exactly_once_regardless_of_arrival_order() {
        let orders: Vec<Vec<&str>> = vec![
            vec!["a", "b", "c"],
            vec!["a", "c", "b"],
            vec!["b", "a", "c"],
            vec!["b", "c", "a"],
            vec!["c", "a", "b"],
            vec!["c", "b", "a"],
        ];

        for order in orders {
            let coordinator = coordinator();
            let session_id = start_session_with_expected(&coordinator, &["a", "b", "c"]);

            let mut completions = 0;
            for (i, source_id) in order.iter().enumerate() {
                let status = coordinator
                    .submit_source_result(
                        &session_id,
                        SourceResult::ok(*source_id, vec![item(source_id)], 1),
                    )
                    .unwrap();
                if status == SessionStatus::Completed {
                    completions += 1;
                    assert_eq!(i, 2, "completed before all sources reported");
                }
            }
            assert_eq!(completions, 1, "order {:?}", order);
            assert!(coordinator.get_consolidated_result(&session_id).is_ok());
        }
    }

    #[test]
    fn test_duplicate_source_reports_overwrite() {
        let coordinator = coordinator();
        let session_id = start_session_with_expected(&coordinator, &["a", "b"]);

        coordinator
            .submit_source_result(&session_id, SourceResult::ok("a", vec![item("first")], 1))
            .unwrap();
        coordinator
            .submit_source_result(&session_id, SourceResult::ok("a", vec![item("second")], 1))
            .unwrap();

        let status = coordinator
            .submit_source_result(&session_id, SourceResult::ok("b", vec![item("b")], 1))
            .unwrap();
        assert_eq!(status, SessionStatus::Completed);

        let result = coordinator.get_consolidated_result(&session_id).unwrap();
        assert_eq!(result.items.len(), 2);
        assert!(result
            .items
            .iter()
            .any(|i| i["title"] == "second"));
        assert!(!result.items.iter().any(|i| i["title"] == "first"));
    }

    #[test]
    fn test_unknown_session_rejected() {
        let coordinator = coordinator();
        let err = coordinator
            .submit_source_result("missing", SourceResult::ok("a", vec![], 1))
            .unwrap_err();
        assert!(matches!(err, HarvestError::SessionNotFound { .. }));

        assert!(matches!(
            coordinator.force_complete("missing").unwrap_err(),
            HarvestError::SessionNotFound { .. }
        ));
    }

    #[test]
    fn test_result_before_completion_unavailable() {
        let coordinator = coordinator();
        let session_id = start_session_with_expected(&coordinator, &["a", "b"]);

        coordinator
            .submit_source_result(&session_id, SourceResult::ok("a", vec![item("a")], 1))
            .unwrap();

        assert!(matches!(
            coordinator.get_consolidated_result(&session_id).unwrap_err(),
            HarvestError::SessionNotCompleted { .. }
        ));
    }

    #[test]
    fn test_force_complete_requires_results() {
        let coordinator = coordinator();
        let session_id = start_session_with_expected(&coordinator, &["a", "b"]);

        // zero received results: refused
        assert!(matches!(
            coordinator.force_complete(&session_id).unwrap_err(),
            HarvestError::NoResults { .. }
        ));

        // one received result: completes and consolidates it
        coordinator
            .submit_source_result(&session_id, SourceResult::ok("a", vec![item("only")], 1))
            .unwrap();
        let status = coordinator.force_complete(&session_id).unwrap();
        assert_eq!(status, SessionStatus::Completed);

        let result = coordinator.get_consolidated_result(&session_id).unwrap();
        assert_eq!(result.items.len(), 1);
    }

    #[test]
    fn test_late_result_ignored_after_completion() {
        let coordinator = coordinator();
        let session_id = start_session_with_expected(&coordinator, &["a"]);

        coordinator
            .submit_source_result(&session_id, SourceResult::ok("a", vec![item("a")], 1))
            .unwrap();
        let before = coordinator.get_consolidated_result(&session_id).unwrap();

        let status = coordinator
            .submit_source_result(&session_id, SourceResult::ok("late", vec![item("late")], 1))
            .unwrap();
        assert_eq!(status, SessionStatus::Completed);

        let after = coordinator.get_consolidated_result(&session_id).unwrap();
        assert_eq!(before.items.len(), after.items.len());
    }

    #[test]
    fn test_purge_stale_sessions() {
        let coordinator = coordinator();
        let old_id = start_session_with_expected(&coordinator, &["a"]);
        coordinator
            .sessions
            .get_mut(&old_id)
            .unwrap()
            .started_at = Utc::now() - chrono::Duration::hours(2);
        let fresh_id = start_session_with_expected(&coordinator, &["a"]);

        assert_eq!(coordinator.purge_stale(), 1);
        assert!(coordinator.session_status(&old_id).is_err());
        assert!(coordinator.session_status(&fresh_id).is_ok());
    }

    struct StubSource {
        id: String,
        items: Vec<serde_json::Value>,
        fail: bool,
        delay: Duration,
    }

    #[async_trait]
    impl ExtractionSource for StubSource {
        fn id(&self) -> &str {
            &self.id
        }

        async fn extract(
            &self,
            _strategy: &SelectorStrategy,
            _plan: &ExecutionPlan,
        ) -> SourceResult {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                SourceResult::failed(&self.id, vec!["stub failure".to_string()], 1)
            } else {
                SourceResult::ok(&self.id, self.items.clone(), 1)
            }
        }
    }

    fn stub(id: &str, items: Vec<serde_json::Value>, fail: bool) -> Arc<dyn ExtractionSource> {
        Arc::new(StubSource {
            id: id.to_string(),
            items,
            fail,
            delay: Duration::from_millis(0),
        })
    }

    fn strategy() -> SelectorStrategy {
        SelectorStrategy {
            primary: RankedCandidate {
                selector: "body".to_string(),
                source_kind: CandidateKind::Fallback,
                match_count: 1,
                specificity: 1,
                stability_score: 1.0,
                performance_ms: 1.0,
                total_score: 50.0,
            },
            fallbacks: Vec::new(),
            is_manual: false,
            confidence: 0.5,
        }
    }

    #[tokio::test]
    async fn test_run_harvest_all_settle() {
        let coordinator = coordinator();
        let plan = plan();

        // one source succeeds with duplicates, one fails; the failure must
        // not suppress the successful sibling
        let mut items: Vec<serde_json::Value> = (0..8).map(|i| item(&format!("t{}", i))).collect();
        items.push(item("t0"));
        items.push(item("t1"));

        let sources = vec![stub("fast", items, false), stub("reliable", vec![], true)];
        let result = coordinator
            .run_harvest(&plan, &strategy(), &sources)
            .await
            .unwrap();

        assert_eq!(result.items.len(), 8);
        assert_eq!(result.sources_failed, 1);
        assert_eq!(result.sources_succeeded, 1);
        assert!((result.quality.retention_rate - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_run_harvest_times_out_stalled_source() {
        let mut config = HarvestConfig::default();
        config.default_source_timeout_ms = 50;
        let coordinator = HarvestCoordinator::new(&config);

        let mut plan = plan();
        plan.resource_plan.limits.timeout_ms = 50;

        let stalled: Arc<dyn ExtractionSource> = Arc::new(StubSource {
            id: "stalled".to_string(),
            items: vec![item("never")],
            fail: false,
            delay: Duration::from_secs(10),
        });
        let sources = vec![stub("fast", vec![item("ok")], false), stalled];

        let result = coordinator
            .run_harvest(&plan, &strategy(), &sources)
            .await
            .unwrap();

        assert_eq!(result.sources_failed, 1);
        assert_eq!(result.items.len(), 1);
        assert!(result.errors.iter().any(|e| e.contains("timed out")));
    }

    #[tokio::test]
    async fn test_concurrent_sessions_are_independent() {
        let coordinator = Arc::new(coordinator());
        let plan = plan();

        let a = {
            let coordinator = Arc::clone(&coordinator);
            let plan = plan.clone();
            let sources = vec![stub("fast", vec![item("a")], false)];
            tokio::spawn(async move {
                coordinator.run_harvest(&plan, &strategy(), &sources).await
            })
        };
        let b = {
            let coordinator = Arc::clone(&coordinator);
            let plan = plan.clone();
            let sources = vec![stub("fast", vec![item("b1")], false), stub("smart", vec![item("b2")], false)];
            tokio::spawn(async move {
                coordinator.run_harvest(&plan, &strategy(), &sources).await
            })
        };

        let result_a = a.await.unwrap().unwrap();
        let result_b = b.await.unwrap().unwrap();

        assert_eq!(result_a.items.len(), 1);
        assert_eq!(result_b.items.len(), 2);
    }
}
