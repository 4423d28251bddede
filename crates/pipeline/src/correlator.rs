//! Maps an accepted dispatch to the workflow run it created.
//!
//! The dispatch endpoint returns no run id, so the run is found by
//! polling: a candidate must carry the commit sha produced for this test
//! run and must have been created no earlier than the dispatch. Runs
//! already bound to another registry entry are skipped, and among the
//! remaining matches the oldest wins. Two dispatches of the very same
//! commit within the same second can still be told apart only by order.

use std::collections::HashSet;
use std::sync::Arc;

use ghrun_core::error::CoreError;
use ghrun_core::run::{RunConclusion, RunStatus, TestRun};
use ghrun_core::types::{Timestamp, WorkflowRunId};
use ghrun_github::backoff::BackoffConfig;
use ghrun_github::models::{RunListQuery, WorkflowRunSummary};
use ghrun_github::GitPlatform;

use crate::dispatcher::truncate_to_seconds;
use crate::registry::RunRegistry;

const DISPATCH_EVENT: &str = "workflow_dispatch";
const PAGE_SIZE: u8 = 30;

pub struct RunCorrelator {
    platform: Arc<dyn GitPlatform>,
    backoff: BackoffConfig,
}

impl RunCorrelator {
    pub fn new(platform: Arc<dyn GitPlatform>, backoff: BackoffConfig) -> Self {
        Self { platform, backoff }
    }

    /// Poll until the run behind `run` shows up and bind it in the
    /// registry, or fail with `CorrelationTimeout` once the attempt budget
    /// is spent.
    pub async fn correlate(
        &self,
        run: &TestRun,
        registry: &RunRegistry,
    ) -> Result<TestRun, CoreError> {
        let attempts = self.backoff.max_attempts.max(1);
        let delays = self.backoff.delays();

        for attempt in 1..=attempts {
            if let Some(bound) = self.poll_once(run, registry).await? {
                tracing::info!(
                    run_id = %run.run_id,
                    workflow_run_id = bound.workflow_run_id,
                    attempt,
                    "Workflow run correlated",
                );
                return Ok(bound);
            }

            if let Some(delay) = delays.get(attempt as usize - 1) {
                tracing::debug!(
                    run_id = %run.run_id,
                    commit_sha = %run.head_sha,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Workflow run not visible yet",
                );
                tokio::time::sleep(*delay).await;
            }
        }

        tracing::warn!(
            run_id = %run.run_id,
            commit_sha = %run.head_sha,
            attempts,
            "Gave up waiting for workflow run",
        );
        Err(CoreError::CorrelationTimeout {
            run_id: run.run_id.clone(),
            commit_sha: run.head_sha.clone(),
            attempts,
        })
    }

    /// One listing pass. Returns the bound record, or `None` if no
    /// acceptable run is visible yet.
    ///
    /// Transient listing failures count as "not visible yet".
    pub async fn poll_once(
        &self,
        run: &TestRun,
        registry: &RunRegistry,
    ) -> Result<Option<TestRun>, CoreError> {
        let current = registry.get(&run.run_id).await?;
        if current.is_correlated() {
            return Ok(Some(current));
        }

        let query = RunListQuery {
            head_sha: Some(run.head_sha.clone()),
            event: Some(DISPATCH_EVENT.to_string()),
            per_page: Some(PAGE_SIZE),
            ..Default::default()
        };
        let candidates = match self
            .platform
            .list_runs(&run.owner, &run.repo_name, &query)
            .await
        {
            Ok(runs) => runs,
            Err(err) if err.is_transient() => {
                tracing::warn!(run_id = %run.run_id, error = %err, "Listing workflow runs failed");
                return Ok(None);
            }
            Err(err) => return Err(err.classify(Some(&run.run_id))),
        };

        let mut claimed = registry.claimed_workflow_runs().await;
        while let Some(found) = select_run(&candidates, &run.head_sha, run.dispatched_at, &claimed) {
            match registry
                .assign_workflow_run(&run.run_id, found.id, Some(found.html_url.clone()))
                .await
            {
                Ok(_) => {
                    let status = RunStatus::from_remote(&found.status);
                    let conclusion = found.conclusion.as_deref().map(RunConclusion::from_remote);
                    let now = chrono::Utc::now();
                    let bound = registry
                        .update(&run.run_id, |r| {
                            r.apply_remote(status, conclusion, now);
                        })
                        .await?;
                    return Ok(Some(bound));
                }
                // Claimed by a concurrent correlation between listing and binding.
                Err(CoreError::Conflict(_)) => {
                    claimed.insert(found.id);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }
}

/// Pick the workflow run for a dispatch of `commit_sha` accepted at
/// `dispatched_at`.
pub fn select_run<'a>(
    runs: &'a [WorkflowRunSummary],
    commit_sha: &str,
    dispatched_at: Timestamp,
    claimed: &HashSet<WorkflowRunId>,
) -> Option<&'a WorkflowRunSummary> {
    let not_before = truncate_to_seconds(dispatched_at);
    runs.iter()
        .filter(|run| run.head_sha == commit_sha)
        .filter(|run| truncate_to_seconds(run.created_at) >= not_before)
        .filter(|run| !claimed.contains(&run.id))
        .min_by_key(|run| (run.created_at, run.id))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn at(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn summary(id: u64, sha: &str, created: Timestamp) -> WorkflowRunSummary {
        WorkflowRunSummary {
            id,
            status: "queued".into(),
            conclusion: None,
            head_sha: sha.into(),
            event: DISPATCH_EVENT.into(),
            created_at: created,
            updated_at: None,
            html_url: format!("https://github.com/octo/r/actions/runs/{id}"),
        }
    }

    #[test]
    fn ignores_other_commits() {
        let runs = [summary(1, "other", at(5))];
        assert!(select_run(&runs, "mine", at(0), &HashSet::new()).is_none());
    }

    #[test]
    fn ignores_runs_created_before_dispatch() {
        let runs = [summary(1, "mine", at(-1)), summary(2, "mine", at(0))];
        let found = select_run(&runs, "mine", at(0), &HashSet::new()).unwrap();
        assert_eq!(found.id, 2);
    }

    #[test]
    fn same_second_counts_as_after_dispatch() {
        let runs = [summary(1, "mine", at(3))];
        let dispatched = at(3) + Duration::milliseconds(900);
        assert!(select_run(&runs, "mine", dispatched, &HashSet::new()).is_some());
    }

    #[test]
    fn prefers_oldest_unclaimed_match() {
        // Newest first, as the platform lists them.
        let runs = [
            summary(30, "mine", at(4)),
            summary(20, "mine", at(2)),
            summary(10, "mine", at(1)),
        ];
        let claimed = HashSet::from([10]);
        assert_eq!(select_run(&runs, "mine", at(0), &claimed).unwrap().id, 20);
    }

    #[test]
    fn everything_claimed_yields_none() {
        let runs = [summary(10, "mine", at(1))];
        assert!(select_run(&runs, "mine", at(0), &HashSet::from([10])).is_none());
    }
}
