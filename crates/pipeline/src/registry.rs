//! In-memory run registry.
//!
//! Holds every [`TestRun`] the process knows about, keyed by run id, and
//! hands out a per-run async lock so that operations on one run are
//! serialised while different runs proceed concurrently.
//!
//! The registry enforces the record invariants itself: the run id never
//! changes, `workflow_run_id` is assigned at most once and never shared by
//! two runs, status never moves backwards, and a recorded conclusion is
//! never cleared or replaced.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ghrun_core::error::CoreError;
use ghrun_core::run::TestRun;
use ghrun_core::types::{RunId, WorkflowRunId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

const ENTITY: &str = "Test run";

struct Entry {
    run: TestRun,
    gate: Arc<Mutex<()>>,
}

/// Volatile store of test runs, shared as `Arc<RunRegistry>`.
#[derive(Default)]
pub struct RunRegistry {
    entries: RwLock<HashMap<RunId, Entry>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record. Fails with `Conflict` if the id is taken.
    pub async fn put(&self, run: TestRun) -> Result<(), CoreError> {
        self.put_locked(run).await.map(drop)
    }

    /// Insert a new record with its per-run lock already held by the
    /// caller, so no other operation on the run can start before the
    /// returned guard is dropped.
    pub async fn put_locked(&self, run: TestRun) -> Result<OwnedMutexGuard<()>, CoreError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&run.run_id) {
            return Err(CoreError::Conflict(format!(
                "Test run {} is already registered",
                run.run_id
            )));
        }
        if let Some(id) = run.workflow_run_id {
            ensure_unclaimed(&entries, &run.run_id, id)?;
        }
        let gate = Arc::new(Mutex::new(()));
        let guard = Arc::clone(&gate).lock_owned().await;
        entries.insert(run.run_id.clone(), Entry { run, gate });
        Ok(guard)
    }

    pub async fn get(&self, run_id: &str) -> Result<TestRun, CoreError> {
        let entries = self.entries.read().await;
        entries
            .get(run_id)
            .map(|entry| entry.run.clone())
            .ok_or_else(|| not_found(run_id))
    }

    /// All runs, oldest first.
    pub async fn list(&self) -> Vec<TestRun> {
        let entries = self.entries.read().await;
        let mut runs: Vec<TestRun> = entries.values().map(|entry| entry.run.clone()).collect();
        runs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        runs
    }

    /// Apply `mutate` to a copy of the record and store it if the result
    /// respects the record invariants. Returns the stored record.
    pub async fn update<F>(&self, run_id: &str, mutate: F) -> Result<TestRun, CoreError>
    where
        F: FnOnce(&mut TestRun),
    {
        let mut entries = self.entries.write().await;
        let current = &entries.get(run_id).ok_or_else(|| not_found(run_id))?.run;

        let mut next = current.clone();
        mutate(&mut next);
        check_transition(current, &next)?;
        if let (None, Some(id)) = (current.workflow_run_id, next.workflow_run_id) {
            ensure_unclaimed(&entries, run_id, id)?;
        }

        let entry = entries.get_mut(run_id).ok_or_else(|| not_found(run_id))?;
        entry.run = next;
        Ok(entry.run.clone())
    }

    /// Record the workflow run a dispatch resolved to.
    ///
    /// Re-assigning the same id is a no-op. A different id, or an id already
    /// held by another run, fails with `Conflict`.
    pub async fn assign_workflow_run(
        &self,
        run_id: &str,
        workflow_run_id: WorkflowRunId,
        html_url: Option<String>,
    ) -> Result<TestRun, CoreError> {
        self.update(run_id, |run| {
            run.workflow_run_id = Some(workflow_run_id);
            if let Some(url) = html_url {
                run.html_url.get_or_insert(url);
            }
        })
        .await
    }

    /// Workflow run ids already bound to some registered run.
    pub async fn claimed_workflow_runs(&self) -> HashSet<WorkflowRunId> {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter_map(|entry| entry.run.workflow_run_id)
            .collect()
    }

    pub async fn remove(&self, run_id: &str) -> Result<TestRun, CoreError> {
        let mut entries = self.entries.write().await;
        entries
            .remove(run_id)
            .map(|entry| entry.run)
            .ok_or_else(|| not_found(run_id))
    }

    /// Acquire the per-run lock. Holders of the guard are the only writers
    /// of multi-step operations on that run.
    pub async fn lock(&self, run_id: &str) -> Result<OwnedMutexGuard<()>, CoreError> {
        let gate = {
            let entries = self.entries.read().await;
            let entry = entries.get(run_id).ok_or_else(|| not_found(run_id))?;
            Arc::clone(&entry.gate)
        };
        Ok(gate.lock_owned().await)
    }

    /// Other runs (besides `run_id`) backed by the same repository.
    pub async fn runs_sharing_repository(&self, run_id: &str, repo_full_name: &str) -> Vec<RunId> {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|entry| entry.run.run_id != run_id && entry.run.repo_full_name == repo_full_name)
            .map(|entry| entry.run.run_id.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn not_found(run_id: &str) -> CoreError {
    CoreError::NotFound {
        entity: ENTITY,
        id: run_id.to_string(),
    }
}

fn ensure_unclaimed(
    entries: &HashMap<RunId, Entry>,
    run_id: &str,
    workflow_run_id: WorkflowRunId,
) -> Result<(), CoreError> {
    let holder = entries
        .values()
        .find(|entry| entry.run.run_id != run_id && entry.run.workflow_run_id == Some(workflow_run_id));
    match holder {
        Some(entry) => Err(CoreError::Conflict(format!(
            "Workflow run {workflow_run_id} already belongs to test run {}",
            entry.run.run_id
        ))),
        None => Ok(()),
    }
}

fn check_transition(before: &TestRun, after: &TestRun) -> Result<(), CoreError> {
    if after.run_id != before.run_id {
        return Err(CoreError::Internal(format!(
            "Test run {} cannot be renamed",
            before.run_id
        )));
    }
    if let Some(assigned) = before.workflow_run_id {
        if after.workflow_run_id != Some(assigned) {
            return Err(CoreError::Conflict(format!(
                "Test run {} is already bound to workflow run {assigned}",
                before.run_id
            )));
        }
    }
    if after.status < before.status {
        return Err(CoreError::Internal(format!(
            "Test run {} status cannot move from {} to {}",
            before.run_id,
            before.status.as_str(),
            after.status.as_str()
        )));
    }
    if before.conclusion.is_some() && after.conclusion != before.conclusion {
        return Err(CoreError::Internal(format!(
            "Test run {} conclusion is already recorded",
            before.run_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};
    use ghrun_core::run::{NewTestRun, RunConclusion, RunStatus};

    use super::*;

    fn run(id: &str, offset_secs: i64) -> TestRun {
        let now = Utc::now() + Duration::seconds(offset_secs);
        TestRun::new(
            NewTestRun {
                run_id: id.to_string(),
                owner: "octo".into(),
                repo_name: "selenium-test-a".into(),
                repo_full_name: "octo/selenium-test-a".into(),
                default_branch: "main".into(),
                workflow: "run-tests.yml".into(),
                head_sha: "c1".into(),
                dispatched_at: now,
            },
            now,
        )
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let registry = RunRegistry::new();
        assert_matches!(
            registry.get("nope").await,
            Err(CoreError::NotFound { entity: "Test run", id }) if id == "nope"
        );
    }

    #[tokio::test]
    async fn duplicate_put_conflicts() {
        let registry = RunRegistry::new();
        registry.put(run("a", 0)).await.unwrap();
        assert_matches!(registry.put(run("a", 0)).await, Err(CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_is_ordered_by_creation() {
        let registry = RunRegistry::new();
        registry.put(run("late", 10)).await.unwrap();
        registry.put(run("early", 0)).await.unwrap();
        let ids: Vec<String> = registry.list().await.into_iter().map(|r| r.run_id).collect();
        assert_eq!(ids, ["early", "late"]);
    }

    #[tokio::test]
    async fn workflow_run_is_assigned_once() {
        let registry = RunRegistry::new();
        registry.put(run("a", 0)).await.unwrap();

        let assigned = registry.assign_workflow_run("a", 7, Some("u".into())).await.unwrap();
        assert_eq!(assigned.workflow_run_id, Some(7));

        // Same id again is fine; a different one is not.
        registry.assign_workflow_run("a", 7, None).await.unwrap();
        assert_matches!(
            registry.assign_workflow_run("a", 8, None).await,
            Err(CoreError::Conflict(_))
        );
        assert_eq!(registry.get("a").await.unwrap().workflow_run_id, Some(7));
    }

    #[tokio::test]
    async fn workflow_run_cannot_be_shared() {
        let registry = RunRegistry::new();
        registry.put(run("a", 0)).await.unwrap();
        registry.put(run("b", 1)).await.unwrap();
        registry.assign_workflow_run("a", 7, None).await.unwrap();

        assert_matches!(
            registry.assign_workflow_run("b", 7, None).await,
            Err(CoreError::Conflict(_))
        );
        assert_eq!(
            registry.claimed_workflow_runs().await,
            HashSet::from([7])
        );
    }

    #[tokio::test]
    async fn status_never_moves_backwards() {
        let registry = RunRegistry::new();
        registry.put(run("a", 0)).await.unwrap();
        registry
            .update("a", |r| {
                r.status = RunStatus::Completed;
                r.conclusion = Some(RunConclusion::Success);
            })
            .await
            .unwrap();

        assert_matches!(
            registry.update("a", |r| r.status = RunStatus::InProgress).await,
            Err(CoreError::Internal(_))
        );
        assert_matches!(
            registry.update("a", |r| r.conclusion = None).await,
            Err(CoreError::Internal(_))
        );
        let stored = registry.get("a").await.unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert_eq!(stored.conclusion, Some(RunConclusion::Success));
    }

    #[tokio::test]
    async fn remove_then_get_is_not_found() {
        let registry = RunRegistry::new();
        registry.put(run("a", 0)).await.unwrap();
        registry.remove("a").await.unwrap();
        assert!(registry.is_empty().await);
        assert_matches!(registry.get("a").await, Err(CoreError::NotFound { .. }));
        assert_matches!(registry.remove("a").await, Err(CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn lock_serialises_same_run_only() {
        let registry = RunRegistry::new();
        registry.put(run("a", 0)).await.unwrap();
        registry.put(run("b", 0)).await.unwrap();

        let _held = registry.lock("a").await.unwrap();
        // Another run's lock is independent.
        let _other = registry.lock("b").await.unwrap();

        let second = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            registry.lock("a"),
        )
        .await;
        assert!(second.is_err(), "same-run lock should still be held");
    }

    #[tokio::test]
    async fn put_locked_holds_the_gate_from_insertion() {
        let registry = RunRegistry::new();
        let guard = registry.put_locked(run("a", 0)).await.unwrap();

        assert!(registry.get("a").await.is_ok());
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            registry.lock("a"),
        )
        .await;
        assert!(blocked.is_err(), "record is visible but its gate is held");

        drop(guard);
        assert!(registry.lock("a").await.is_ok());
        assert_matches!(registry.put_locked(run("a", 0)).await, Err(CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn finds_runs_sharing_a_repository() {
        let registry = RunRegistry::new();
        registry.put(run("a", 0)).await.unwrap();
        registry.put(run("b", 1)).await.unwrap();
        assert_eq!(
            registry.runs_sharing_repository("a", "octo/selenium-test-a").await,
            ["b"]
        );
    }
}
