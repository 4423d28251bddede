//! Upward interface of the relay: create, inspect and delete test runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use ghrun_core::error::CoreError;
use ghrun_core::files::{validate_files, FileEntry};
use ghrun_core::naming::{repo_name_for_test, sanitize_repo_name};
use ghrun_core::run::{NewTestRun, RunConclusion, RunStatus, TestRun};
use ghrun_core::types::{new_run_id, RunId, Timestamp, WorkflowRunId};
use ghrun_core::workflow_template::{default_files, WORKFLOW_FILE};
use ghrun_github::models::ArtifactSummary;
use ghrun_github::GitPlatform;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::cleanup::CleanupService;
use crate::commit::{CommitPipeline, CommitResult};
use crate::config::PipelineConfig;
use crate::correlator::RunCorrelator;
use crate::dispatcher::WorkflowDispatcher;
use crate::fetcher::{RunLogs, StatusAndLogFetcher};
use crate::provisioner::{ProvisionedRepository, RepositoryProvisioner};
use crate::registry::RunRegistry;

// ---------------------------------------------------------------------------
// Requests and views
// ---------------------------------------------------------------------------

/// Commit an arbitrary file set and dispatch a workflow on it.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRunRequest {
    /// Defaults to a name derived from the generated run id.
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub private: Option<bool>,
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub commit_message: Option<String>,
    /// Workflow file name or numeric id.
    #[serde(default = "default_workflow")]
    pub workflow: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
}

fn default_workflow() -> String {
    WORKFLOW_FILE.to_string()
}

/// Run a single Selenium script with the bundled workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptRunRequest {
    pub test_name: String,
    pub script: String,
    #[serde(default)]
    pub private: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedRun {
    pub run_id: RunId,
    pub workflow_run_id: Option<WorkflowRunId>,
    pub repo_full_name: String,
    pub commit_sha: String,
    pub status: RunStatus,
    pub html_url: Option<String>,
}

impl From<&TestRun> for CreatedRun {
    fn from(run: &TestRun) -> Self {
        Self {
            run_id: run.run_id.clone(),
            workflow_run_id: run.workflow_run_id,
            repo_full_name: run.repo_full_name.clone(),
            commit_sha: run.head_sha.clone(),
            status: run.status,
            html_url: run.html_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatusView {
    pub run_id: RunId,
    pub workflow_run_id: Option<WorkflowRunId>,
    pub status: RunStatus,
    pub conclusion: Option<RunConclusion>,
    pub html_url: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&TestRun> for RunStatusView {
    fn from(run: &TestRun) -> Self {
        Self {
            run_id: run.run_id.clone(),
            workflow_run_id: run.workflow_run_id,
            status: run.status,
            conclusion: run.conclusion,
            html_url: run.html_url.clone(),
            created_at: run.created_at,
            updated_at: run.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct TestRunService {
    registry: Arc<RunRegistry>,
    provisioner: RepositoryProvisioner,
    commits: CommitPipeline,
    dispatcher: WorkflowDispatcher,
    correlator: Arc<RunCorrelator>,
    fetcher: StatusAndLogFetcher,
    cleanup: CleanupService,
    config: PipelineConfig,
}

impl TestRunService {
    pub fn new(
        platform: Arc<dyn GitPlatform>,
        registry: Arc<RunRegistry>,
        config: PipelineConfig,
    ) -> Self {
        let correlator = Arc::new(RunCorrelator::new(
            Arc::clone(&platform),
            config.correlation.clone(),
        ));
        Self {
            provisioner: RepositoryProvisioner::new(
                Arc::clone(&platform),
                config.request_retry.clone(),
            ),
            commits: CommitPipeline::new(
                Arc::clone(&platform),
                config.request_retry.clone(),
                config.blob_concurrency,
            ),
            dispatcher: WorkflowDispatcher::new(
                Arc::clone(&platform),
                config.dispatch_retry.clone(),
                config.trace_input.clone(),
            ),
            fetcher: StatusAndLogFetcher::new(
                Arc::clone(&platform),
                Arc::clone(&registry),
                Arc::clone(&correlator),
                config.request_retry.clone(),
            ),
            cleanup: CleanupService::new(platform, Arc::clone(&registry), config.request_retry.clone()),
            correlator,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    /// Provision, commit, dispatch and correlate.
    ///
    /// The run is registered as soon as the dispatch is accepted. If
    /// correlation then times out the record stays registered, the error
    /// carries its run id, and a later status read retries correlation.
    pub async fn create_and_run(&self, request: CreateRunRequest) -> Result<CreatedRun, CoreError> {
        validate_files(&request.files)?;
        if request.workflow.trim().is_empty() {
            return Err(CoreError::Validation("Workflow must not be empty".into()));
        }

        let run_id = new_run_id();
        let repo_name = match request.repo_name.as_deref() {
            Some(name) => sanitize_repo_name(name)?,
            None => repo_name_for_test(run_id.get(..8).unwrap_or(run_id.as_str()))?,
        };

        let span = tracing::info_span!("create_and_run", run_id = %run_id, repo = %repo_name);
        self.run_pipeline(run_id, repo_name, request)
            .instrument(span)
            .await
    }

    /// Commit `script` together with the bundled workflow into the
    /// repository named after the test, then run it.
    pub async fn create_from_script(&self, request: ScriptRunRequest) -> Result<CreatedRun, CoreError> {
        if request.test_name.trim().is_empty() {
            return Err(CoreError::Validation("Test name must not be empty".into()));
        }
        if request.script.trim().is_empty() {
            return Err(CoreError::Validation("Script must not be empty".into()));
        }

        let repo_name = repo_name_for_test(&request.test_name)?;
        self.create_and_run(CreateRunRequest {
            repo_name: Some(repo_name),
            private: request.private,
            files: default_files(&request.script),
            commit_message: Some(format!("Add Selenium test {}", request.test_name.trim())),
            workflow: default_workflow(),
            inputs: BTreeMap::new(),
        })
        .await
    }

    pub async fn get_status(&self, run_id: &str) -> Result<RunStatusView, CoreError> {
        let _guard = self.registry.lock(run_id).await?;
        let run = self.fetcher.refresh_status(run_id).await?;
        Ok(RunStatusView::from(&run))
    }

    pub async fn get_logs(&self, run_id: &str) -> Result<RunLogs, CoreError> {
        let _guard = self.registry.lock(run_id).await?;
        self.fetcher.fetch_logs(run_id).await
    }

    pub async fn get_artifacts(&self, run_id: &str) -> Result<Vec<ArtifactSummary>, CoreError> {
        self.fetcher.fetch_artifacts(run_id).await
    }

    /// Every registered run, oldest first.
    pub async fn list_runs(&self) -> Vec<TestRun> {
        self.registry.list().await
    }

    pub async fn delete_run(&self, run_id: &str) -> Result<(), CoreError> {
        let _guard = self.registry.lock(run_id).await?;
        self.cleanup.delete(run_id).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn run_pipeline(
        &self,
        run_id: RunId,
        repo_name: String,
        request: CreateRunRequest,
    ) -> Result<CreatedRun, CoreError> {
        let private = request.private.unwrap_or(self.config.private_repos);
        let repo = self
            .provisioner
            .provision(&repo_name, private)
            .await
            .map_err(|err| err.in_run(&run_id))?;

        let message = request
            .commit_message
            .clone()
            .unwrap_or_else(|| format!("Add test run {run_id}"));
        let commit = self
            .commit_with_retries(&repo, &request.files, &message, &run_id)
            .await?;

        let dispatched_at = self
            .dispatcher
            .dispatch(
                &repo.owner,
                &repo.name,
                &request.workflow,
                &repo.default_branch,
                &run_id,
                &request.inputs,
            )
            .await?;

        let record = TestRun::new(
            NewTestRun {
                run_id: run_id.clone(),
                owner: repo.owner,
                repo_name: repo.name,
                repo_full_name: repo.full_name,
                default_branch: repo.default_branch,
                workflow: request.workflow,
                head_sha: commit.commit_sha,
                dispatched_at,
            },
            Utc::now(),
        );
        let _guard = self.registry.put_locked(record.clone()).await?;
        let bound = self.correlator.correlate(&record, &self.registry).await?;
        Ok(CreatedRun::from(&bound))
    }

    /// Run the commit pipeline, starting over from a fresh head when the
    /// branch moved between reading it and updating it.
    async fn commit_with_retries(
        &self,
        repo: &ProvisionedRepository,
        files: &[FileEntry],
        message: &str,
        run_id: &str,
    ) -> Result<CommitResult, CoreError> {
        let mut restarts = 0;
        loop {
            match self
                .commits
                .commit(&repo.owner, &repo.name, &repo.default_branch, files, message)
                .await
            {
                Ok(commit) => return Ok(commit),
                Err(CoreError::Conflict(reason)) if restarts < self.config.conflict_retries => {
                    restarts += 1;
                    tracing::warn!(
                        repo = %repo.full_name,
                        branch = %repo.default_branch,
                        attempt = restarts,
                        reason = %reason,
                        "Branch moved during commit, rebuilding on the new head",
                    );
                }
                Err(err) => return Err(err.in_run(run_id)),
            }
        }
    }
}
