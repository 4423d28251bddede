//! The downward contract the pipeline is written against.

use std::collections::BTreeMap;

use async_trait::async_trait;
use ghrun_core::types::Timestamp;

use crate::error::GitHubError;
use crate::models::{
    ArtifactSummary, GitCommit, JobSummary, Repository, RunListQuery, TreeEntry,
    WorkflowRunSummary,
};

/// A remote Git host with an Actions-style execution engine.
///
/// Every call authenticates with one bearer credential; missing scopes
/// surface as 401/403 [`GitHubError::Api`] errors.
#[async_trait]
pub trait GitPlatform: Send + Sync {
    /// Namespace new repositories are created under (organisation, or the
    /// credential's own login).
    async fn namespace(&self) -> Result<String, GitHubError>;

    /// Create an auto-initialised repository in [`namespace`](Self::namespace).
    async fn create_repository(&self, name: &str, private: bool)
        -> Result<Repository, GitHubError>;

    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, GitHubError>;

    /// Resolve a branch to its head commit sha.
    async fn get_branch_head(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<String, GitHubError>;

    async fn get_commit(&self, owner: &str, repo: &str, sha: &str)
        -> Result<GitCommit, GitHubError>;

    /// Store file content as a blob; returns its object id.
    async fn create_blob(&self, owner: &str, repo: &str, content: &str)
        -> Result<String, GitHubError>;

    /// Create a tree overlaying `entries` on `base_tree`; returns its id.
    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String, GitHubError>;

    /// Create a commit object; returns its sha.
    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> Result<String, GitHubError>;

    /// Move `refs/heads/{branch}` to `sha` without forcing; a
    /// non-fast-forward update is rejected by the platform.
    async fn update_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHubError>;

    /// Fire a `workflow_dispatch` event. Returns the platform time at which
    /// the event was accepted.
    async fn dispatch_workflow(
        &self,
        owner: &str,
        repo: &str,
        workflow: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<Timestamp, GitHubError>;

    /// Recent runs of the repository, newest first.
    async fn list_runs(
        &self,
        owner: &str,
        repo: &str,
        query: &RunListQuery,
    ) -> Result<Vec<WorkflowRunSummary>, GitHubError>;

    async fn get_run(
        &self,
        owner: &str,
        repo: &str,
        run_id: u64,
    ) -> Result<WorkflowRunSummary, GitHubError>;

    async fn list_jobs(
        &self,
        owner: &str,
        repo: &str,
        run_id: u64,
    ) -> Result<Vec<JobSummary>, GitHubError>;

    /// Short-lived log archive link. `None` while no logs exist yet.
    async fn log_download_url(
        &self,
        owner: &str,
        repo: &str,
        run_id: u64,
    ) -> Result<Option<String>, GitHubError>;

    async fn list_artifacts(
        &self,
        owner: &str,
        repo: &str,
        run_id: u64,
    ) -> Result<Vec<ArtifactSummary>, GitHubError>;

    async fn delete_repository(&self, owner: &str, repo: &str) -> Result<(), GitHubError>;
}
