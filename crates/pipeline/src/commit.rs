//! Multi-file atomic commit through the git database API.
//!
//! ```text
//! 1. head_sha_before = ref(base_branch)
//! 2. base_tree       = commit(head_sha_before).tree
//! 3. blob per file   (parallel, bounded)
//! 4. tree            = base_tree + new entries
//! 5. commit          = (tree, parent: head_sha_before)
//! 6. ref(base_branch) <- commit, fast-forward only
//! ```
//!
//! Steps 1 to 5 only create content-addressed objects and are retried on
//! transient failures. Step 6 is the single compare-and-swap and is never
//! retried here: a rejected update surfaces as `Conflict` and the caller
//! starts over from step 1.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use ghrun_core::error::CoreError;
use ghrun_core::files::{validate_files, FileEntry};
use ghrun_github::backoff::{retry, retry_when, BackoffConfig};
use ghrun_github::models::TreeEntry;
use ghrun_github::{GitHubError, GitPlatform};

/// Object ids produced by one successful [`CommitPipeline::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub commit_sha: String,
    pub head_sha_before: String,
    pub tree_sha: String,
}

pub struct CommitPipeline {
    platform: Arc<dyn GitPlatform>,
    retry: BackoffConfig,
    blob_concurrency: usize,
}

impl CommitPipeline {
    pub fn new(platform: Arc<dyn GitPlatform>, retry: BackoffConfig, blob_concurrency: usize) -> Self {
        Self {
            platform,
            retry,
            blob_concurrency: blob_concurrency.max(1),
        }
    }

    /// Commit `files` on top of `base_branch` as one commit and move the
    /// branch to it.
    pub async fn commit(
        &self,
        owner: &str,
        repo: &str,
        base_branch: &str,
        files: &[FileEntry],
        message: &str,
    ) -> Result<CommitResult, CoreError> {
        validate_files(files)?;

        // A freshly auto-initialised repository can briefly report its
        // default branch as missing or empty.
        let head_sha_before = retry_when(&self.retry, is_repo_settling, || {
            self.platform.get_branch_head(owner, repo, base_branch)
        })
        .await?;

        let base = retry(&self.retry, || {
            self.platform.get_commit(owner, repo, &head_sha_before)
        })
        .await?;
        let base_tree = base.tree.sha;

        let blob_futures: Vec<_> = files
            .iter()
            .map(|file| async move {
                retry(&self.retry, || {
                    self.platform.create_blob(owner, repo, &file.content)
                })
                .await
            })
            .collect();
        let blob_shas: Vec<String> = stream::iter(blob_futures)
            .buffered(self.blob_concurrency)
            .try_collect()
            .await?;

        let entries: Vec<TreeEntry> = files
            .iter()
            .zip(&blob_shas)
            .map(|(file, sha)| TreeEntry::blob(&file.path, file.mode.as_git_mode(), sha))
            .collect();

        let tree_sha = retry(&self.retry, || {
            self.platform.create_tree(owner, repo, &base_tree, &entries)
        })
        .await?;

        let parents = [head_sha_before.clone()];
        let commit_sha = retry(&self.retry, || {
            self.platform
                .create_commit(owner, repo, message, &tree_sha, &parents)
        })
        .await?;

        self.platform
            .update_branch(owner, repo, base_branch, &commit_sha)
            .await?;

        tracing::info!(
            repo = %format!("{owner}/{repo}"),
            branch = %base_branch,
            commit_sha = %commit_sha,
            parent = %head_sha_before,
            files = files.len(),
            "Commit pushed",
        );

        Ok(CommitResult {
            commit_sha,
            head_sha_before,
            tree_sha,
        })
    }
}

fn is_repo_settling(err: &GitHubError) -> bool {
    err.is_transient() || err.is_not_found() || err.status() == Some(409)
}
