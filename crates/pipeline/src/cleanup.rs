//! Tears down the repository behind a run and forgets the run.

use std::sync::Arc;

use ghrun_core::error::CoreError;
use ghrun_core::run::TestRun;
use ghrun_github::backoff::{retry, BackoffConfig};
use ghrun_github::GitPlatform;

use crate::registry::RunRegistry;

pub struct CleanupService {
    platform: Arc<dyn GitPlatform>,
    registry: Arc<RunRegistry>,
    retry: BackoffConfig,
}

impl CleanupService {
    pub fn new(platform: Arc<dyn GitPlatform>, registry: Arc<RunRegistry>, retry: BackoffConfig) -> Self {
        Self {
            platform,
            registry,
            retry,
        }
    }

    /// Delete the backing repository, then drop the registry entry.
    ///
    /// A repository that is already gone counts as deleted. The entry is
    /// kept if deletion fails so the call can be repeated.
    pub async fn delete(&self, run_id: &str) -> Result<TestRun, CoreError> {
        let run = self.registry.get(run_id).await?;

        let sharing = self
            .registry
            .runs_sharing_repository(run_id, &run.repo_full_name)
            .await;
        if !sharing.is_empty() {
            tracing::warn!(
                run_id = %run_id,
                repo = %run.repo_full_name,
                other_runs = ?sharing,
                "Deleting a repository other runs still reference",
            );
        }

        match retry(&self.retry, || {
            self.platform.delete_repository(&run.owner, &run.repo_name)
        })
        .await
        {
            Ok(()) => tracing::info!(run_id = %run_id, repo = %run.repo_full_name, "Repository deleted"),
            Err(err) if err.is_not_found() => {
                tracing::info!(run_id = %run_id, repo = %run.repo_full_name, "Repository already gone")
            }
            Err(err) => return Err(err.classify(Some(run_id))),
        }

        self.registry.remove(run_id).await
    }
}
