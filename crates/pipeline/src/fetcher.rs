//! Status refresh, job/log detail and artifact listing for registered runs.

use std::sync::Arc;

use chrono::Utc;
use ghrun_core::error::CoreError;
use ghrun_core::run::{RunConclusion, RunStatus, TestRun};
use ghrun_github::backoff::{retry, BackoffConfig};
use ghrun_github::models::{ArtifactSummary, JobSummary};
use ghrun_github::GitPlatform;
use serde::Serialize;

use crate::correlator::RunCorrelator;
use crate::registry::RunRegistry;

/// Job and step detail plus a link to the full log archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunLogs {
    pub jobs: Vec<JobSummary>,
    /// Short-lived archive URL; `None` until the platform has logs.
    pub log_download_url: Option<String>,
}

impl RunLogs {
    fn empty() -> Self {
        Self {
            jobs: Vec::new(),
            log_download_url: None,
        }
    }
}

pub struct StatusAndLogFetcher {
    platform: Arc<dyn GitPlatform>,
    registry: Arc<RunRegistry>,
    correlator: Arc<RunCorrelator>,
    retry: BackoffConfig,
}

impl StatusAndLogFetcher {
    pub fn new(
        platform: Arc<dyn GitPlatform>,
        registry: Arc<RunRegistry>,
        correlator: Arc<RunCorrelator>,
        retry: BackoffConfig,
    ) -> Self {
        Self {
            platform,
            registry,
            correlator,
            retry,
        }
    }

    /// Pull the remote run state into the registry and return the record.
    ///
    /// An uncorrelated run gets one correlation pass first; if that finds
    /// nothing the record is returned unchanged.
    pub async fn refresh_status(&self, run_id: &str) -> Result<TestRun, CoreError> {
        let mut run = self.registry.get(run_id).await?;

        if !run.is_correlated() {
            match self.correlator.poll_once(&run, &self.registry).await? {
                Some(bound) => run = bound,
                None => return Ok(run),
            }
        }
        let Some(workflow_run_id) = run.workflow_run_id else {
            return Ok(run);
        };

        let remote = retry(&self.retry, || {
            self.platform
                .get_run(&run.owner, &run.repo_name, workflow_run_id)
        })
        .await
        .map_err(|err| err.classify(Some(run_id)))?;

        let status = RunStatus::from_remote(&remote.status);
        let conclusion = remote.conclusion.as_deref().map(RunConclusion::from_remote);
        let now = Utc::now();
        let html_url = remote.html_url;

        let updated = self
            .registry
            .update(run_id, |r| {
                if r.apply_remote(status, conclusion, now) {
                    tracing::debug!(
                        run_id = %r.run_id,
                        workflow_run_id,
                        status = r.status.as_str(),
                        "Run status advanced",
                    );
                }
                r.html_url.get_or_insert(html_url);
            })
            .await?;
        Ok(updated)
    }

    /// Jobs with their steps and, once available, the log archive URL.
    pub async fn fetch_logs(&self, run_id: &str) -> Result<RunLogs, CoreError> {
        let run = self.registry.get(run_id).await?;
        let Some(workflow_run_id) = run.workflow_run_id else {
            return Ok(RunLogs::empty());
        };

        let jobs = retry(&self.retry, || {
            self.platform
                .list_jobs(&run.owner, &run.repo_name, workflow_run_id)
        })
        .await
        .map_err(|err| err.classify(Some(run_id)))?;

        let log_download_url = match self
            .platform
            .log_download_url(&run.owner, &run.repo_name, workflow_run_id)
            .await
        {
            Ok(url) => url,
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.classify(Some(run_id))),
        };

        Ok(RunLogs {
            jobs,
            log_download_url,
        })
    }

    pub async fn fetch_artifacts(&self, run_id: &str) -> Result<Vec<ArtifactSummary>, CoreError> {
        let run = self.registry.get(run_id).await?;
        let Some(workflow_run_id) = run.workflow_run_id else {
            return Ok(Vec::new());
        };

        retry(&self.retry, || {
            self.platform
                .list_artifacts(&run.owner, &run.repo_name, workflow_run_id)
        })
        .await
        .map_err(|err| err.classify(Some(run_id)))
    }
}
