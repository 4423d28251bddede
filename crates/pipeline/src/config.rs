//! Tunables for the commit-and-correlate pipeline.

use std::time::Duration;

use ghrun_core::workflow_template::RUN_ID_INPUT;
use ghrun_github::backoff::BackoffConfig;

/// Pipeline configuration, assembled by the server from the environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Retry schedule for individual idempotent platform calls.
    pub request_retry: BackoffConfig,
    /// Polling schedule used to find the workflow run behind a dispatch.
    pub correlation: BackoffConfig,
    /// Retry schedule for a dispatch rejected because the workflow file was
    /// pushed moments ago and is not indexed yet.
    pub dispatch_retry: BackoffConfig,
    /// Maximum blob uploads in flight per commit.
    pub blob_concurrency: usize,
    /// How many times a commit is rebuilt from a fresh head after the
    /// branch moved underneath it.
    pub conflict_retries: u32,
    /// Workflow input that carries the internal run id. `None` disables it.
    pub trace_input: Option<String>,
    /// Visibility of newly created repositories when a request omits it.
    pub private_repos: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_retry: BackoffConfig::request_retry(),
            correlation: BackoffConfig::correlation(),
            dispatch_retry: BackoffConfig {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(4),
                multiplier: 2.0,
                max_attempts: 4,
            },
            blob_concurrency: 4,
            conflict_retries: 1,
            trace_input: Some(RUN_ID_INPUT.to_string()),
            private_repos: true,
        }
    }
}
