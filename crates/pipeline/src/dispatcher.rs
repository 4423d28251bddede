//! Fires `workflow_dispatch` events.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Timelike;
use ghrun_core::error::CoreError;
use ghrun_core::types::Timestamp;
use ghrun_github::backoff::{retry_when, BackoffConfig};
use ghrun_github::{GitHubError, GitPlatform};

pub struct WorkflowDispatcher {
    platform: Arc<dyn GitPlatform>,
    retry: BackoffConfig,
    trace_input: Option<String>,
}

impl WorkflowDispatcher {
    pub fn new(
        platform: Arc<dyn GitPlatform>,
        retry: BackoffConfig,
        trace_input: Option<String>,
    ) -> Self {
        Self {
            platform,
            retry,
            trace_input,
        }
    }

    /// Dispatch `workflow` on `git_ref` and return the platform time the
    /// event was accepted, truncated to whole seconds.
    ///
    /// The internal `run_id` is added under the trace input unless the
    /// caller already supplied that key. Workflows that do not declare the
    /// trace input reject it with a 422; the event is then sent once more
    /// with the caller's inputs only.
    pub async fn dispatch(
        &self,
        owner: &str,
        repo: &str,
        workflow: &str,
        git_ref: &str,
        run_id: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<Timestamp, CoreError> {
        let trace_key = self
            .trace_input
            .as_deref()
            .filter(|key| !inputs.contains_key(*key));

        let result = match trace_key {
            Some(key) => {
                let mut traced = inputs.clone();
                traced.insert(key.to_string(), run_id.to_string());
                match self.send(owner, repo, workflow, git_ref, &traced).await {
                    Err(err) if rejects_input(&err, key) => {
                        tracing::info!(
                            run_id = %run_id,
                            workflow = %workflow,
                            input = %key,
                            "Workflow does not declare the trace input, dispatching without it",
                        );
                        self.send(owner, repo, workflow, git_ref, inputs).await
                    }
                    result => result,
                }
            }
            None => self.send(owner, repo, workflow, git_ref, inputs).await,
        };
        let dispatched_at = result.map_err(|err| err.classify(Some(run_id)))?;

        let dispatched_at = truncate_to_seconds(dispatched_at);
        tracing::info!(
            run_id = %run_id,
            repo = %format!("{owner}/{repo}"),
            workflow = %workflow,
            git_ref = %git_ref,
            dispatched_at = %dispatched_at,
            "Workflow dispatched",
        );
        Ok(dispatched_at)
    }

    async fn send(
        &self,
        owner: &str,
        repo: &str,
        workflow: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<Timestamp, GitHubError> {
        retry_when(&self.retry, is_dispatch_retryable, || {
            self.platform
                .dispatch_workflow(owner, repo, workflow, git_ref, inputs)
        })
        .await
    }
}

/// 422 naming `key` among the inputs the workflow does not declare. The
/// event was not accepted.
fn rejects_input(err: &GitHubError, key: &str) -> bool {
    err.status() == Some(422)
        && err.body().is_some_and(|body| {
            body.contains("Unexpected inputs") && body.contains(key)
        })
}

/// A workflow pushed seconds ago may not be registered yet: the platform
/// answers 404, or 422 naming the missing `workflow_dispatch` trigger.
/// Neither means the event was accepted, so another attempt is safe.
fn is_dispatch_retryable(err: &GitHubError) -> bool {
    err.is_transient()
        || err.is_not_found()
        || (err.status() == Some(422)
            && err
                .body()
                .is_some_and(|body| body.contains("workflow_dispatch")))
}

pub(crate) fn truncate_to_seconds(ts: Timestamp) -> Timestamp {
    ts.with_nanosecond(0).unwrap_or(ts)
}
