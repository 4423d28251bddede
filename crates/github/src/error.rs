//! Errors from the GitHub REST layer and their classification into
//! [`CoreError`].

use std::fmt;
use std::time::Duration;

use ghrun_core::error::CoreError;

/// Remote call being made, carried on every error for context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ViewerLogin,
    CreateRepository,
    GetRepository,
    GetBranchRef,
    GetCommit,
    CreateBlob,
    CreateTree,
    CreateCommit,
    UpdateRef,
    DispatchWorkflow,
    ListRuns,
    GetRun,
    ListJobs,
    GetLogRedirect,
    ListArtifacts,
    DeleteRepository,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::ViewerLogin => "viewer-login",
            Operation::CreateRepository => "create-repository",
            Operation::GetRepository => "get-repository",
            Operation::GetBranchRef => "get-branch-ref",
            Operation::GetCommit => "get-commit",
            Operation::CreateBlob => "create-blob",
            Operation::CreateTree => "create-tree",
            Operation::CreateCommit => "create-commit",
            Operation::UpdateRef => "update-ref",
            Operation::DispatchWorkflow => "dispatch-workflow",
            Operation::ListRuns => "list-runs",
            Operation::GetRun => "get-run",
            Operation::ListJobs => "list-jobs",
            Operation::GetLogRedirect => "get-log-redirect",
            Operation::ListArtifacts => "list-artifacts",
            Operation::DeleteRepository => "delete-repository",
        }
    }

    /// Human-readable name of the resource the operation targets.
    pub fn resource(self) -> &'static str {
        match self {
            Operation::ViewerLogin => "Authenticated user",
            Operation::CreateRepository
            | Operation::GetRepository
            | Operation::DeleteRepository => "Repository",
            Operation::GetBranchRef | Operation::UpdateRef => "Branch",
            Operation::GetCommit | Operation::CreateCommit => "Commit",
            Operation::CreateBlob => "Blob",
            Operation::CreateTree => "Tree",
            Operation::DispatchWorkflow => "Workflow",
            Operation::ListRuns | Operation::GetRun => "Workflow run",
            Operation::ListJobs => "Workflow jobs",
            Operation::GetLogRedirect => "Run logs",
            Operation::ListArtifacts => "Run artifacts",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the GitHub REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("{operation}: HTTP request failed: {source}")]
    Request {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },

    /// GitHub returned a non-2xx status code.
    #[error("{operation}: GitHub API error ({status}): {body}")]
    Api {
        operation: Operation,
        status: u16,
        /// Raw response body for debugging.
        body: String,
        /// Delay requested via `retry-after` or `x-ratelimit-reset`.
        retry_after: Option<Duration>,
        /// `x-ratelimit-remaining` was `0`.
        rate_limit_exhausted: bool,
    },

    /// A 2xx response whose body or headers could not be understood.
    #[error("{operation}: unexpected response: {message}")]
    Decode {
        operation: Operation,
        message: String,
    },
}

impl GitHubError {
    /// Build a plain API error without rate-limit metadata.
    pub fn api(operation: Operation, status: u16, body: impl Into<String>) -> Self {
        GitHubError::Api {
            operation,
            status,
            body: body.into(),
            retry_after: None,
            rate_limit_exhausted: false,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            GitHubError::Request { operation, .. }
            | GitHubError::Api { operation, .. }
            | GitHubError::Decode { operation, .. } => *operation,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body of an API error.
    pub fn body(&self) -> Option<&str> {
        match self {
            GitHubError::Api { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(404 | 410))
    }

    /// Secondary or primary rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            GitHubError::Api {
                status,
                retry_after,
                rate_limit_exhausted,
                ..
            } => {
                *status == 429
                    || (*status == 403 && (*rate_limit_exhausted || retry_after.is_some()))
            }
            _ => false,
        }
    }

    /// Failures where repeating the identical request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GitHubError::Request { .. } => true,
            GitHubError::Api { status, .. } => *status >= 500 || self.is_rate_limited(),
            GitHubError::Decode { .. } => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GitHubError::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Classify into the core taxonomy, scoping the message to a run when
    /// one is known.
    pub fn classify(self, run_id: Option<&str>) -> CoreError {
        let operation = self.operation();
        let scope = match run_id {
            Some(id) => format!("{operation} (run {id})"),
            None => operation.to_string(),
        };

        if self.is_rate_limited() {
            return CoreError::RateLimited {
                message: format!("{scope}: {}", self.detail()),
                retry_after_secs: self.retry_after().map(|d| d.as_secs()),
            };
        }

        match self {
            GitHubError::Request { source, .. } => {
                CoreError::TransientNetwork(format!("{scope}: {source}"))
            }
            GitHubError::Api { status, body, .. } => match status {
                401 | 403 => CoreError::Permission(format!("{scope}: {body}")),
                404 | 410 => CoreError::NotFound {
                    entity: operation.resource(),
                    id: run_id.map_or_else(|| operation.to_string(), str::to_string),
                },
                409 => CoreError::Conflict(format!("{scope}: {body}")),
                422 if is_conflict_body(&body) => CoreError::Conflict(format!("{scope}: {body}")),
                400 | 422 => CoreError::Validation(format!("{scope}: {body}")),
                500..=599 => CoreError::TransientNetwork(format!("{scope}: HTTP {status}: {body}")),
                _ => CoreError::Internal(format!("{scope}: HTTP {status}: {body}")),
            },
            GitHubError::Decode { message, .. } => {
                CoreError::Internal(format!("{scope}: {message}"))
            }
        }
    }

    fn detail(&self) -> String {
        match self {
            GitHubError::Request { source, .. } => source.to_string(),
            GitHubError::Api { status, body, .. } => format!("HTTP {status}: {body}"),
            GitHubError::Decode { message, .. } => message.clone(),
        }
    }
}

impl From<GitHubError> for CoreError {
    fn from(err: GitHubError) -> Self {
        err.classify(None)
    }
}

/// 422 bodies that describe a state conflict rather than a malformed request.
fn is_conflict_body(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    body.contains("not a fast forward")
        || body.contains("already exists")
        || body.contains("reference update failed")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn non_fast_forward_is_conflict() {
        let err = GitHubError::api(
            Operation::UpdateRef,
            422,
            r#"{"message":"Update is not a fast forward"}"#,
        );
        assert_matches!(err.classify(Some("r1")), CoreError::Conflict(msg) if msg.starts_with("update-ref (run r1)"));
    }

    #[test]
    fn name_taken_is_conflict() {
        let err = GitHubError::api(
            Operation::CreateRepository,
            422,
            r#"{"errors":[{"message":"name already exists on this account"}]}"#,
        );
        assert_matches!(CoreError::from(err), CoreError::Conflict(_));
    }

    #[test]
    fn other_422_is_validation() {
        let err = GitHubError::api(Operation::CreateTree, 422, "tree.sha is invalid");
        assert_matches!(CoreError::from(err), CoreError::Validation(_));
    }

    #[test]
    fn auth_failures_are_permission_errors() {
        for status in [401, 403] {
            let err = GitHubError::api(Operation::DeleteRepository, status, "Must have admin rights");
            assert_matches!(CoreError::from(err), CoreError::Permission(_));
        }
    }

    #[test]
    fn exhausted_quota_403_is_rate_limit() {
        let err = GitHubError::Api {
            operation: Operation::ListRuns,
            status: 403,
            body: "API rate limit exceeded".into(),
            retry_after: Some(Duration::from_secs(60)),
            rate_limit_exhausted: true,
        };
        assert!(err.is_transient());
        assert_matches!(
            CoreError::from(err),
            CoreError::RateLimited { retry_after_secs: Some(60), .. }
        );
    }

    #[test]
    fn not_found_names_resource_and_run() {
        let err = GitHubError::api(Operation::GetRun, 404, "Not Found");
        assert_matches!(
            err.classify(Some("r9")),
            CoreError::NotFound { entity: "Workflow run", id } if id == "r9"
        );
    }

    #[test]
    fn server_errors_are_transient() {
        let err = GitHubError::api(Operation::CreateBlob, 502, "Bad Gateway");
        assert!(err.is_transient());
        assert_matches!(CoreError::from(err), CoreError::TransientNetwork(_));
    }

    #[test]
    fn client_errors_are_not_transient() {
        assert!(!GitHubError::api(Operation::CreateBlob, 404, "").is_transient());
        assert!(!GitHubError::api(Operation::UpdateRef, 422, "").is_transient());
    }
}
