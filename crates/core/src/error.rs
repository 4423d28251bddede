#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A dispatch was fired but no matching workflow run showed up in time.
    #[error("No workflow run observed for commit {commit_sha} (run {run_id}) after {attempts} attempts")]
    CorrelationTimeout {
        run_id: String,
        commit_sha: String,
        attempts: u32,
    },

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Prefix the message with the test run it occurred in.
    ///
    /// Variants that already carry an identifier are returned unchanged.
    pub fn in_run(self, run_id: &str) -> Self {
        let scoped = |msg: String| format!("run {run_id}: {msg}");
        match self {
            CoreError::Validation(msg) => CoreError::Validation(scoped(msg)),
            CoreError::Conflict(msg) => CoreError::Conflict(scoped(msg)),
            CoreError::Permission(msg) => CoreError::Permission(scoped(msg)),
            CoreError::TransientNetwork(msg) => CoreError::TransientNetwork(scoped(msg)),
            CoreError::RateLimited {
                message,
                retry_after_secs,
            } => CoreError::RateLimited {
                message: scoped(message),
                retry_after_secs,
            },
            CoreError::Internal(msg) => CoreError::Internal(scoped(msg)),
            other @ (CoreError::NotFound { .. } | CoreError::CorrelationTimeout { .. }) => other,
        }
    }
}
