/// Internally generated test-run identifier (hyphenated UUID v4).
pub type RunId = String;

/// Workflow run identifier assigned by the remote platform.
pub type WorkflowRunId = u64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh, unique [`RunId`].
pub fn new_run_id() -> RunId {
    uuid::Uuid::new_v4().to_string()
}
