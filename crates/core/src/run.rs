//! Test-run lifecycle model.
//!
//! A [`TestRun`] tracks one submission from the moment its commit is
//! dispatched until its backing repository is deleted. Status only ever
//! moves forward (`queued -> in_progress -> completed`) and a conclusion,
//! once recorded, is never cleared or replaced.

use serde::{Deserialize, Serialize};

use crate::types::{RunId, Timestamp, WorkflowRunId};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a run. Variant order is the only legal direction of
/// travel, so `Ord` doubles as the monotonicity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
}

impl RunStatus {
    /// Map a platform status string onto the three-state lifecycle.
    ///
    /// `requested`, `waiting`, `pending` and anything unrecognised are
    /// pre-execution states and collapse to [`RunStatus::Queued`].
    pub fn from_remote(status: &str) -> Self {
        match status {
            "in_progress" => RunStatus::InProgress,
            "completed" => RunStatus::Completed,
            _ => RunStatus::Queued,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == RunStatus::Completed
    }
}

// ---------------------------------------------------------------------------
// Conclusion
// ---------------------------------------------------------------------------

/// Final outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunConclusion {
    Success,
    Failure,
    Cancelled,
    TimedOut,
    Neutral,
    Skipped,
    ActionRequired,
    StartupFailure,
    Stale,
    #[serde(other)]
    Unknown,
}

impl RunConclusion {
    pub fn from_remote(conclusion: &str) -> Self {
        match conclusion {
            "success" => RunConclusion::Success,
            "failure" => RunConclusion::Failure,
            "cancelled" => RunConclusion::Cancelled,
            "timed_out" => RunConclusion::TimedOut,
            "neutral" => RunConclusion::Neutral,
            "skipped" => RunConclusion::Skipped,
            "action_required" => RunConclusion::ActionRequired,
            "startup_failure" => RunConclusion::StartupFailure,
            "stale" => RunConclusion::Stale,
            _ => RunConclusion::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// TestRun
// ---------------------------------------------------------------------------

/// Registry record for one submitted test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRun {
    pub run_id: RunId,
    pub owner: String,
    pub repo_name: String,
    pub repo_full_name: String,
    /// Branch the commit was pushed to and the dispatch targeted.
    pub default_branch: String,
    /// Workflow file name (or numeric id) that was dispatched.
    pub workflow: String,
    /// Commit sha produced for this run; the correlation key.
    pub head_sha: String,
    /// Platform-clock time at which the dispatch was accepted.
    pub dispatched_at: Timestamp,
    /// Absent until correlation succeeds; assigned at most once.
    pub workflow_run_id: Option<WorkflowRunId>,
    pub status: RunStatus,
    pub conclusion: Option<RunConclusion>,
    pub html_url: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Everything known about a run at the moment its dispatch was accepted.
#[derive(Debug, Clone)]
pub struct NewTestRun {
    pub run_id: RunId,
    pub owner: String,
    pub repo_name: String,
    pub repo_full_name: String,
    pub default_branch: String,
    pub workflow: String,
    pub head_sha: String,
    pub dispatched_at: Timestamp,
}

impl TestRun {
    /// Create a queued, uncorrelated record.
    pub fn new(input: NewTestRun, now: Timestamp) -> Self {
        Self {
            run_id: input.run_id,
            owner: input.owner,
            repo_name: input.repo_name,
            repo_full_name: input.repo_full_name,
            default_branch: input.default_branch,
            workflow: input.workflow,
            head_sha: input.head_sha,
            dispatched_at: input.dispatched_at,
            workflow_run_id: None,
            status: RunStatus::Queued,
            conclusion: None,
            html_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a remote observation into the record.
    ///
    /// Backward status moves are ignored. A conclusion is only accepted
    /// once the run is completed and only if none was recorded before.
    /// Returns `true` if anything changed.
    pub fn apply_remote(
        &mut self,
        status: RunStatus,
        conclusion: Option<RunConclusion>,
        now: Timestamp,
    ) -> bool {
        let mut changed = false;

        if status > self.status {
            self.status = status;
            changed = true;
        }

        if self.status.is_terminal() && self.conclusion.is_none() {
            if let Some(conclusion) = conclusion {
                self.conclusion = Some(conclusion);
                changed = true;
            }
        }

        if changed {
            self.updated_at = now;
        }
        changed
    }

    pub fn is_correlated(&self) -> bool {
        self.workflow_run_id.is_some()
    }
}
