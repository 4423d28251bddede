//! Wire models for the subset of the GitHub REST API the relay uses.
//!
//! Read-only projections keep platform strings for `status`/`conclusion`;
//! the pipeline maps them onto the core lifecycle enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repository owner (user or organisation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
}

/// Repository as returned by create/get repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: Owner,
    pub default_branch: String,
    pub html_url: String,
    #[serde(default)]
    pub private: bool,
}

/// Body of `POST /user/repos` and `POST /orgs/{org}/repos`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRepository<'a> {
    pub name: &'a str,
    pub private: bool,
    /// Create an initial commit so the default branch exists.
    pub auto_init: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
}

/// A commit object from the git database API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitCommit {
    pub sha: String,
    pub tree: ObjectRef,
    #[serde(default)]
    pub parents: Vec<ObjectRef>,
}

/// `{ "sha": ... }` pointer used by commits, trees, blobs and refs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub sha: String,
}

/// Response of `GET /git/ref/heads/{branch}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    pub object: ObjectRef,
}

/// One entry overlaid onto a base tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    /// Git file mode, e.g. `100644`.
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, mode: &str, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: mode.to_string(),
            kind: "blob".to_string(),
            sha: sha.into(),
        }
    }
}

/// Filters for listing workflow runs. Results are always newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u8>,
}

/// Read-only projection of a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRunSummary {
    pub id: u64,
    pub status: String,
    pub conclusion: Option<String>,
    pub head_sha: String,
    #[serde(default)]
    pub event: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub html_url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkflowRunList {
    pub workflow_runs: Vec<WorkflowRunSummary>,
}

/// One step inside a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSummary {
    pub number: u32,
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
}

/// One job of a workflow run, with its steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: u64,
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub html_url: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepSummary>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobList {
    pub jobs: Vec<JobSummary>,
}

/// Artifact uploaded by a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub id: u64,
    pub name: String,
    pub size_in_bytes: u64,
    #[serde(default)]
    pub expired: bool,
    pub archive_download_url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ArtifactList {
    pub artifacts: Vec<ArtifactSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_run_deserializes_from_api_shape() {
        let json = r#"{
            "id": 30433642,
            "name": "Run Selenium Tests",
            "head_branch": "main",
            "head_sha": "acb5820ced9479c074f688cc328bf03f341a511d",
            "event": "workflow_dispatch",
            "status": "queued",
            "conclusion": null,
            "created_at": "2020-01-22T19:33:08Z",
            "updated_at": "2020-01-22T19:33:08Z",
            "html_url": "https://github.com/octo/hello/actions/runs/30433642"
        }"#;
        let run: WorkflowRunSummary = serde_json::from_str(json).unwrap();
        assert_eq!(run.id, 30433642);
        assert_eq!(run.event, "workflow_dispatch");
        assert!(run.conclusion.is_none());
    }

    #[test]
    fn tree_entry_serializes_type_field() {
        let entry = TreeEntry::blob("tests/a.py", "100644", "abc");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "blob");
        assert_eq!(json["mode"], "100644");
    }

    #[test]
    fn run_query_omits_unset_filters() {
        let query = RunListQuery {
            head_sha: Some("abc".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json, serde_json::json!({ "head_sha": "abc" }));
    }
}
