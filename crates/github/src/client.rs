//! `reqwest` implementation of [`GitPlatform`] against the GitHub REST API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ghrun_core::types::Timestamp;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, DATE, LOCATION};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::error::{GitHubError, Operation};
use crate::models::{
    ArtifactList, ArtifactSummary, CreateRepository, GitCommit, GitRef, JobList, JobSummary,
    ObjectRef, Repository, RunListQuery, TreeEntry, WorkflowRunList, WorkflowRunSummary,
};
use crate::platform::GitPlatform;

/// Default public API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// REST API version pinned on every request.
const API_VERSION: &str = "2022-11-28";

/// Connection settings for [`GitHubClient`].
#[derive(Clone)]
pub struct GitHubConfig {
    /// API root, e.g. `https://api.github.com` (no trailing slash).
    pub api_url: String,
    /// Bearer token with `repo`, `workflow` and optionally `delete_repo`.
    pub token: String,
    /// Create repositories under this organisation instead of the token's user.
    pub org: Option<String>,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .field("org", &self.org)
            .field("user_agent", &self.user_agent)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl GitHubConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
            org: None,
            user_agent: concat!("ghrun/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP client for one GitHub account or organisation.
pub struct GitHubClient {
    client: reqwest::Client,
    /// Same settings but never follows redirects; used to capture the
    /// log-archive `Location` header.
    no_redirect: reqwest::Client,
    config: GitHubConfig,
    login: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
struct Viewer {
    login: String,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let client = reqwest::Client::builder()
            .default_headers(headers.clone())
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()?;
        let no_redirect = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            no_redirect,
            config,
            login: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn repo_url(&self, owner: &str, repo: &str, rest: &str) -> String {
        self.url(&format!("/repos/{owner}/{repo}{rest}"))
    }

    // ---- private helpers ----

    /// Attach the credential, send, and reject non-2xx responses.
    async fn send(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, GitHubError> {
        let response = request
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|source| GitHubError::Request { operation, source })?;
        Self::ensure_success(operation, response).await
    }

    /// Send and parse a JSON body into the expected type.
    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<T, GitHubError> {
        let response = self.send(operation, request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GitHubError::Decode {
                operation,
                message: e.to_string(),
            })
    }

    /// Return the response unchanged on success, or an
    /// [`GitHubError::Api`] carrying status, body and rate-limit hints.
    async fn ensure_success(
        operation: Operation,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GitHubError> {
        let status = response.status();
        if status.is_success() || status.is_redirection() {
            return Ok(response);
        }
        let (retry_after, rate_limit_exhausted) = rate_limit_hints(response.headers(), Utc::now());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(GitHubError::Api {
            operation,
            status: status.as_u16(),
            body,
            retry_after,
            rate_limit_exhausted,
        })
    }
}

#[async_trait]
impl GitPlatform for GitHubClient {
    async fn namespace(&self) -> Result<String, GitHubError> {
        if let Some(org) = &self.config.org {
            return Ok(org.clone());
        }
        self.login
            .get_or_try_init(|| async {
                let viewer: Viewer = self
                    .send_json(Operation::ViewerLogin, self.client.get(self.url("/user")))
                    .await?;
                Ok::<_, GitHubError>(viewer.login)
            })
            .await
            .cloned()
    }

    async fn create_repository(
        &self,
        name: &str,
        private: bool,
    ) -> Result<Repository, GitHubError> {
        let path = match &self.config.org {
            Some(org) => format!("/orgs/{org}/repos"),
            None => "/user/repos".to_string(),
        };
        let body = CreateRepository {
            name,
            private,
            auto_init: true,
            description: Some("Automated test run"),
        };
        self.send_json(
            Operation::CreateRepository,
            self.client.post(self.url(&path)).json(&body),
        )
        .await
    }

    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, GitHubError> {
        self.send_json(
            Operation::GetRepository,
            self.client.get(self.repo_url(owner, repo, "")),
        )
        .await
    }

    async fn get_branch_head(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<String, GitHubError> {
        let git_ref: GitRef = self
            .send_json(
                Operation::GetBranchRef,
                self.client
                    .get(self.repo_url(owner, repo, &format!("/git/ref/heads/{branch}"))),
            )
            .await?;
        Ok(git_ref.object.sha)
    }

    async fn get_commit(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> Result<GitCommit, GitHubError> {
        self.send_json(
            Operation::GetCommit,
            self.client
                .get(self.repo_url(owner, repo, &format!("/git/commits/{sha}"))),
        )
        .await
    }

    async fn create_blob(
        &self,
        owner: &str,
        repo: &str,
        content: &str,
    ) -> Result<String, GitHubError> {
        let body = serde_json::json!({
            "content": content,
            "encoding": "utf-8",
        });
        let blob: ObjectRef = self
            .send_json(
                Operation::CreateBlob,
                self.client
                    .post(self.repo_url(owner, repo, "/git/blobs"))
                    .json(&body),
            )
            .await?;
        Ok(blob.sha)
    }

    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String, GitHubError> {
        let body = serde_json::json!({
            "base_tree": base_tree,
            "tree": entries,
        });
        let tree: ObjectRef = self
            .send_json(
                Operation::CreateTree,
                self.client
                    .post(self.repo_url(owner, repo, "/git/trees"))
                    .json(&body),
            )
            .await?;
        Ok(tree.sha)
    }

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree: &str,
        parents: &[String],
    ) -> Result<String, GitHubError> {
        let body = serde_json::json!({
            "message": message,
            "tree": tree,
            "parents": parents,
        });
        let commit: ObjectRef = self
            .send_json(
                Operation::CreateCommit,
                self.client
                    .post(self.repo_url(owner, repo, "/git/commits"))
                    .json(&body),
            )
            .await?;
        Ok(commit.sha)
    }

    async fn update_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHubError> {
        let body = serde_json::json!({
            "sha": sha,
            "force": false,
        });
        self.send(
            Operation::UpdateRef,
            self.client
                .patch(self.repo_url(owner, repo, &format!("/git/refs/heads/{branch}")))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn dispatch_workflow(
        &self,
        owner: &str,
        repo: &str,
        workflow: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<Timestamp, GitHubError> {
        let body = serde_json::json!({
            "ref": git_ref,
            "inputs": inputs,
        });
        let response = self
            .send(
                Operation::DispatchWorkflow,
                self.client
                    .post(self.repo_url(
                        owner,
                        repo,
                        &format!("/actions/workflows/{workflow}/dispatches"),
                    ))
                    .json(&body),
            )
            .await?;
        Ok(response_date(response.headers()).unwrap_or_else(Utc::now))
    }

    async fn list_runs(
        &self,
        owner: &str,
        repo: &str,
        query: &RunListQuery,
    ) -> Result<Vec<WorkflowRunSummary>, GitHubError> {
        let list: WorkflowRunList = self
            .send_json(
                Operation::ListRuns,
                self.client
                    .get(self.repo_url(owner, repo, "/actions/runs"))
                    .query(query),
            )
            .await?;
        Ok(list.workflow_runs)
    }

    async fn get_run(
        &self,
        owner: &str,
        repo: &str,
        run_id: u64,
    ) -> Result<WorkflowRunSummary, GitHubError> {
        self.send_json(
            Operation::GetRun,
            self.client
                .get(self.repo_url(owner, repo, &format!("/actions/runs/{run_id}"))),
        )
        .await
    }

    async fn list_jobs(
        &self,
        owner: &str,
        repo: &str,
        run_id: u64,
    ) -> Result<Vec<JobSummary>, GitHubError> {
        let list: JobList = self
            .send_json(
                Operation::ListJobs,
                self.client
                    .get(self.repo_url(owner, repo, &format!("/actions/runs/{run_id}/jobs"))),
            )
            .await?;
        Ok(list.jobs)
    }

    async fn log_download_url(
        &self,
        owner: &str,
        repo: &str,
        run_id: u64,
    ) -> Result<Option<String>, GitHubError> {
        let url = self.repo_url(owner, repo, &format!("/actions/runs/{run_id}/logs"));
        let response = match self
            .send(Operation::GetLogRedirect, self.no_redirect.get(&url))
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let location = archive_location(response.status(), response.headers());
        if location.is_none() {
            tracing::debug!(run_id, status = %response.status(), "Log request did not redirect to an archive");
        }
        Ok(location)
    }

    async fn list_artifacts(
        &self,
        owner: &str,
        repo: &str,
        run_id: u64,
    ) -> Result<Vec<ArtifactSummary>, GitHubError> {
        let list: ArtifactList = self
            .send_json(
                Operation::ListArtifacts,
                self.client.get(self.repo_url(
                    owner,
                    repo,
                    &format!("/actions/runs/{run_id}/artifacts"),
                )),
            )
            .await?;
        Ok(list.artifacts)
    }

    async fn delete_repository(&self, owner: &str, repo: &str) -> Result<(), GitHubError> {
        self.send(
            Operation::DeleteRepository,
            self.client.delete(self.repo_url(owner, repo, "")),
        )
        .await?;
        Ok(())
    }
}

/// Extract the back-off hint from a failed response.
///
/// `retry-after` (seconds) wins; otherwise an exhausted primary quota
/// (`x-ratelimit-remaining: 0`) yields the time until `x-ratelimit-reset`.
fn rate_limit_hints(headers: &HeaderMap, now: DateTime<Utc>) -> (Option<Duration>, bool) {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };

    let exhausted = header_u64("x-ratelimit-remaining") == Some(0);
    if let Some(secs) = header_u64("retry-after") {
        return (Some(Duration::from_secs(secs)), exhausted);
    }
    if exhausted {
        let wait = header_u64("x-ratelimit-reset").map(|reset| {
            let now_secs = u64::try_from(now.timestamp()).unwrap_or(0);
            Duration::from_secs(reset.saturating_sub(now_secs))
        });
        return (wait, true);
    }
    (None, false)
}

/// Signed archive URL from the log endpoint's redirect. Any other answer
/// carries no URL usable without the token.
fn archive_location(status: StatusCode, headers: &HeaderMap) -> Option<String> {
    if !status.is_redirection() {
        return None;
    }
    headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Parse the HTTP `Date` header, giving the server's clock at response time.
fn response_date(headers: &HeaderMap) -> Option<Timestamp> {
    let value = headers.get(DATE)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn new_does_not_panic() {
        let client = GitHubClient::new(GitHubConfig::new("token")).unwrap();
        assert_eq!(client.config().api_url, DEFAULT_API_URL);
    }

    #[test]
    fn repo_url_joins_without_double_slash() {
        let mut config = GitHubConfig::new("token");
        config.api_url = "http://localhost:9999/".into();
        let client = GitHubClient::new(config).unwrap();
        assert_eq!(
            client.repo_url("octo", "hello", "/git/blobs"),
            "http://localhost:9999/repos/octo/hello/git/blobs"
        );
    }

    #[test]
    fn retry_after_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("42"));
        let (wait, exhausted) = rate_limit_hints(&headers, Utc::now());
        assert_eq!(wait, Some(Duration::from_secs(42)));
        assert!(!exhausted);
    }

    #[test]
    fn exhausted_quota_waits_until_reset() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let reset = now.timestamp() + 90;
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&reset.to_string()).unwrap(),
        );
        let (wait, exhausted) = rate_limit_hints(&headers, now);
        assert_eq!(wait, Some(Duration::from_secs(90)));
        assert!(exhausted);
    }

    #[test]
    fn no_hints_without_headers() {
        assert_eq!(rate_limit_hints(&HeaderMap::new(), Utc::now()), (None, false));
    }

    #[test]
    fn log_archive_url_comes_from_the_redirect() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LOCATION,
            HeaderValue::from_static("https://pipelines.actions.test/logs.zip?sig=abc"),
        );
        assert_eq!(
            archive_location(StatusCode::FOUND, &headers).as_deref(),
            Some("https://pipelines.actions.test/logs.zip?sig=abc")
        );
    }

    #[test]
    fn log_endpoint_without_redirect_has_no_archive_url() {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("https://elsewhere.test"));
        assert_eq!(archive_location(StatusCode::OK, &headers), None);
        assert_eq!(archive_location(StatusCode::FOUND, &HeaderMap::new()), None);
    }

    #[test]
    fn parses_http_date() {
        let mut headers = HeaderMap::new();
        headers.insert(DATE, HeaderValue::from_static("Tue, 02 Jan 2024 03:04:05 GMT"));
        let date = response_date(&headers).unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
    }
}
