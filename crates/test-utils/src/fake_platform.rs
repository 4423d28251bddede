//! In-memory [`GitPlatform`] with git-like object semantics.
//!
//! Blobs, trees and commits are content addressed (SHA-256 over a canonical
//! encoding), branch updates are fast-forward only, and every dispatch that
//! is not dropped creates a workflow run on the branch tip. Runs start
//! `queued`; tests move them along with [`FakePlatform::set_run_state`].

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use ghrun_core::types::Timestamp;
use ghrun_core::workflow_template::WORKFLOWS_DIR;
use ghrun_github::models::{
    ArtifactSummary, GitCommit, JobSummary, ObjectRef, Owner, Repository, RunListQuery,
    StepSummary, TreeEntry, WorkflowRunSummary,
};
use ghrun_github::{GitHubError, GitPlatform, Operation};
use sha2::{Digest, Sha256};

const HTML_BASE: &str = "https://github.test";

#[derive(Debug, Clone)]
enum Object {
    Blob(String),
    /// Flattened `path -> (mode, blob sha)`.
    Tree(BTreeMap<String, (String, String)>),
    Commit { tree: String, parents: Vec<String> },
}

#[derive(Debug, Clone)]
struct FakeRun {
    summary: WorkflowRunSummary,
    inputs: BTreeMap<String, String>,
}

#[derive(Debug)]
struct FakeRepo {
    repo: Repository,
    objects: HashMap<String, Object>,
    branches: HashMap<String, String>,
}

/// Workflow dispatch recorded for later inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub repo_full_name: String,
    pub workflow: String,
    pub git_ref: String,
    pub inputs: BTreeMap<String, String>,
    /// `None` when the dispatch was dropped.
    pub workflow_run_id: Option<u64>,
}

#[derive(Debug)]
struct State {
    login: String,
    default_branch: String,
    clock: Timestamp,
    repos: HashMap<String, FakeRepo>,
    runs: Vec<(String, FakeRun)>,
    next_run_id: u64,
    calls: HashMap<Operation, u32>,
    failures: HashMap<Operation, VecDeque<(u16, String)>>,
    hidden_polls: u32,
    drop_dispatches: bool,
    race_next_update: bool,
    dispatches: Vec<DispatchRecord>,
}

/// Cloneable handle; clones share state.
#[derive(Debug, Clone)]
pub struct FakePlatform {
    state: Arc<Mutex<State>>,
}

impl FakePlatform {
    /// Platform whose credential belongs to `login`.
    pub fn new(login: &str) -> Self {
        let clock = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("valid start time");
        Self {
            state: Arc::new(Mutex::new(State {
                login: login.to_string(),
                default_branch: "main".to_string(),
                clock,
                repos: HashMap::new(),
                runs: Vec::new(),
                next_run_id: 1000,
                calls: HashMap::new(),
                failures: HashMap::new(),
                hidden_polls: 0,
                drop_dispatches: false,
                race_next_update: false,
                dispatches: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("lock")
    }

    // -----------------------------------------------------------------------
    // Knobs
    // -----------------------------------------------------------------------

    /// Default branch given to repositories created from now on.
    pub fn set_default_branch(&self, branch: &str) {
        self.lock().default_branch = branch.to_string();
    }

    /// Seed an existing repository with the given files on `branch`.
    pub fn seed_repository(&self, name: &str, branch: &str, files: &[(&str, &str)]) {
        let mut state = self.lock();
        let owner = state.login.clone();
        let mut repo = new_repo(&owner, name, branch, true);
        let tree = files
            .iter()
            .map(|(path, content)| {
                let sha = repo.put(Object::Blob((*content).to_string()));
                ((*path).to_string(), ("100644".to_string(), sha))
            })
            .collect();
        let tree_sha = repo.put(Object::Tree(tree));
        let commit = repo.put(Object::Commit {
            tree: tree_sha,
            parents: Vec::new(),
        });
        repo.branches.insert(branch.to_string(), commit);
        state.repos.insert(repo.repo.full_name.clone(), repo);
    }

    /// Fail the next call of `operation` with an API error.
    pub fn fail_next(&self, operation: Operation, status: u16, body: &str) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back((status, body.to_string()));
    }

    /// The next `polls` run listings return nothing, as if the run had not
    /// been indexed yet.
    pub fn hide_runs_for(&self, polls: u32) {
        self.lock().hidden_polls = polls;
    }

    /// Accept dispatches without ever creating a run.
    pub fn drop_dispatches(&self, drop: bool) {
        self.lock().drop_dispatches = drop;
    }

    /// Push a foreign commit onto the target branch right before the next
    /// ref update is evaluated.
    pub fn race_next_ref_update(&self) {
        self.lock().race_next_update = true;
    }

    /// Add a run for `head_sha` created `seconds_before` the current clock,
    /// as left behind by an earlier dispatch.
    pub fn add_stale_run(&self, full_name: &str, head_sha: &str, seconds_before: i64) -> u64 {
        let mut state = self.lock();
        let created_at = state.clock - Duration::seconds(seconds_before);
        state.allocate_run(full_name, head_sha, created_at, BTreeMap::new())
    }

    /// Move a run to `status` with an optional conclusion.
    pub fn set_run_state(&self, workflow_run_id: u64, status: &str, conclusion: Option<&str>) {
        let mut state = self.lock();
        let clock = state.clock;
        if let Some((_, run)) = state
            .runs
            .iter_mut()
            .find(|(_, run)| run.summary.id == workflow_run_id)
        {
            run.summary.status = status.to_string();
            run.summary.conclusion = conclusion.map(str::to_string);
            run.summary.updated_at = Some(clock);
        }
    }

    /// Advance the platform clock.
    pub fn advance_clock(&self, seconds: i64) {
        self.lock().clock += Duration::seconds(seconds);
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn calls(&self, operation: Operation) -> u32 {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    pub fn has_repository(&self, full_name: &str) -> bool {
        self.lock().repos.contains_key(full_name)
    }

    pub fn branch_head(&self, full_name: &str, branch: &str) -> Option<String> {
        self.lock()
            .repos
            .get(full_name)
            .and_then(|repo| repo.branches.get(branch).cloned())
    }

    /// Parents of a commit.
    pub fn commit_parents(&self, full_name: &str, sha: &str) -> Vec<String> {
        let state = self.lock();
        match state.repos.get(full_name).and_then(|repo| repo.objects.get(sha)) {
            Some(Object::Commit { parents, .. }) => parents.clone(),
            _ => Vec::new(),
        }
    }

    /// Content of `path` at the tip of `branch`.
    pub fn file_at(&self, full_name: &str, branch: &str, path: &str) -> Option<String> {
        let state = self.lock();
        let repo = state.repos.get(full_name)?;
        let tree = repo.tree_of(repo.branches.get(branch)?)?;
        let (_, blob) = tree.get(path)?;
        match repo.objects.get(blob)? {
            Object::Blob(content) => Some(content.clone()),
            _ => None,
        }
    }

    /// Number of commits reachable from the tip of `branch`.
    pub fn commit_count(&self, full_name: &str, branch: &str) -> usize {
        let state = self.lock();
        let Some(repo) = state.repos.get(full_name) else {
            return 0;
        };
        let Some(tip) = repo.branches.get(branch) else {
            return 0;
        };
        repo.ancestors(tip).len()
    }

    pub fn dispatches(&self) -> Vec<DispatchRecord> {
        self.lock().dispatches.clone()
    }

    pub fn run_ids(&self) -> Vec<u64> {
        self.lock().runs.iter().map(|(_, run)| run.summary.id).collect()
    }

    /// Inputs the run was dispatched with.
    pub fn run_inputs(&self, workflow_run_id: u64) -> Option<BTreeMap<String, String>> {
        self.lock()
            .runs
            .iter()
            .find(|(_, run)| run.summary.id == workflow_run_id)
            .map(|(_, run)| run.inputs.clone())
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    /// Count the call, apply any injected failure, then run `f`.
    fn call<T>(
        &self,
        operation: Operation,
        f: impl FnOnce(&mut State) -> Result<T, GitHubError>,
    ) -> Result<T, GitHubError> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;
        if let Some((status, body)) = state
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(GitHubError::api(operation, status, body));
        }
        f(&mut *state)
    }
}

fn not_found(operation: Operation) -> GitHubError {
    GitHubError::api(operation, 404, r#"{"message":"Not Found"}"#)
}

fn unprocessable(operation: Operation, message: &str) -> GitHubError {
    GitHubError::api(operation, 422, format!(r#"{{"message":"{message}"}}"#))
}

/// Input names declared under `workflow_dispatch.inputs`. A line-based
/// reading of the block-style YAML the tests write.
fn declared_inputs(source: &str) -> HashSet<String> {
    let indent = |line: &str| line.len() - line.trim_start().len();
    let mut declared = HashSet::new();
    let mut lines = source.lines();
    let Some(header) = lines.by_ref().find(|line| line.trim() == "inputs:") else {
        return declared;
    };
    let base = indent(header);
    let mut key_indent = None;
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let depth = indent(line);
        if depth <= base {
            break;
        }
        if *key_indent.get_or_insert(depth) == depth {
            if let Some((key, _)) = line.trim().split_once(':') {
                declared.insert(key.trim().to_string());
            }
        }
    }
    declared
}

fn object_id(kind: &str, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn new_repo(owner: &str, name: &str, branch: &str, private: bool) -> FakeRepo {
    let full_name = format!("{owner}/{name}");
    FakeRepo {
        repo: Repository {
            name: name.to_string(),
            html_url: format!("{HTML_BASE}/{full_name}"),
            full_name,
            owner: Owner {
                login: owner.to_string(),
            },
            default_branch: branch.to_string(),
            private,
        },
        objects: HashMap::new(),
        branches: HashMap::new(),
    }
}

impl FakeRepo {
    fn put(&mut self, object: Object) -> String {
        let id = match &object {
            Object::Blob(content) => object_id("blob", content),
            Object::Tree(entries) => {
                let encoded: Vec<String> = entries
                    .iter()
                    .map(|(path, (mode, sha))| format!("{mode} {path} {sha}"))
                    .collect();
                object_id("tree", &encoded.join("\n"))
            }
            Object::Commit { tree, parents } => {
                object_id("commit", &format!("{tree}\n{}", parents.join(",")))
            }
        };
        self.objects.entry(id.clone()).or_insert(object);
        id
    }

    fn tree_of(&self, commit: &str) -> Option<&BTreeMap<String, (String, String)>> {
        let Some(Object::Commit { tree, .. }) = self.objects.get(commit) else {
            return None;
        };
        match self.objects.get(tree) {
            Some(Object::Tree(entries)) => Some(entries),
            _ => None,
        }
    }

    fn ancestors(&self, tip: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut pending = vec![tip.to_string()];
        while let Some(sha) = pending.pop() {
            if !seen.insert(sha.clone()) {
                continue;
            }
            if let Some(Object::Commit { parents, .. }) = self.objects.get(&sha) {
                pending.extend(parents.iter().cloned());
            }
        }
        seen
    }

    /// Source of the workflow file at the tip of `branch`. Numeric workflow
    /// ids resolve without a file and accept any inputs.
    fn workflow_source(&self, branch: &str, workflow: &str) -> Option<Option<String>> {
        if workflow.parse::<u64>().is_ok() {
            return Some(None);
        }
        let path = format!("{WORKFLOWS_DIR}/{workflow}");
        let tree = self.branches.get(branch).and_then(|tip| self.tree_of(tip))?;
        let (_, blob) = tree.get(&path)?;
        match self.objects.get(blob)? {
            Object::Blob(content) => Some(Some(content.clone())),
            _ => None,
        }
    }
}

impl State {
    fn repo(&self, operation: Operation, owner: &str, name: &str) -> Result<&FakeRepo, GitHubError> {
        self.repos
            .get(&format!("{owner}/{name}"))
            .ok_or_else(|| not_found(operation))
    }

    fn repo_mut(
        &mut self,
        operation: Operation,
        owner: &str,
        name: &str,
    ) -> Result<&mut FakeRepo, GitHubError> {
        self.repos
            .get_mut(&format!("{owner}/{name}"))
            .ok_or_else(|| not_found(operation))
    }

    fn allocate_run(
        &mut self,
        full_name: &str,
        head_sha: &str,
        created_at: DateTime<Utc>,
        inputs: BTreeMap<String, String>,
    ) -> u64 {
        let id = self.next_run_id;
        self.next_run_id += 1;
        let summary = WorkflowRunSummary {
            id,
            status: "queued".to_string(),
            conclusion: None,
            head_sha: head_sha.to_string(),
            event: "workflow_dispatch".to_string(),
            created_at,
            updated_at: Some(created_at),
            html_url: format!("{HTML_BASE}/{full_name}/actions/runs/{id}"),
        };
        self.runs
            .push((full_name.to_string(), FakeRun { summary, inputs }));
        id
    }

    fn run(&self, operation: Operation, owner: &str, repo: &str, id: u64) -> Result<&FakeRun, GitHubError> {
        let full_name = format!("{owner}/{repo}");
        if !self.repos.contains_key(&full_name) {
            return Err(not_found(operation));
        }
        self.runs
            .iter()
            .find(|(name, run)| *name == full_name && run.summary.id == id)
            .map(|(_, run)| run)
            .ok_or_else(|| not_found(operation))
    }
}

#[async_trait]
impl GitPlatform for FakePlatform {
    async fn namespace(&self) -> Result<String, GitHubError> {
        self.call(Operation::ViewerLogin, |state| Ok(state.login.clone()))
    }

    async fn create_repository(&self, name: &str, private: bool) -> Result<Repository, GitHubError> {
        self.call(Operation::CreateRepository, |state| {
            let full_name = format!("{}/{name}", state.login);
            if state.repos.contains_key(&full_name) {
                return Err(GitHubError::api(
                    Operation::CreateRepository,
                    422,
                    r#"{"message":"Repository creation failed.","errors":[{"resource":"Repository","code":"custom","field":"name","message":"name already exists on this account"}]}"#,
                ));
            }

            let login = state.login.clone();
            let branch = state.default_branch.clone();
            let mut repo = new_repo(&login, name, &branch, private);
            let readme = repo.put(Object::Blob(format!("# {name}\n")));
            let tree = repo.put(Object::Tree(BTreeMap::from([(
                "README.md".to_string(),
                ("100644".to_string(), readme),
            )])));
            let commit = repo.put(Object::Commit {
                tree,
                parents: Vec::new(),
            });
            repo.branches.insert(branch, commit);

            let created = repo.repo.clone();
            state.repos.insert(full_name, repo);
            Ok(created)
        })
    }

    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, GitHubError> {
        self.call(Operation::GetRepository, |state| {
            Ok(state.repo(Operation::GetRepository, owner, repo)?.repo.clone())
        })
    }

    async fn get_branch_head(&self, owner: &str, repo: &str, branch: &str) -> Result<String, GitHubError> {
        self.call(Operation::GetBranchRef, |state| {
            state
                .repo(Operation::GetBranchRef, owner, repo)?
                .branches
                .get(branch)
                .cloned()
                .ok_or_else(|| not_found(Operation::GetBranchRef))
        })
    }

    async fn get_commit(&self, owner: &str, repo: &str, sha: &str) -> Result<GitCommit, GitHubError> {
        self.call(Operation::GetCommit, |state| {
            let repo = state.repo(Operation::GetCommit, owner, repo)?;
            match repo.objects.get(sha) {
                Some(Object::Commit { tree, parents }) => Ok(GitCommit {
                    sha: sha.to_string(),
                    tree: ObjectRef { sha: tree.clone() },
                    parents: parents
                        .iter()
                        .map(|p| ObjectRef { sha: p.clone() })
                        .collect(),
                }),
                _ => Err(not_found(Operation::GetCommit)),
            }
        })
    }

    async fn create_blob(&self, owner: &str, repo: &str, content: &str) -> Result<String, GitHubError> {
        self.call(Operation::CreateBlob, |state| {
            let repo = state.repo_mut(Operation::CreateBlob, owner, repo)?;
            Ok(repo.put(Object::Blob(content.to_string())))
        })
    }

    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String, GitHubError> {
        self.call(Operation::CreateTree, |state| {
            let repo = state.repo_mut(Operation::CreateTree, owner, repo)?;
            let mut tree = match repo.objects.get(base_tree) {
                Some(Object::Tree(base)) => base.clone(),
                _ => return Err(unprocessable(Operation::CreateTree, "Invalid tree info")),
            };
            for entry in entries {
                if !matches!(repo.objects.get(&entry.sha), Some(Object::Blob(_))) {
                    return Err(unprocessable(Operation::CreateTree, "tree.sha is not a valid blob"));
                }
                tree.insert(entry.path.clone(), (entry.mode.clone(), entry.sha.clone()));
            }
            Ok(repo.put(Object::Tree(tree)))
        })
    }

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        _message: &str,
        tree: &str,
        parents: &[String],
    ) -> Result<String, GitHubError> {
        self.call(Operation::CreateCommit, |state| {
            let repo = state.repo_mut(Operation::CreateCommit, owner, repo)?;
            if !matches!(repo.objects.get(tree), Some(Object::Tree(_))) {
                return Err(unprocessable(Operation::CreateCommit, "Tree SHA does not exist"));
            }
            if parents
                .iter()
                .any(|p| !matches!(repo.objects.get(p), Some(Object::Commit { .. })))
            {
                return Err(unprocessable(Operation::CreateCommit, "Parent SHA does not exist"));
            }
            Ok(repo.put(Object::Commit {
                tree: tree.to_string(),
                parents: parents.to_vec(),
            }))
        })
    }

    async fn update_branch(&self, owner: &str, repo: &str, branch: &str, sha: &str) -> Result<(), GitHubError> {
        self.call(Operation::UpdateRef, |state| {
            let race = std::mem::take(&mut state.race_next_update);
            let repo = state.repo_mut(Operation::UpdateRef, owner, repo)?;
            let Some(current) = repo.branches.get(branch).cloned() else {
                return Err(unprocessable(Operation::UpdateRef, "Reference does not exist"));
            };
            if !matches!(repo.objects.get(sha), Some(Object::Commit { .. })) {
                return Err(unprocessable(Operation::UpdateRef, "Object does not exist"));
            }

            let current = if race {
                let tree = match repo.objects.get(&current) {
                    Some(Object::Commit { tree, .. }) => tree.clone(),
                    _ => return Err(unprocessable(Operation::UpdateRef, "Object does not exist")),
                };
                // Same tree, different parent chain: a distinct commit.
                let blob = repo.put(Object::Blob("concurrent writer\n".to_string()));
                let mut entries = match repo.objects.get(&tree) {
                    Some(Object::Tree(entries)) => entries.clone(),
                    _ => BTreeMap::new(),
                };
                entries.insert("CONCURRENT.md".to_string(), ("100644".to_string(), blob));
                let tree = repo.put(Object::Tree(entries));
                let foreign = repo.put(Object::Commit {
                    tree,
                    parents: vec![current],
                });
                repo.branches.insert(branch.to_string(), foreign.clone());
                foreign
            } else {
                current
            };

            if !repo.ancestors(sha).contains(&current) {
                return Err(unprocessable(Operation::UpdateRef, "Update is not a fast forward"));
            }
            repo.branches.insert(branch.to_string(), sha.to_string());
            Ok(())
        })
    }

    async fn dispatch_workflow(
        &self,
        owner: &str,
        repo: &str,
        workflow: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<Timestamp, GitHubError> {
        self.call(Operation::DispatchWorkflow, |state| {
            let target = state.repo(Operation::DispatchWorkflow, owner, repo)?;
            let Some(head) = target.branches.get(git_ref).cloned() else {
                return Err(unprocessable(Operation::DispatchWorkflow, "No ref found"));
            };
            let Some(source) = target.workflow_source(git_ref, workflow) else {
                return Err(not_found(Operation::DispatchWorkflow));
            };
            if let Some(source) = source {
                let declared = declared_inputs(&source);
                let unexpected: Vec<String> = inputs
                    .keys()
                    .filter(|key| !declared.contains(key.as_str()))
                    .map(|key| format!(r#"\"{key}\""#))
                    .collect();
                if !unexpected.is_empty() {
                    return Err(GitHubError::api(
                        Operation::DispatchWorkflow,
                        422,
                        format!(
                            r#"{{"message":"Unexpected inputs provided: [{}]"}}"#,
                            unexpected.join(", ")
                        ),
                    ));
                }
            }
            let full_name = target.repo.full_name.clone();

            state.clock += Duration::seconds(1);
            let accepted_at = state.clock;
            let workflow_run_id = if state.drop_dispatches {
                None
            } else {
                Some(state.allocate_run(&full_name, &head, accepted_at, inputs.clone()))
            };
            state.dispatches.push(DispatchRecord {
                repo_full_name: full_name,
                workflow: workflow.to_string(),
                git_ref: git_ref.to_string(),
                inputs: inputs.clone(),
                workflow_run_id,
            });
            Ok(accepted_at)
        })
    }

    async fn list_runs(
        &self,
        owner: &str,
        repo: &str,
        query: &RunListQuery,
    ) -> Result<Vec<WorkflowRunSummary>, GitHubError> {
        self.call(Operation::ListRuns, |state| {
            state.repo(Operation::ListRuns, owner, repo)?;
            if state.hidden_polls > 0 {
                state.hidden_polls -= 1;
                return Ok(Vec::new());
            }
            let full_name = format!("{owner}/{repo}");
            let mut runs: Vec<WorkflowRunSummary> = state
                .runs
                .iter()
                .filter(|(name, _)| *name == full_name)
                .map(|(_, run)| &run.summary)
                .filter(|run| query.head_sha.as_ref().map_or(true, |sha| run.head_sha == *sha))
                .filter(|run| query.event.as_ref().map_or(true, |event| run.event == *event))
                .cloned()
                .collect();
            runs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            if let Some(per_page) = query.per_page {
                runs.truncate(usize::from(per_page));
            }
            Ok(runs)
        })
    }

    async fn get_run(&self, owner: &str, repo: &str, run_id: u64) -> Result<WorkflowRunSummary, GitHubError> {
        self.call(Operation::GetRun, |state| {
            Ok(state.run(Operation::GetRun, owner, repo, run_id)?.summary.clone())
        })
    }

    async fn list_jobs(&self, owner: &str, repo: &str, run_id: u64) -> Result<Vec<JobSummary>, GitHubError> {
        self.call(Operation::ListJobs, |state| {
            let run = &state.run(Operation::ListJobs, owner, repo, run_id)?.summary;
            if run.status == "queued" {
                return Ok(Vec::new());
            }
            let done = run.status == "completed";
            let step = |number: u32, name: &str| StepSummary {
                number,
                name: name.to_string(),
                status: run.status.clone(),
                conclusion: run.conclusion.clone(),
            };
            Ok(vec![JobSummary {
                id: run_id * 10,
                name: "test".to_string(),
                status: run.status.clone(),
                conclusion: run.conclusion.clone(),
                started_at: Some(run.created_at),
                completed_at: if done { run.updated_at } else { None },
                html_url: Some(format!("{}/job/{}", run.html_url, run_id * 10)),
                steps: vec![step(1, "Set up job"), step(2, "Run Selenium tests")],
            }])
        })
    }

    async fn log_download_url(&self, owner: &str, repo: &str, run_id: u64) -> Result<Option<String>, GitHubError> {
        self.call(Operation::GetLogRedirect, |state| {
            let run = &state.run(Operation::GetLogRedirect, owner, repo, run_id)?.summary;
            Ok((run.status == "completed")
                .then(|| format!("https://logs.github.test/{owner}/{repo}/{run_id}.zip")))
        })
    }

    async fn list_artifacts(&self, owner: &str, repo: &str, run_id: u64) -> Result<Vec<ArtifactSummary>, GitHubError> {
        self.call(Operation::ListArtifacts, |state| {
            let run = &state.run(Operation::ListArtifacts, owner, repo, run_id)?.summary;
            if run.status != "completed" {
                return Ok(Vec::new());
            }
            Ok(vec![ArtifactSummary {
                id: run_id * 100,
                name: "test-results".to_string(),
                size_in_bytes: 512,
                expired: false,
                archive_download_url: format!(
                    "https://api.github.test/repos/{owner}/{repo}/actions/artifacts/{}/zip",
                    run_id * 100
                ),
            }])
        })
    }

    async fn delete_repository(&self, owner: &str, repo: &str) -> Result<(), GitHubError> {
        self.call(Operation::DeleteRepository, |state| {
            let full_name = format!("{owner}/{repo}");
            if state.repos.remove(&full_name).is_none() {
                return Err(not_found(Operation::DeleteRepository));
            }
            state.runs.retain(|(name, _)| *name != full_name);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_content_yields_identical_ids() {
        let fake = FakePlatform::new("octo");
        fake.create_repository("r", false).await.unwrap();
        let a = fake.create_blob("octo", "r", "hello").await.unwrap();
        let b = fake.create_blob("octo", "r", "hello").await.unwrap();
        let c = fake.create_blob("octo", "r", "other").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn non_fast_forward_is_rejected() {
        let fake = FakePlatform::new("octo");
        fake.create_repository("r", false).await.unwrap();
        let head = fake.get_branch_head("octo", "r", "main").await.unwrap();
        let base = fake.get_commit("octo", "r", &head).await.unwrap();
        let blob = fake.create_blob("octo", "r", "unrelated").await.unwrap();
        let tree = fake
            .create_tree("octo", "r", &base.tree.sha, &[TreeEntry::blob("x.txt", "100644", blob)])
            .await
            .unwrap();
        let orphan = fake
            .create_commit("octo", "r", "orphan", &tree, &[])
            .await
            .unwrap();

        let err = fake.update_branch("octo", "r", "main", &orphan).await.unwrap_err();
        assert_eq!(err.status(), Some(422));
        assert_eq!(fake.branch_head("octo/r", "main"), Some(head));
    }

    #[test]
    fn reads_declared_dispatch_inputs() {
        let declared = declared_inputs(ghrun_core::workflow_template::default_files("x")[1].content.as_str());
        assert!(declared.contains("run_id"));

        let yaml = "on:\n  workflow_dispatch:\n    inputs:\n      browser:\n        default: chrome\n      retries:\n        default: '1'\njobs:\n  t:\n    runs-on: x\n";
        let declared = declared_inputs(yaml);
        assert_eq!(declared.len(), 2);
        assert!(declared.contains("browser") && declared.contains("retries"));
        assert!(declared_inputs("on: workflow_dispatch\n").is_empty());
    }

    #[tokio::test]
    async fn undeclared_dispatch_input_is_rejected() {
        let fake = FakePlatform::new("octo");
        fake.seed_repository("r", "main", &[(".github/workflows/ci.yml", "on: workflow_dispatch\n")]);
        let inputs = BTreeMap::from([("run_id".to_string(), "r1".to_string())]);

        let err = fake
            .dispatch_workflow("octo", "r", "ci.yml", "main", &inputs)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(422));
        assert!(err.body().unwrap().contains(r#"Unexpected inputs provided: [\"run_id\"]"#));
        assert!(fake.dispatches().is_empty());

        fake.dispatch_workflow("octo", "r", "ci.yml", "main", &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(fake.dispatches().len(), 1);
    }

    #[tokio::test]
    async fn injected_failure_is_consumed_once() {
        let fake = FakePlatform::new("octo");
        fake.fail_next(Operation::ViewerLogin, 502, "bad gateway");
        assert_eq!(fake.namespace().await.unwrap_err().status(), Some(502));
        assert_eq!(fake.namespace().await.unwrap(), "octo");
        assert_eq!(fake.calls(Operation::ViewerLogin), 2);
    }
}
