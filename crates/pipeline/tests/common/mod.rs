//! Shared harness for pipeline integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use ghrun_pipeline::service::{CreateRunRequest, ScriptRunRequest};
use ghrun_pipeline::{PipelineConfig, RunRegistry, TestRunService};
use ghrun_test_utils::{fast_backoff, init_test_logging, FakePlatform, PASSING_SCRIPT};

pub const LOGIN: &str = "octo";

/// Pipeline config with millisecond delays.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        request_retry: fast_backoff(3),
        correlation: fast_backoff(5),
        dispatch_retry: fast_backoff(4),
        ..PipelineConfig::default()
    }
}

pub struct Harness {
    pub fake: FakePlatform,
    pub registry: Arc<RunRegistry>,
    pub service: TestRunService,
}

pub fn harness() -> Harness {
    harness_with(fast_config())
}

pub fn harness_with(config: PipelineConfig) -> Harness {
    init_test_logging();
    let fake = FakePlatform::new(LOGIN);
    let registry = Arc::new(RunRegistry::new());
    let service = TestRunService::new(Arc::new(fake.clone()), Arc::clone(&registry), config);
    Harness {
        fake,
        registry,
        service,
    }
}

pub fn script_request(test_name: &str) -> ScriptRunRequest {
    ScriptRunRequest {
        test_name: test_name.to_string(),
        script: PASSING_SCRIPT.to_string(),
        private: None,
    }
}

/// Run an arbitrary file set against an existing workflow.
pub fn files_request(repo_name: &str, files: Vec<ghrun_core::files::FileEntry>) -> CreateRunRequest {
    CreateRunRequest {
        repo_name: Some(repo_name.to_string()),
        private: Some(false),
        files,
        commit_message: None,
        workflow: ghrun_core::workflow_template::WORKFLOW_FILE.to_string(),
        inputs: Default::default(),
    }
}
