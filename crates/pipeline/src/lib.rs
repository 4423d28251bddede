//! Commit-and-correlate orchestration.
//!
//! Turns a file set into a workflow run on the remote platform and tracks it:
//!
//! ```text
//! RepositoryProvisioner -> CommitPipeline -> WorkflowDispatcher
//!     -> RunCorrelator -> RunRegistry
//!     -> StatusAndLogFetcher | CleanupService   (later, by run id)
//! ```
//!
//! [`TestRunService`](service::TestRunService) wires the stages together and
//! is the entry point the HTTP layer calls.

pub mod cleanup;
pub mod commit;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod fetcher;
pub mod provisioner;
pub mod registry;
pub mod service;

pub use config::PipelineConfig;
pub use registry::RunRegistry;
pub use service::TestRunService;
