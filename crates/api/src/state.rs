use std::sync::Arc;

use ghrun_pipeline::TestRunService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Test-run orchestration (owns the run registry).
    pub service: Arc<TestRunService>,
}
