//! Route definitions for test runs.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::runs;
use crate::state::AppState;

/// Routes mounted at `/runs`.
///
/// ```text
/// POST   /                  -> create_run
/// GET    /                  -> list_runs
/// POST   /script            -> create_script_run
/// GET    /{id}              -> get_run_status
/// DELETE /{id}              -> delete_run
/// GET    /{id}/logs         -> get_run_logs
/// GET    /{id}/artifacts    -> get_run_artifacts
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(runs::list_runs).post(runs::create_run))
        .route("/script", post(runs::create_script_run))
        .route(
            "/{id}",
            get(runs::get_run_status).delete(runs::delete_run),
        )
        .route("/{id}/logs", get(runs::get_run_logs))
        .route("/{id}/artifacts", get(runs::get_run_artifacts))
}
