//! Handlers for creating, inspecting and deleting test runs.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use ghrun_core::run::TestRun;
use ghrun_github::models::ArtifactSummary;
use ghrun_pipeline::fetcher::RunLogs;
use ghrun_pipeline::service::{CreateRunRequest, CreatedRun, RunStatusView, ScriptRunRequest};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Turn body-parsing failures into the standard error envelope.
fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

/// POST /runs
///
/// Commit the submitted files, dispatch the workflow and wait until the
/// workflow run is identified.
pub async fn create_run(
    State(state): State<AppState>,
    body: Result<Json<CreateRunRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<DataResponse<CreatedRun>>)> {
    let request = parse_body(body)?;
    let created = state.service.create_and_run(request).await?;
    tracing::info!(
        run_id = %created.run_id,
        repo = %created.repo_full_name,
        workflow_run_id = created.workflow_run_id,
        "Test run created",
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// POST /runs/script
///
/// Run a single Selenium script with the bundled workflow.
pub async fn create_script_run(
    State(state): State<AppState>,
    body: Result<Json<ScriptRunRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<DataResponse<CreatedRun>>)> {
    let request = parse_body(body)?;
    let created = state.service.create_from_script(request).await?;
    tracing::info!(
        run_id = %created.run_id,
        repo = %created.repo_full_name,
        workflow_run_id = created.workflow_run_id,
        "Script run created",
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// GET /runs
pub async fn list_runs(State(state): State<AppState>) -> AppResult<Json<DataResponse<Vec<TestRun>>>> {
    let runs = state.service.list_runs().await;
    Ok(Json(DataResponse { data: runs }))
}

/// GET /runs/{id}
pub async fn get_run_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<RunStatusView>>> {
    let status = state.service.get_status(&id).await?;
    Ok(Json(DataResponse { data: status }))
}

/// GET /runs/{id}/logs
pub async fn get_run_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<RunLogs>>> {
    let logs = state.service.get_logs(&id).await?;
    Ok(Json(DataResponse { data: logs }))
}

/// GET /runs/{id}/artifacts
pub async fn get_run_artifacts(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<Vec<ArtifactSummary>>>> {
    let artifacts = state.service.get_artifacts(&id).await?;
    Ok(Json(DataResponse { data: artifacts }))
}

// ---------------------------------------------------------------------------
// Deletion
// ---------------------------------------------------------------------------

/// DELETE /runs/{id}
///
/// Deletes the backing repository and forgets the run.
pub async fn delete_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.service.delete_run(&id).await?;
    tracing::info!(run_id = %id, "Test run deleted");
    Ok(StatusCode::NO_CONTENT)
}
