use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use ghrun_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `ghrun_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;

        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Permission(msg) => {
                    (StatusCode::FORBIDDEN, "PERMISSION_DENIED", msg.clone())
                }
                CoreError::CorrelationTimeout { .. } => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "CORRELATION_TIMEOUT",
                    core.to_string(),
                ),
                CoreError::TransientNetwork(msg) => {
                    tracing::warn!(error = %msg, "Upstream request failed");
                    (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE", msg.clone())
                }
                CoreError::RateLimited {
                    message,
                    retry_after_secs,
                } => {
                    retry_after = *retry_after_secs;
                    (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message.clone())
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        // The caller needs the run id to poll or clean up later.
        if let AppError::Core(CoreError::CorrelationTimeout { run_id, .. }) = &self {
            body["run_id"] = json!(run_id);
        }

        let mut response = (status, axum::Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from(secs));
        }
        response
    }
}
