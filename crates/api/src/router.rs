//! Application router shared by `main.rs` and the integration tests.

use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::routes;
use crate::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Headroom on top of the correlation polling budget for the commit and
/// dispatch calls that precede it.
const CREATION_HEADROOM: Duration = Duration::from_secs(15);

/// Build the relay's [`Router`]: `/health` at the root, the run API under
/// `/api/v1`, wrapped in the middleware stack below (outermost last).
///
/// ```text
/// cors
/// set x-request-id (uuid v4)
/// trace (INFO spans)
/// propagate x-request-id
/// timeout (408)
/// catch panic (500)
/// ```
pub fn build_app_router(state: AppState, config: &ServerConfig) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout(config),
        ))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(trace)
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(build_cors_layer(config))
        .with_state(state)
}

/// Effective per-request timeout.
///
/// Run creation blocks until correlation finishes, so the configured value
/// is raised to the worst-case polling time plus [`CREATION_HEADROOM`].
pub fn request_timeout(config: &ServerConfig) -> Duration {
    let configured = Duration::from_secs(config.request_timeout_secs);
    let polling: Duration = config.pipeline.correlation.delays().iter().sum();
    let floor = polling + CREATION_HEADROOM;
    if configured < floor {
        tracing::warn!(
            configured_secs = configured.as_secs(),
            effective_secs = floor.as_secs(),
            "REQUEST_TIMEOUT_SECS is shorter than the correlation budget; raising it",
        );
        floor
    } else {
        configured
    }
}

/// CORS for browser dashboards. Origins were validated at config load.
pub fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}
