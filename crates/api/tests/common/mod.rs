#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use ghrun_github::GitHubConfig;
use ghrun_pipeline::{PipelineConfig, RunRegistry, TestRunService};
use ghrun_test_utils::{fast_backoff, init_test_logging, FakePlatform};
use http_body_util::BodyExt;
use tower::ServiceExt;

use ghrun_api::config::ServerConfig;
use ghrun_api::router::build_app_router;
use ghrun_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults and millisecond retry
/// schedules.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        github: GitHubConfig::new("test-token"),
        pipeline: PipelineConfig {
            request_retry: fast_backoff(3),
            correlation: fast_backoff(5),
            dispatch_retry: fast_backoff(4),
            ..PipelineConfig::default()
        },
    }
}

/// Build the full application router against an in-memory platform.
///
/// Uses the same middleware stack as `main.rs`. The returned fake shares
/// state with the one wired into the app.
pub fn build_test_app() -> (Router, FakePlatform) {
    init_test_logging();
    let config = test_config();
    let fake = FakePlatform::new("octo");
    let service = TestRunService::new(
        Arc::new(fake.clone()),
        Arc::new(RunRegistry::new()),
        config.pipeline.clone(),
    );
    let state = AppState {
        config: Arc::new(config.clone()),
        service: Arc::new(service),
    };
    (build_app_router(state, &config), fake)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_json(app: Router, uri: &str, json: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Body::from(json.to_string())).await
}

async fn send(app: Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    tokio::time::timeout(Duration::from_secs(10), app.oneshot(request))
        .await
        .expect("request timed out")
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
