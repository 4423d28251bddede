use std::net::SocketAddr;
use std::sync::Arc;

use ghrun_github::GitHubClient;
use ghrun_pipeline::{RunRegistry, TestRunService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ghrun_api::config::ServerConfig;
use ghrun_api::router::build_app_router;
use ghrun_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ghrun_api=debug,ghrun_pipeline=debug,ghrun_github=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().unwrap_or_else(|e| panic!("Invalid configuration: {e}"));
    tracing::info!(
        host = %config.host,
        port = %config.port,
        github_api = %config.github.api_url,
        org = config.github.org.as_deref().unwrap_or("<token user>"),
        "Loaded server configuration",
    );

    // --- GitHub client ---
    let github = GitHubClient::new(config.github.clone()).expect("Failed to build GitHub HTTP client");

    // --- Run registry + service ---
    let registry = Arc::new(RunRegistry::new());
    let service = Arc::new(TestRunService::new(
        Arc::new(github),
        Arc::clone(&registry),
        config.pipeline.clone(),
    ));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        service,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // Runs live only in memory; their repositories outlive the process.
    let remaining = registry.len().await;
    if remaining > 0 {
        tracing::warn!(remaining, "Shutting down with registered runs; their repositories are left in place");
    }
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
