pub mod health;
pub mod runs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /runs                         create (POST), list (GET)
/// /runs/script                  create from a single script (POST)
/// /runs/{id}                    status (GET), delete (DELETE)
/// /runs/{id}/logs               jobs, steps and log archive link
/// /runs/{id}/artifacts          uploaded artifacts
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/runs", runs::router())
}
