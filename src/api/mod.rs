//! The HTTP API surface (component G, spec §4.7): five endpoints in front
//! of the Lease Manager and the Store, wired up the way the pack's web
//! layers assemble an axum `Router` — thin handlers, a shared `State`,
//! permissive CORS for browser-based crawler dashboards.

pub mod handlers;
pub mod state;

pub use state::ApiState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/proxy/acquire", post(handlers::acquire))
        .route("/proxy/release", post(handlers::release))
        .route("/proxy/heartbeat", post(handlers::heartbeat))
        .route("/proxy/stats", get(handlers::stats))
        .route("/proxy/reload", get(handlers::reload))
        .route("/proxy/:candidate", get(handlers::info))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
