//! Station refresh status API
//!
//! This library provides the HTTP surface of the headless station viewer:
//! health, refresher status and on-demand refresh.

mod refresher;

pub use crate::refresher::RefreshResponse;

use axum::{
    Router,
    routing::{get, post},
};
use refresh_engine::SharedRefresher;
use tower_http::trace::TraceLayer;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Create the application router with all endpoints
pub fn create_app(refresher: SharedRefresher) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/refresher/status", get(refresher::get_refresher_status))
        .route("/refresher/refresh", post(refresher::refresh_now))
        .layer(TraceLayer::new_for_http())
        .with_state(refresher)
}
