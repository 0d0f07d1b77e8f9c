use axum::{Json, extract::State};
use refresh_core::RefresherSnapshot;
use refresh_engine::SharedRefresher;
use serde::{Deserialize, Serialize};
use std::sync::PoisonError;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub source: String,
    pub tick_count: u64,
}

/// Get the refresher's current state
pub async fn get_refresher_status(
    State(refresher): State<SharedRefresher>,
) -> Json<RefresherSnapshot> {
    tracing::info!("Getting refresher status");
    let refresher = refresher.lock().unwrap_or_else(PoisonError::into_inner);
    Json(refresher.snapshot())
}

/// Reassign the image source now, without waiting for the timer
pub async fn refresh_now(State(refresher): State<SharedRefresher>) -> Json<RefreshResponse> {
    let refresher = refresher.lock().unwrap_or_else(PoisonError::into_inner);
    let url = refresher.tick();
    tracing::info!("Manual refresh for station '{}'", url.station_id());
    Json(RefreshResponse {
        source: url.to_string(),
        tick_count: refresher.tick_count(),
    })
}
