use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::errors::AppError;
use crate::handlers::session::signed_in_token;
use crate::services::driving::DrivingSnapshot;
use crate::state::AppState;

// POST /api/driving/start
pub async fn start(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DrivingSnapshot>, AppError> {
    let token = signed_in_token(&state, &headers)?;
    let listing = state.sync.list_lots().await;
    let mode = state.driving.mode(&token);
    if !mode.start(listing.lots) {
        tracing::debug!("driving mode already running");
    }
    Ok(Json(mode.snapshot()))
}

// POST /api/driving/stop
pub async fn stop(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DrivingSnapshot>, AppError> {
    let token = signed_in_token(&state, &headers)?;
    let mode = state.driving.mode(&token);
    mode.stop();
    Ok(Json(mode.snapshot()))
}

// GET /api/driving
pub async fn snapshot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DrivingSnapshot>, AppError> {
    let token = signed_in_token(&state, &headers)?;
    Ok(Json(state.driving.mode(&token).snapshot()))
}
