use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::handlers::session::resolve_session;
use crate::models::Booking;
use crate::state::AppState;

// GET /api/bookings
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<Vec<Booking>> {
    let session = resolve_session(&state, &headers);
    Json(state.sync.list_bookings(session.as_ref()).await)
}
