pub mod bookings;
pub mod driving;
pub mod events;
pub mod flows;
pub mod health;
pub mod lots;
pub mod session;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/lots", get(lots::list_lots))
        .route("/api/lots/nearby", get(lots::nearby_lots))
        .route("/api/lots/:id/slots", get(lots::lot_slots))
        .route("/api/bookings", get(bookings::list_bookings))
        .route(
            "/api/session",
            get(session::current_session)
                .post(session::sign_in)
                .delete(session::sign_out),
        )
        .route("/api/flows", post(flows::open_flow))
        .route(
            "/api/flows/:id",
            get(flows::get_flow).delete(flows::close_flow),
        )
        .route("/api/flows/:id/select", post(flows::select_slot))
        .route("/api/flows/:id/continue", post(flows::continue_to_details))
        .route("/api/flows/:id/details", put(flows::update_details))
        .route("/api/flows/:id/review", post(flows::review))
        .route("/api/flows/:id/back", post(flows::back))
        .route("/api/flows/:id/submit", post(flows::submit))
        .route("/api/driving", get(driving::snapshot))
        .route("/api/driving/start", post(driving::start))
        .route("/api/driving/stop", post(driving::stop))
        .route("/api/events", get(events::events_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
