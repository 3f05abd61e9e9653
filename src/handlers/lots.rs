use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::services::availability::{self, LotView, Nearby};
use crate::services::slots::{self, FloorGrid};
use crate::services::sync::LotSource;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LotQuery {
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct LotList {
    pub source: LotSource,
    pub lots: Vec<LotView>,
}

// GET /api/lots?q=
pub async fn list_lots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LotQuery>,
) -> Json<LotList> {
    let listing = state.sync.list_lots().await;
    state.driving.update_lots(&listing.lots);

    let lots = availability::search(&listing.lots, query.q.as_deref().unwrap_or(""))
        .into_iter()
        .cloned()
        .map(LotView::new)
        .collect();

    Json(LotList {
        source: listing.source,
        lots,
    })
}

// GET /api/lots/nearby
pub async fn nearby_lots(State(state): State<Arc<AppState>>) -> Json<Nearby> {
    let listing = state.sync.list_lots().await;
    Json(availability::nearby(&listing.lots))
}

#[derive(Serialize)]
pub struct SlotGrid {
    pub lot: LotView,
    pub floors: Vec<FloorGrid>,
}

// GET /api/lots/:id/slots
pub async fn lot_slots(
    State(state): State<Arc<AppState>>,
    Path(lot_id): Path<String>,
) -> Result<Json<SlotGrid>, AppError> {
    let lot = state
        .sync
        .find_lot(&lot_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("parking lot {lot_id}")))?;

    let generated = slots::generate(
        &lot.id,
        lot.total_slots,
        state.config.slot_view_cap,
        &mut rand::thread_rng(),
    );

    Ok(Json(SlotGrid {
        floors: slots::group_by_floor(&generated),
        lot: LotView::new(lot),
    }))
}
