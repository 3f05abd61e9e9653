use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::session::resolve_session;
use crate::services::booking_flow::{BookingFlow, DetailsUpdate, FlowError, FlowView, SubmitReceipt};
use crate::state::AppState;

/// Runs `step` against one open flow and returns its updated view.
fn with_flow(
    state: &AppState,
    flow_id: &str,
    step: impl FnOnce(&mut BookingFlow) -> Result<(), FlowError>,
) -> Result<Json<FlowView>, AppError> {
    let view = state.flows.with_flow(flow_id, |flow| {
        step(flow)?;
        Ok(flow.view())
    })?;
    Ok(Json(view))
}

// POST /api/flows
#[derive(Deserialize)]
pub struct OpenFlowRequest {
    pub lot_id: String,
}

pub async fn open_flow(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OpenFlowRequest>,
) -> Result<(StatusCode, Json<FlowView>), AppError> {
    let lot = state
        .sync
        .find_lot(&req.lot_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("parking lot {}", req.lot_id)))?;

    let flow = BookingFlow::open(lot, state.config.slot_view_cap, &mut rand::thread_rng())?;
    let view = flow.view();
    tracing::info!(flow_id = %view.id, lot_id = %req.lot_id, "booking flow opened");

    state.flows.insert(flow);
    Ok((StatusCode::CREATED, Json(view)))
}

// GET /api/flows/:id
pub async fn get_flow(
    State(state): State<Arc<AppState>>,
    Path(flow_id): Path<String>,
) -> Result<Json<FlowView>, AppError> {
    with_flow(&state, &flow_id, |_| Ok(()))
}

// POST /api/flows/:id/select
#[derive(Deserialize)]
pub struct SelectSlotRequest {
    pub slot_id: String,
}

pub async fn select_slot(
    State(state): State<Arc<AppState>>,
    Path(flow_id): Path<String>,
    Json(req): Json<SelectSlotRequest>,
) -> Result<Json<FlowView>, AppError> {
    with_flow(&state, &flow_id, |flow| {
        if !flow.select_slot(&req.slot_id) {
            tracing::debug!(flow_id = %flow.id(), slot_id = %req.slot_id, "slot pick ignored");
        }
        Ok(())
    })
}

// POST /api/flows/:id/continue
pub async fn continue_to_details(
    State(state): State<Arc<AppState>>,
    Path(flow_id): Path<String>,
) -> Result<Json<FlowView>, AppError> {
    with_flow(&state, &flow_id, BookingFlow::continue_to_details)
}

// PUT /api/flows/:id/details
pub async fn update_details(
    State(state): State<Arc<AppState>>,
    Path(flow_id): Path<String>,
    Json(update): Json<DetailsUpdate>,
) -> Result<Json<FlowView>, AppError> {
    with_flow(&state, &flow_id, |flow| flow.update_details(update))
}

// POST /api/flows/:id/review
pub async fn review(
    State(state): State<Arc<AppState>>,
    Path(flow_id): Path<String>,
) -> Result<Json<FlowView>, AppError> {
    with_flow(&state, &flow_id, BookingFlow::review)
}

// POST /api/flows/:id/back
pub async fn back(
    State(state): State<Arc<AppState>>,
    Path(flow_id): Path<String>,
) -> Result<Json<FlowView>, AppError> {
    with_flow(&state, &flow_id, |flow| {
        flow.back();
        Ok(())
    })
}

// POST /api/flows/:id/submit
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(flow_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SubmitReceipt>, AppError> {
    let session = resolve_session(&state, &headers);

    // The registry lock is released while the store works; the busy flag
    // keeps a second submit for the same flow out.
    let booking = state
        .flows
        .with_flow(&flow_id, |flow| flow.begin_submit(session.as_ref()))?;

    // Runs detached from the request so the flow always settles, even if
    // the client hangs up mid-write.
    let task_state = Arc::clone(&state);
    let task_flow_id = flow_id.clone();
    let commit = tokio::spawn(async move {
        let result = task_state.sync.commit_booking(&booking).await;
        task_state.flows.finish_submit(
            &task_flow_id,
            result,
            &task_state.config.admin_whatsapp_number,
            &task_state.notices,
        )
    });
    let receipt = commit
        .await
        .map_err(|e| AppError::Internal(format!("submit task failed: {e}")))??;

    tracing::info!(
        flow_id = %flow_id,
        booking_id = %receipt.booking_id,
        slot = %receipt.slot_number,
        "booking submitted"
    );
    Ok(Json(receipt))
}

// DELETE /api/flows/:id
pub async fn close_flow(
    State(state): State<Arc<AppState>>,
    Path(flow_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.flows.close(&flow_id)?;
    Ok(StatusCode::NO_CONTENT)
}
