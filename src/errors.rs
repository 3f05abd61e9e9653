use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::services::booking_flow::FlowError;
use crate::services::sync::WriteError;
use crate::store::{StoreError, StoreErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Store(e) => store_status(e),
            AppError::Flow(e) => match e {
                FlowError::LotFull(_) | FlowError::Busy => StatusCode::CONFLICT,
                FlowError::WrongStep(_) => StatusCode::CONFLICT,
                FlowError::UnknownFlow(_) => StatusCode::NOT_FOUND,
                FlowError::NoSlotSelected
                | FlowError::MissingFields(_)
                | FlowError::InvalidDuration(_) => StatusCode::BAD_REQUEST,
                FlowError::Write(WriteError::InvalidDuration(_)) => StatusCode::BAD_REQUEST,
                FlowError::Write(WriteError::Store(e)) => store_status(e),
            },
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn store_status(e: &StoreError) -> StatusCode {
    match e.kind {
        StoreErrorKind::NotFound => StatusCode::NOT_FOUND,
        StoreErrorKind::Conflict => StatusCode::CONFLICT,
        StoreErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        StoreErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        StoreErrorKind::Unknown => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
