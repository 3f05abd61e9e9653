use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::Session;
use crate::state::AppState;

/// Access token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    auth.strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// The caller's session, if its bearer token is signed in.
pub fn resolve_session(state: &AppState, headers: &HeaderMap) -> Option<Session> {
    bearer_token(headers).and_then(|token| state.sessions.current_session(token))
}

/// The caller's access token, or 401 if it is missing or not signed in.
pub fn signed_in_token(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;
    if state.sessions.current_session(token).is_none() {
        return Err(AppError::Unauthorized("session expired or unknown".to_string()));
    }
    Ok(token.to_string())
}

// GET /api/session
pub async fn current_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<Option<Session>> {
    Json(resolve_session(&state, &headers))
}

// POST /api/session
#[derive(Deserialize)]
pub struct SignInRequest {
    pub user_id: String,
}

pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignInRequest>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let user_id = req.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::BadRequest("user_id is required".to_string()));
    }
    Ok((StatusCode::CREATED, Json(state.sessions.sign_in(user_id))))
}

// DELETE /api/session
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;
    state.sessions.sign_out(token);
    Ok(StatusCode::NO_CONTENT)
}
