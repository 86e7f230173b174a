use axum::{extract::State, http::StatusCode, Extension, Json};
use tracing::{info, instrument};

use super::types::{CreateSessionRequest, Principal, SessionResponse};
use crate::shared::{AppError, AppState};

/// HTTP handler for opening a diner session
///
/// POST /sessions
/// Returns a signed token the diner presents on HTTP calls and on the socket handshake
#[instrument(name = "create_session", skip(state, request))]
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    if request.restaurant_id.trim().is_empty() {
        return Err(AppError::BadRequest("restaurantId is required".to_string()));
    }

    let session = state
        .authenticator
        .issue_customer_session(request.restaurant_id)
        .await?;

    info!(
        principal_id = %session.principal_id,
        session_id = %session.session_id,
        "Diner session created"
    );

    Ok(Json(session))
}

/// Ends the caller's own session; its token stops working immediately
///
/// DELETE /sessions/current
#[instrument(name = "end_session", skip(state, principal))]
pub async fn end_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<StatusCode, AppError> {
    state
        .authenticator
        .revoke_session(&principal.session_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
