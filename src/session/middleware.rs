use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, warn};

use crate::shared::{AppError, AppState};

/// Pulls the bearer token out of an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// JWT authentication middleware - validates the Authorization Bearer header and adds the
/// authenticated `Principal` to the request.
/// Usage: .layer(middleware::from_fn_with_state(app_state.clone(), session::jwt_auth))
/// Handlers can then extract `Extension(principal): Extension<Principal>`.
#[instrument(skip(state, req, next))]
pub async fn jwt_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers()).ok_or_else(|| {
        warn!(uri = %req.uri(), "Missing or malformed Authorization header");
        AppError::Unauthorized("Missing authorization header".to_string())
    })?;

    let principal = state.authenticator.authenticate(token).await?;

    debug!(
        principal_id = %principal.id,
        session_id = %principal.session_id,
        "Authentication successful, adding principal to request"
    );

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
