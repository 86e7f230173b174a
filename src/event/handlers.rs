use axum::{extract::State, http::StatusCode, Extension};
use tracing::{info, instrument};

use super::events::BillEvent;
use crate::session::Principal;
use crate::shared::{AppError, AppState};

/// Tells every connected client that restaurant staff changed
///
/// POST /staff/updated (staff)
#[instrument(name = "announce_staff_update", skip(state, principal))]
pub async fn announce_staff_update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<StatusCode, AppError> {
    if !principal.is_staff() {
        return Err(AppError::Forbidden("Staff only".to_string()));
    }

    state.events.emit(BillEvent::StaffUpdated).await;
    info!(staff_id = %principal.id, "Staff update announced");
    Ok(StatusCode::NO_CONTENT)
}
