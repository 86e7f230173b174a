use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Extension, Json,
};
use tracing::{debug, info, instrument, warn};

use super::{
    models::{PaymentModel, PaymentStatus},
    types::{
        CheckoutRequest, CheckoutResponse, FailureOutcome, SettlementOutcome, WebhookEvent,
        WebhookResponse,
    },
};
use crate::bill::ensure_restaurant_access;
use crate::session::Principal;
use crate::shared::{AppError, AppState};

/// HTTP handler for starting payment of some items
///
/// POST /bills/:id/checkout
/// Returns the provider reference the payment page must carry
#[instrument(name = "checkout", skip(state, principal, request))]
pub async fn checkout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(bill_id): Path<String>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let bill = state.bill_service.get_bill(&bill_id).await?;
    ensure_restaurant_access(&principal, &bill)?;

    let payment = state
        .settlement
        .initiate_checkout(&bill_id, &request.item_ids)
        .await?;

    info!(
        bill_id = %bill_id,
        payment_id = %payment.id,
        principal_id = %principal.id,
        "Checkout created"
    );
    Ok(Json(CheckoutResponse::from(&payment)))
}

/// GET /bills/:id/payments
#[instrument(name = "list_payments", skip(state, principal))]
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(bill_id): Path<String>,
) -> Result<Json<Vec<PaymentModel>>, AppError> {
    let bill = state.bill_service.get_bill(&bill_id).await?;
    ensure_restaurant_access(&principal, &bill)?;

    let payments = state.settlement.payments_for_bill(&bill_id).await?;
    debug!(bill_id = %bill_id, count = payments.len(), "Payments listed");
    Ok(Json(payments))
}

/// Payment provider callback
///
/// POST /payments/webhook
/// Any error answer makes the provider retry, so only a completed settlement
/// (or a recognised duplicate) answers 200.
#[instrument(name = "payment_webhook", skip(state, headers))]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<WebhookEvent>,
) -> Result<Json<WebhookResponse>, AppError> {
    if let Some(secret) = &state.webhook_secret {
        let presented = headers
            .get("x-webhook-secret")
            .map(|h| h.as_bytes())
            .unwrap_or_default();
        if !constant_time_eq(presented, secret.as_bytes()) {
            warn!("Webhook rejected: bad or missing secret");
            return Err(AppError::Unauthorized("Invalid webhook secret".to_string()));
        }
    }

    let response = match event.event_type.as_str() {
        "payment.succeeded" => match state.settlement.settle(&event.reference).await? {
            SettlementOutcome::Settled {
                payment, pos_sync, ..
            } => WebhookResponse {
                status: "settled".to_string(),
                payment_id: Some(payment.id),
                pos_sync: Some(pos_sync),
            },
            SettlementOutcome::AlreadyProcessed(payment) => WebhookResponse {
                status: "alreadyProcessed".to_string(),
                payment_id: Some(payment.id),
                pos_sync: None,
            },
        },
        "payment.failed" | "payment.cancelled" => {
            let status = if event.event_type == "payment.failed" {
                PaymentStatus::Failed
            } else {
                PaymentStatus::Cancelled
            };
            match state.settlement.record_failure(&event.reference, status).await? {
                FailureOutcome::Recorded(payment) => WebhookResponse {
                    status: "recorded".to_string(),
                    payment_id: Some(payment.id),
                    pos_sync: None,
                },
                FailureOutcome::AlreadyProcessed(payment) => WebhookResponse {
                    status: "alreadyProcessed".to_string(),
                    payment_id: Some(payment.id),
                    pos_sync: None,
                },
            }
        }
        other => {
            debug!(event_type = %other, "Ignoring webhook event");
            WebhookResponse {
                status: "ignored".to_string(),
                payment_id: None,
                pos_sync: None,
            }
        }
    };

    Ok(Json(response))
}

/// Byte comparison whose running time does not depend on where inputs differ
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}
