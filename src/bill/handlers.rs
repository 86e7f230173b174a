use axum::{
    extract::{Path, State},
    Extension, Json,
};
use tracing::{info, instrument, warn};

use super::{
    models::{BillSnapshot, NewBill},
    types::ClaimItemsRequest,
};
use crate::session::Principal;
use crate::shared::{AppError, AppState};

/// Refuses principals bound to a different restaurant than the bill's
pub fn ensure_restaurant_access(principal: &Principal, bill: &BillSnapshot) -> Result<(), AppError> {
    match &principal.restaurant_id {
        Some(restaurant_id) if restaurant_id != bill.restaurant_id() => {
            warn!(
                principal_id = %principal.id,
                bill_id = %bill.id(),
                "Principal belongs to another restaurant"
            );
            Err(AppError::Forbidden(
                "Bill belongs to another restaurant".to_string(),
            ))
        }
        _ => Ok(()),
    }
}

fn ensure_staff(principal: &Principal) -> Result<(), AppError> {
    if principal.is_staff() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Staff only".to_string()))
    }
}

/// HTTP handler for opening a bill
///
/// POST /bills (staff)
#[instrument(name = "open_bill", skip(state, principal, request))]
pub async fn open_bill(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<NewBill>,
) -> Result<Json<BillSnapshot>, AppError> {
    ensure_staff(&principal)?;
    if principal
        .restaurant_id
        .as_ref()
        .is_some_and(|id| id != &request.restaurant_id)
    {
        return Err(AppError::Forbidden(
            "Cannot open bills for another restaurant".to_string(),
        ));
    }

    let bill = state.bill_service.open_bill(request).await?;
    info!(bill_id = %bill.id(), staff_id = %principal.id, "Bill opened via HTTP");
    Ok(Json(bill))
}

/// GET /bills/:id
#[instrument(name = "get_bill", skip(state, principal))]
pub async fn get_bill(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(bill_id): Path<String>,
) -> Result<Json<BillSnapshot>, AppError> {
    let bill = state.bill_service.get_bill(&bill_id).await?;
    ensure_restaurant_access(&principal, &bill)?;
    Ok(Json(bill))
}

/// HTTP handler for claiming items on behalf of the caller
///
/// POST /bills/:id/claims
/// 409 with the conflicting ids when any item is already taken
#[instrument(name = "claim_items", skip(state, principal, request))]
pub async fn claim_items(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(bill_id): Path<String>,
    Json(request): Json<ClaimItemsRequest>,
) -> Result<Json<BillSnapshot>, AppError> {
    let bill = state.bill_service.get_bill(&bill_id).await?;
    ensure_restaurant_access(&principal, &bill)?;

    let bill = state
        .bill_service
        .claim(&bill_id, &request.item_ids, &principal.id)
        .await?;
    Ok(Json(bill))
}

/// DELETE /bills/:id/claims
#[instrument(name = "release_claims", skip(state, principal))]
pub async fn release_claims(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(bill_id): Path<String>,
) -> Result<Json<BillSnapshot>, AppError> {
    let bill = state.bill_service.get_bill(&bill_id).await?;
    ensure_restaurant_access(&principal, &bill)?;

    let bill = state.bill_service.release(&bill_id, &principal.id).await?;
    Ok(Json(bill))
}

/// POST /bills/:id/close (staff)
#[instrument(name = "close_bill", skip(state, principal))]
pub async fn close_bill(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(bill_id): Path<String>,
) -> Result<Json<BillSnapshot>, AppError> {
    ensure_staff(&principal)?;
    let bill = state.bill_service.get_bill(&bill_id).await?;
    ensure_restaurant_access(&principal, &bill)?;

    let bill = state.bill_service.close_bill(&bill_id).await?;
    Ok(Json(bill))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bill::models::NewBillItem;
    use crate::session::PrincipalKind;
    use crate::shared::test_utils::AppStateBuilder;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::{get, post},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt; // for `oneshot`

    fn principal(id: &str, restaurant_id: &str, kind: PrincipalKind) -> Principal {
        Principal {
            id: id.to_string(),
            session_id: format!("session-{id}"),
            restaurant_id: Some(restaurant_id.to_string()),
            kind,
        }
    }

    fn app(state: AppState, principal: Principal) -> Router {
        Router::new()
            .route("/bills", post(open_bill))
            .route("/bills/:id", get(get_bill))
            .route("/bills/:id/claims", post(claim_items).delete(release_claims))
            .route("/bills/:id/close", post(close_bill))
            .layer(Extension(principal))
            .with_state(state)
    }

    async fn seeded_bill(state: &AppState) -> BillSnapshot {
        state
            .bill_service
            .open_bill(NewBill {
                restaurant_id: "r1".to_string(),
                table_number: None,
                external_sale_id: None,
                items: vec![NewBillItem {
                    name: "Burger".to_string(),
                    unit_price: 100,
                    quantity: 1,
                    external_item_id: None,
                }],
            })
            .await
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn claim_request(bill_id: &str, item_id: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/bills/{bill_id}/claims"))
            .header("content-type", "application/json")
            .body(Body::from(format!(r#"{{"itemIds": ["{item_id}"]}}"#)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_claim_handler_then_conflict() {
        let state = AppStateBuilder::new().build();
        let bill = seeded_bill(&state).await;
        let item_id = bill.items[0].id.clone();

        let alice = app(state.clone(), principal("alice", "r1", PrincipalKind::Customer));
        let response = alice.oneshot(claim_request(bill.id(), &item_id)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["items"][0]["claimedBy"], "alice");

        let bob = app(state, principal("bob", "r1", PrincipalKind::Customer));
        let response = bob.oneshot(claim_request(bill.id(), &item_id)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["itemIds"][0], item_id.as_str());
    }

    #[tokio::test]
    async fn test_other_restaurant_is_forbidden() {
        let state = AppStateBuilder::new().build();
        let bill = seeded_bill(&state).await;

        let outsider = app(state, principal("eve", "r2", PrincipalKind::Customer));
        let response = outsider
            .oneshot(
                Request::builder()
                    .uri(format!("/bills/{}", bill.id()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_bill_is_not_found() {
        let state = AppStateBuilder::new().build();
        let diner = app(state, principal("alice", "r1", PrincipalKind::Customer));

        let response = diner.oneshot(claim_request("missing", "i1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_open_and_close_are_staff_only() {
        let state = AppStateBuilder::new().build();
        let body = r#"{"restaurantId": "r1", "items": [{"name": "Soup", "unitPrice": 80, "quantity": 2}]}"#;

        let diner = app(state.clone(), principal("alice", "r1", PrincipalKind::Customer));
        let response = diner
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/bills")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let staff = app(state.clone(), principal("waiter", "r1", PrincipalKind::Staff));
        let response = staff
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/bills")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["totalAmount"], 160);
        let bill_id = json["id"].as_str().unwrap().to_string();

        let response = staff
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/bills/{bill_id}/close"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "CLOSED");
    }
}
