use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{bill, event, payment, session, shared::AppState, websockets};

/// Builds the HTTP and WebSocket edge of the service
///
/// Session creation, the payment callback and the socket upgrade authenticate
/// on their own; everything else sits behind `jwt_auth`.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/bills", post(bill::open_bill))
        .route("/bills/:id", get(bill::get_bill))
        .route("/bills/:id/close", post(bill::close_bill))
        .route(
            "/bills/:id/claims",
            post(bill::claim_items).delete(bill::release_claims),
        )
        .route("/bills/:id/checkout", post(payment::checkout))
        .route("/bills/:id/payments", get(payment::list_payments))
        .route("/staff/updated", post(event::announce_staff_update))
        .route("/sessions/current", delete(session::end_session))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::jwt_auth,
        ));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/sessions", post(session::create_session))
        .route("/payments/webhook", post(payment::payment_webhook))
        .route("/ws", get(websockets::websocket_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PrincipalKind;
    use crate::shared::test_utils::AppStateBuilder;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt; // for `oneshot`

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = build_router(AppStateBuilder::new().build());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_bill_routes_require_a_token() {
        let app = build_router(AppStateBuilder::new().build());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/bills/anything")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logged_out_token_is_refused() {
        let state = AppStateBuilder::new().build();
        let diner = state
            .authenticator
            .issue_customer_session("r1".to_string())
            .await
            .unwrap();
        let app = build_router(state);
        let authed = |method: &str, uri: &str| {
            Request::builder()
                .method(method)
                .uri(uri)
                .header("Authorization", format!("Bearer {}", diner.token))
                .body(Body::empty())
                .unwrap()
        };

        let response = app
            .clone()
            .oneshot(authed("DELETE", "/sessions/current"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.oneshot(authed("GET", "/bills/anything")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_staff_opens_bill_and_diner_claims() {
        let state = AppStateBuilder::new().build();
        let staff = state
            .authenticator
            .issue_session("waiter-1".to_string(), Some("r1".to_string()), PrincipalKind::Staff)
            .await
            .unwrap();
        let diner = state
            .authenticator
            .issue_customer_session("r1".to_string())
            .await
            .unwrap();
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/bills")
                    .header("Authorization", format!("Bearer {}", staff.token))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"restaurantId":"r1","tableNumber":"4","items":[{"name":"Soup","unitPrice":450,"quantity":1}]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bill = body_json(response).await;
        let bill_id = bill["id"].as_str().unwrap().to_string();
        let item_id = bill["items"][0]["id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/bills/{bill_id}/claims"))
                    .header("Authorization", format!("Bearer {}", diner.token))
                    .header("content-type", "application/json")
                    .body(Body::from(format!(r#"{{"itemIds":["{item_id}"]}}"#)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bill = body_json(response).await;
        assert_eq!(bill["items"][0]["status"], "CLAIMED");
        assert_eq!(bill["items"][0]["claimedBy"], diner.principal_id);
    }
}
