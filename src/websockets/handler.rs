use async_trait::async_trait;
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    connection_manager::{ConnectionHandle, ConnectionId, ConnectionRegistry},
    messages::ClientMessage,
    rooms::RoomName,
    socket::{Connection, MessageHandler, SocketWrapper},
};
use crate::session::{bearer_token, Principal};
use crate::shared::{AppError, AppState};

/// Applies room-intent messages to the connection registry
pub struct RoomIntentHandler {
    registry: Arc<dyn ConnectionRegistry>,
}

impl RoomIntentHandler {
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl MessageHandler for RoomIntentHandler {
    async fn handle_message(&self, connection_id: ConnectionId, principal: &Principal, message: String) {
        let Some(intent) = ClientMessage::parse(&message) else {
            debug!(
                connection_id = %connection_id,
                "Ignoring malformed or unknown socket message"
            );
            return;
        };

        match intent {
            ClientMessage::JoinRestaurant => {
                let Some(restaurant_id) = &principal.restaurant_id else {
                    debug!(
                        connection_id = %connection_id,
                        principal_id = %principal.id,
                        "joinRestaurant ignored - principal has no restaurant"
                    );
                    return;
                };
                self.registry
                    .join(connection_id, &RoomName::restaurant(restaurant_id))
                    .await;
            }
            ClientMessage::JoinBill { bill_id } => {
                if bill_id.is_empty() {
                    return;
                }
                self.registry
                    .join(connection_id, &RoomName::bill(bill_id))
                    .await;
                if let Some(restaurant_id) = &principal.restaurant_id {
                    self.registry
                        .join(connection_id, &RoomName::restaurant(restaurant_id))
                        .await;
                }
            }
            ClientMessage::LeaveBill { bill_id } => {
                if bill_id.is_empty() {
                    return;
                }
                self.registry
                    .leave(connection_id, &RoomName::bill(bill_id))
                    .await;
            }
        }
    }
}

/// Query parameters accepted on the socket handshake
#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    pub token: Option<String>,
}

/// Picks the credential from `?token=`, `Authorization: Bearer`, or `Sec-WebSocket-Protocol`
fn handshake_token<'a>(query: &'a WebSocketQuery, headers: &'a HeaderMap) -> Option<&'a str> {
    query
        .token
        .as_deref()
        .filter(|token| !token.is_empty())
        .or_else(|| bearer_token(headers))
        .or_else(|| {
            headers
                .get("sec-websocket-protocol")
                .and_then(|h| h.to_str().ok())
                .filter(|token| !token.is_empty())
        })
}

/// WebSocket endpoint
///
/// GET /ws?token=<jwt>
/// The credential is checked before the upgrade; a failed check answers 401
/// and no connection is ever registered.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WebSocketQuery>,
    headers: HeaderMap,
    State(app_state): State<AppState>,
) -> Result<Response, AppError> {
    let token = handshake_token(&query, &headers).ok_or_else(|| {
        warn!("WebSocket handshake without credential");
        AppError::Unauthorized("Missing authentication token".to_string())
    })?;

    let principal = app_state.authenticator.authenticate(token).await?;

    info!(
        principal_id = %principal.id,
        kind = %principal.kind,
        "WebSocket authentication successful"
    );

    let registry = app_state.connections.clone();
    Ok(ws.on_upgrade(move |socket| {
        handle_websocket_connection(Box::new(socket), principal, registry)
    }))
}

/// Runs one authenticated connection from registration until it is gone
pub async fn handle_websocket_connection(
    socket: Box<dyn SocketWrapper>,
    principal: Principal,
    registry: Arc<dyn ConnectionRegistry>,
) {
    let connection_id = ConnectionId::new();
    let (outbound_sender, outbound_receiver) = mpsc::unbounded_channel::<String>();

    registry
        .register(ConnectionHandle {
            id: connection_id,
            principal: principal.clone(),
            sender: outbound_sender,
        })
        .await;

    info!(
        connection_id = %connection_id,
        principal_id = %principal.id,
        "WebSocket connection established"
    );

    let message_handler = Arc::new(RoomIntentHandler::new(registry.clone()));
    let connection = Connection::new(
        connection_id,
        principal.clone(),
        socket,
        outbound_receiver,
        message_handler,
    );

    match connection.run().await {
        Ok(()) => {
            info!(
                connection_id = %connection_id,
                principal_id = %principal.id,
                "WebSocket connection closed cleanly"
            );
        }
        Err(e) => {
            warn!(
                connection_id = %connection_id,
                principal_id = %principal.id,
                error = ?e,
                "WebSocket connection error"
            );
        }
    }

    let rooms = registry.unregister(connection_id).await;
    debug!(
        connection_id = %connection_id,
        rooms_left = rooms.len(),
        "Connection removed from registry"
    );
}
