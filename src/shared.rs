use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;

use crate::bill::repository::{BillRepository, InMemoryBillRepository, PostgresBillRepository};
use crate::bill::{BillLocks, BillService};
use crate::config::AppConfig;
use crate::event::{EventEmitter, RoomEventEmitter};
use crate::payment::repository::{
    InMemoryPaymentRepository, PaymentRepository, PostgresPaymentRepository,
};
use crate::payment::{PosClient, SettlementCoordinator};
use crate::session::repository::{
    InMemorySessionRepository, PostgresSessionRepository, SessionRepository,
};
use crate::session::{SessionAuthenticator, TokenConfig};
use crate::websockets::{ConnectionRegistry, InMemoryConnectionRegistry, RoomRouter};

/// Storage backends the application runs on
pub struct Repositories {
    pub sessions: Arc<dyn SessionRepository>,
    pub bills: Arc<dyn BillRepository>,
    pub payments: Arc<dyn PaymentRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            sessions: Arc::new(InMemorySessionRepository::new()),
            bills: Arc::new(InMemoryBillRepository::new()),
            payments: Arc::new(InMemoryPaymentRepository::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            sessions: Arc::new(PostgresSessionRepository::new(pool.clone())),
            bills: Arc::new(PostgresBillRepository::new(pool.clone())),
            payments: Arc::new(PostgresPaymentRepository::new(pool)),
        }
    }
}

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<SessionAuthenticator>,
    pub connections: Arc<dyn ConnectionRegistry>,
    pub events: Arc<dyn EventEmitter>,
    pub bill_service: Arc<BillService>,
    pub settlement: Arc<SettlementCoordinator>,
    pub webhook_secret: Option<String>,
}

impl AppState {
    /// Wires the services over the given storage, with an in-memory connection registry
    pub fn new(config: &AppConfig, repositories: Repositories, pos: Arc<dyn PosClient>) -> Self {
        let connections: Arc<dyn ConnectionRegistry> = Arc::new(InMemoryConnectionRegistry::new());
        let events: Arc<dyn EventEmitter> =
            Arc::new(RoomEventEmitter::new(RoomRouter::new(connections.clone())));
        Self::with_parts(config, repositories, pos, connections, events)
    }

    /// Same as `new` but with caller-supplied registry and event emitter
    pub fn with_parts(
        config: &AppConfig,
        repositories: Repositories,
        pos: Arc<dyn PosClient>,
        connections: Arc<dyn ConnectionRegistry>,
        events: Arc<dyn EventEmitter>,
    ) -> Self {
        let locks = BillLocks::new();
        let authenticator = SessionAuthenticator::new(
            repositories.sessions,
            TokenConfig::new(config.jwt_secret.clone(), config.session_ttl_hours),
        );
        let bill_service = BillService::new(repositories.bills.clone(), locks.clone(), events.clone());
        let settlement = SettlementCoordinator::new(
            repositories.payments,
            repositories.bills,
            locks,
            pos,
            events.clone(),
            config.pos_sync_timeout,
        );

        Self {
            authenticator: Arc::new(authenticator),
            connections,
            events,
            bill_service: Arc::new(bill_service),
            settlement: Arc::new(settlement),
            webhook_secret: config.webhook_secret.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Items already claimed or paid: {}", .item_ids.join(", "))]
    ClaimConflict { item_ids: Vec<String> },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Settlement inconsistency: {0}")]
    SettlementInconsistency(String),

    #[error("Downstream sync failed: {0}")]
    DownstreamSyncFailure(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::JwtError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::ClaimConflict { .. } => (StatusCode::CONFLICT, self.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::SettlementInconsistency(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::DownstreamSyncFailure(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = match self {
            AppError::ClaimConflict { item_ids } => Json(json!({
                "error": error_message,
                "itemIds": item_ids
            })),
            _ => Json(json!({
                "error": error_message
            })),
        };

        (status, body).into_response()
    }
}
