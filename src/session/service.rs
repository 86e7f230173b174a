use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    models::SessionModel,
    repository::SessionRepository,
    token::TokenConfig,
    types::{Principal, PrincipalKind, SessionResponse},
};
use crate::shared::AppError;

/// Validates bearer credentials and issues sessions
///
/// A credential is accepted only if its signature and expiry check out
/// and the session it names is still stored (not revoked, not expired).
pub struct SessionAuthenticator {
    token_config: TokenConfig,
    repository: Arc<dyn SessionRepository>,
}

impl SessionAuthenticator {
    pub fn new(repository: Arc<dyn SessionRepository>, token_config: TokenConfig) -> Self {
        Self {
            token_config,
            repository,
        }
    }

    /// Stores a new session for the principal and returns its signed token
    #[instrument(skip(self))]
    pub async fn issue_session(
        &self,
        principal_id: String,
        restaurant_id: Option<String>,
        kind: PrincipalKind,
    ) -> Result<SessionResponse, AppError> {
        let session = SessionModel::new(
            principal_id,
            restaurant_id,
            kind,
            self.token_config.ttl_hours,
        );
        self.repository.create_session(&session).await?;
        let token = self.token_config.create_token(&session)?;

        info!(
            session_id = %session.id,
            principal_id = %session.principal_id,
            kind = %session.kind,
            "Session issued"
        );

        Ok(SessionResponse {
            token,
            session_id: session.id,
            principal_id: session.principal_id,
        })
    }

    /// Opens an anonymous diner session at a restaurant
    pub async fn issue_customer_session(
        &self,
        restaurant_id: String,
    ) -> Result<SessionResponse, AppError> {
        self.issue_session(
            Uuid::new_v4().to_string(),
            Some(restaurant_id),
            PrincipalKind::Customer,
        )
        .await
    }

    /// Resolves a bearer credential to the principal it authenticates
    #[instrument(skip(self, token))]
    pub async fn authenticate(&self, token: &str) -> Result<Principal, AppError> {
        let claims = self.token_config.validate_token(token).map_err(|e| {
            warn!(error = %e, "Rejected credential");
            AppError::Unauthorized("Invalid token".to_string())
        })?;

        let Some(mut session) = self.repository.get_session(&claims.session_id).await? else {
            warn!(
                session_id = %claims.session_id,
                "Session not found - may have been revoked"
            );
            return Err(AppError::Unauthorized(
                "Session not found or has been revoked".to_string(),
            ));
        };

        if session.is_expired() {
            warn!(session_id = %claims.session_id, "Session has expired");
            return Err(AppError::Unauthorized("Session has expired".to_string()));
        }

        if session.principal_id != claims.principal_id {
            warn!(
                session_id = %claims.session_id,
                "Token principal does not match stored session"
            );
            return Err(AppError::Unauthorized("Invalid token".to_string()));
        }

        session.touch();
        if let Err(e) = self.repository.update_session(&session).await {
            warn!(session_id = %session.id, error = %e, "Failed to record session access");
        }

        Ok(Principal {
            id: session.principal_id,
            session_id: session.id,
            restaurant_id: session.restaurant_id,
            kind: session.kind,
        })
    }

    /// Revokes a session so its token stops authenticating
    #[instrument(skip(self))]
    pub async fn revoke_session(&self, session_id: &str) -> Result<(), AppError> {
        self.repository.delete_session(session_id).await?;
        info!(session_id = %session_id, "Session revoked");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, AppError> {
        let removed = self.repository.cleanup_expired_sessions().await?;
        info!(removed_sessions = removed, "Expired sessions cleanup completed");
        Ok(removed)
    }
}
