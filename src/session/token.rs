use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, instrument};

use super::{models::SessionModel, types::SessionClaims};
use crate::shared::AppError;

/// Configuration for JWT token operations
#[derive(Clone)]
pub struct TokenConfig {
    secret: String,
    pub ttl_hours: i64,
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>, ttl_hours: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl_hours,
        }
    }

    /// Creates a signed token for a stored session, expiring with it
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub fn create_token(&self, session: &SessionModel) -> Result<String, AppError> {
        let claims = SessionClaims {
            session_id: session.id.clone(),
            principal_id: session.principal_id.clone(),
            restaurant_id: session.restaurant_id.clone(),
            kind: session.kind,
            exp: timestamp(session.expires_at),
            iat: timestamp(session.created_at),
        };

        debug!(exp_timestamp = claims.exp, "Creating JWT token with expiration");

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_ref()),
        )
        .map_err(|e| {
            debug!(error = %e, "Failed to encode JWT token");
            AppError::JwtError(e.to_string())
        })
    }

    /// Validates a JWT token and returns the claims if valid
    #[instrument(skip(self, token))]
    pub fn validate_token(&self, token: &str) -> Result<SessionClaims, AppError> {
        decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::default(),
        )
        .map(|data| {
            debug!(
                principal_id = %data.claims.principal_id,
                session_id = %data.claims.session_id,
                exp = data.claims.exp,
                "JWT token decoded successfully"
            );
            data.claims
        })
        .map_err(|e| {
            debug!(error = %e, "Failed to decode JWT token");
            AppError::JwtError(e.to_string())
        })
    }
}

fn timestamp(at: DateTime<Utc>) -> usize {
    usize::try_from(at.timestamp()).unwrap_or(0)
}
