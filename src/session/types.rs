use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// What kind of participant a session belongs to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalKind {
    /// Restaurant staff member
    Staff,
    /// Diner holding an anonymous table session
    Customer,
}

/// JWT claims structure containing session information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    pub session_id: String,
    pub principal_id: String,
    pub restaurant_id: Option<String>,
    pub kind: PrincipalKind,
    pub exp: usize, // Expiration timestamp (standard JWT claim)
    pub iat: usize, // Issued at timestamp (standard JWT claim)
}

/// Authenticated identity attached to a connection or an HTTP request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: String,
    pub session_id: String,
    pub restaurant_id: Option<String>,
    pub kind: PrincipalKind,
}

impl Principal {
    pub fn is_staff(&self) -> bool {
        self.kind == PrincipalKind::Staff
    }
}

impl From<SessionClaims> for Principal {
    fn from(claims: SessionClaims) -> Self {
        Self {
            id: claims.principal_id,
            session_id: claims.session_id,
            restaurant_id: claims.restaurant_id,
            kind: claims.kind,
        }
    }
}

/// Request body for opening a diner session at a restaurant table
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub restaurant_id: String,
}

/// Response structure for session creation endpoint
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    pub session_id: String,
    pub principal_id: String,
}
