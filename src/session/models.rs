use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::PrincipalKind;

/// Database model for sessions table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionModel {
    pub id: String,
    pub principal_id: String,
    pub restaurant_id: Option<String>,
    pub kind: PrincipalKind,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl SessionModel {
    /// Creates a new session model with generated ID and timestamps
    pub fn new(
        principal_id: String,
        restaurant_id: Option<String>,
        kind: PrincipalKind,
        ttl_hours: i64,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            principal_id,
            restaurant_id,
            kind,
            created_at: now,
            expires_at: now + chrono::Duration::hours(ttl_hours),
            last_accessed: Some(now),
        }
    }

    /// Checks if the session has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Updates the last accessed timestamp
    pub fn touch(&mut self) {
        self.last_accessed = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_model() {
        let session = SessionModel::new(
            "staff-1".to_string(),
            Some("r1".to_string()),
            PrincipalKind::Staff,
            8,
        );

        assert_eq!(session.principal_id, "staff-1");
        assert!(!session.id.is_empty());
        assert!(session.expires_at > session.created_at);
        assert!(!session.is_expired());
    }

    #[test]
    fn test_session_expiration() {
        let session = SessionModel::new("diner".to_string(), None, PrincipalKind::Customer, -1);
        assert!(session.is_expired());
    }
}
