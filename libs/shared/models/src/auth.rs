use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session as returned by the external session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Identity attached to a successfully validated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub session_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl From<SessionRecord> for Principal {
    fn from(record: SessionRecord) -> Self {
        Self {
            user_id: record.user_id,
            session_id: record.session_id,
            email: record.email,
            role: record.role,
            expires_at: record.expires_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OperatorClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub role: Option<String>,
    pub iat: Option<u64>,
}

/// Caller of the operator API, extracted from a verified bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operator {
    pub id: String,
    pub role: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
}

impl Operator {
    pub fn can_mutate(&self) -> bool {
        matches!(self.role.as_deref(), Some("operator") | Some("admin"))
    }
}
