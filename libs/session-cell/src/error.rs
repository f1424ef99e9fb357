use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Invalid or expired session")]
    InvalidSession,

    /// The session store breaker is open. Not an authentication verdict.
    #[error("Session validation is temporarily unavailable")]
    TemporarilyUnavailable { retry_at: Option<DateTime<Utc>> },

    #[error("Session store error: {0}")]
    StoreUnavailable(String),
}

impl SessionError {
    pub fn is_temporary(&self) -> bool {
        !matches!(self, SessionError::InvalidSession)
    }
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match &self {
            SessionError::InvalidSession => StatusCode::UNAUTHORIZED,
            SessionError::TemporarilyUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::StoreUnavailable(_) => StatusCode::BAD_GATEWAY,
        };

        let retry_after = match &self {
            SessionError::TemporarilyUnavailable { retry_at: Some(at) } => {
                let seconds = (*at - Utc::now()).num_seconds().max(1);
                HeaderValue::from_str(&seconds.to_string()).ok()
            }
            _ => None,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "retryable": self.is_temporary(),
            "timestamp": Utc::now(),
        }));

        let mut response = (status, body).into_response();
        if let Some(value) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}
