use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use shared_models::auth::Operator;
use shared_models::error::AppError;

use crate::jwt::validate_operator_token;

/// Operator API authentication settings. With no secret configured every
/// request passes through unauthenticated.
#[derive(Debug, Clone, Default)]
pub struct OperatorAuth {
    secret: Option<String>,
}

impl OperatorAuth {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    pub fn disabled() -> Self {
        Self { secret: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth_value = headers
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    auth_value
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))
}

// Guards mutating operator routes
pub async fn operator_auth_middleware(
    State(auth): State<Arc<OperatorAuth>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(secret) = auth.secret.as_deref() else {
        return Ok(next.run(request).await);
    };

    let token = bearer_token(request.headers())?;
    let operator = validate_operator_token(token, secret).map_err(AppError::Auth)?;

    if !operator.can_mutate() {
        return Err(AppError::Forbidden(format!(
            "Operator {} is not allowed to change monitoring state",
            operator.id
        )));
    }

    tracing::debug!(operator = %operator.id, "Operator request authorized");
    request.extensions_mut().insert::<Operator>(operator);
    Ok(next.run(request).await)
}
