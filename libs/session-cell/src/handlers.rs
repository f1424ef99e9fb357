use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};

use shared_utils::bearer_token;

use crate::error::SessionError;
use crate::models::{ValidateSessionRequest, ValidateSessionResponse};
use crate::services::ResilientSessionValidator;

/// Token comes from the JSON body, else from the bearer header.
pub async fn validate_session(
    State(validator): State<Arc<ResilientSessionValidator>>,
    headers: HeaderMap,
    body: Option<Json<ValidateSessionRequest>>,
) -> Result<Json<ValidateSessionResponse>, SessionError> {
    let token = body
        .and_then(|Json(request)| request.token)
        .or_else(|| bearer_token(&headers).ok().map(str::to_string))
        .unwrap_or_default();

    let principal = validator.validate(&token).await?;
    Ok(Json(ValidateSessionResponse {
        valid: true,
        principal,
    }))
}
