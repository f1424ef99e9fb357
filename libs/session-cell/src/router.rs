use std::sync::Arc;

use axum::{routing::post, Router};

use crate::handlers::validate_session;
use crate::services::ResilientSessionValidator;

pub fn create_session_router(validator: Arc<ResilientSessionValidator>) -> Router {
    Router::new()
        .route("/sessions/validate", post(validate_session))
        .with_state(validator)
}
