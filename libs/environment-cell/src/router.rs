use axum::{routing::get, Router};
use std::sync::Arc;

use shared_config::AppConfig;

use crate::handlers::get_environment;

pub fn create_environment_router(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/environment", get(get_environment))
        .with_state(config)
}
