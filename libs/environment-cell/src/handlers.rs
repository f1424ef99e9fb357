use axum::{extract::State, response::Json};
use std::sync::Arc;
use tracing::debug;

use shared_config::AppConfig;

use crate::models::EnvironmentFingerprint;
use crate::services::local_fingerprint;

#[axum::debug_handler]
pub async fn get_environment(State(config): State<Arc<AppConfig>>) -> Json<EnvironmentFingerprint> {
    let fingerprint = local_fingerprint(&config);
    debug!(environment_id = %fingerprint.environment_id, "Serving environment fingerprint");
    Json(fingerprint)
}
