use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::{self, TraceLayer};
use tracing::Level;

use environment_cell::create_environment_router;
use monitoring_cell::{create_monitoring_router, MonitoringCore};
use session_cell::create_session_router;
use shared_config::AppConfig;
use shared_utils::OperatorAuth;

/// Full operator API: monitoring routes, `/environment`, and
/// `/sessions/validate` when the core carries a session validator.
pub fn create_router(core: Arc<MonitoringCore>, config: Arc<AppConfig>, auth: Arc<OperatorAuth>) -> Router {
    let mut router = Router::new()
        .route("/", get(|| async { "Clarity monitor is running!" }))
        .merge(create_monitoring_router(core.clone(), auth))
        .merge(create_environment_router(config));

    if let Some(validator) = core.session_validator() {
        router = router.merge(create_session_router(validator));
    }

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
            .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
    )
}
