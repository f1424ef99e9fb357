// =====================================================================================
// MONITORING CELL ROUTER
// =====================================================================================

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers::{
    export_state, get_circuits, get_config, get_dashboard, get_events, get_metrics, get_metrics_history,
    get_status, get_trends, ingest_progressive_events, ingest_ui_events, list_alerts, record_request,
    replace_config, resolve_alert, restart_scheduler, send_test_alert, set_config_value, start_scheduler,
    stop_scheduler, trigger_health_check,
};
use crate::services::MonitoringCore;
use shared_utils::{operator_auth_middleware, OperatorAuth};

pub fn create_monitoring_router(core: Arc<MonitoringCore>, auth: Arc<OperatorAuth>) -> Router {
    let operator_only = middleware::from_fn_with_state(auth, operator_auth_middleware);

    // Read-only and ingestion routes
    let public_routes = Router::new()
        .route("/status", get(get_status))
        .route("/dashboard", get(get_dashboard))
        .route("/alerts", get(list_alerts))
        .route("/metrics", get(get_metrics))
        .route("/metrics/history", get(get_metrics_history))
        .route("/metrics/trends", get(get_trends))
        .route("/circuits", get(get_circuits))
        .route("/events", get(get_events))
        .route("/ingest/ui", post(ingest_ui_events))
        .route("/ingest/progressive", post(ingest_progressive_events))
        .route(
            "/config",
            get(get_config).merge(
                put(replace_config)
                    .patch(set_config_value)
                    .route_layer(operator_only.clone()),
            ),
        );

    // Mutating operator routes, plus the full export
    let operator_routes = Router::new()
        .route("/scheduler/start", post(start_scheduler))
        .route("/scheduler/stop", post(stop_scheduler))
        .route("/scheduler/restart", post(restart_scheduler))
        .route("/alerts/{id}/resolve", post(resolve_alert))
        .route("/alerts/test", post(send_test_alert))
        .route("/health/check", post(trigger_health_check))
        .route("/export", get(export_state))
        .route_layer(operator_only);

    Router::new()
        .merge(public_routes)
        .merge(operator_routes)
        .layer(middleware::from_fn_with_state(core.clone(), record_request))
        .layer(CorsLayer::permissive())
        .with_state(core)
}
