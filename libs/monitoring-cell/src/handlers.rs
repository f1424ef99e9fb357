// =====================================================================================
// MONITORING CELL HANDLERS
// =====================================================================================

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{error, instrument};

use resilience_cell::CircuitBreakerSnapshot;
use shared_config::{ConfigError, MonitoringConfig};

use crate::models::{
    Alert, AlertChange, AlertListQuery, DashboardSnapshot, EventQuery, ExportBundle, HistoryQuery, IngestRequest,
    MetricSnapshot, MonitoringError, MonitoringEvent, MonitoringStatus, ResolveOutcome, SetConfigValueRequest,
    StartOutcome, TestAlertRequest, TickReport, TrendReport,
};
use crate::services::MonitoringCore;

type CoreState = State<Arc<MonitoringCore>>;

// =====================================================================================
// STATUS & SCHEDULER
// =====================================================================================

pub async fn get_status(State(core): CoreState) -> Json<MonitoringStatus> {
    Json(core.status().await)
}

#[instrument(skip(core, body))]
pub async fn start_scheduler(
    State(core): CoreState,
    body: Option<Json<Value>>,
) -> Result<Json<StartOutcome>, MonitoringError> {
    let config = parse_optional_config(body)?;
    Ok(Json(core.start_monitoring(config).await?))
}

#[instrument(skip(core))]
pub async fn stop_scheduler(State(core): CoreState) -> Json<Value> {
    let session = core.stop_monitoring().await;
    Json(json!({
        "stopped": session.is_some(),
        "session": session,
    }))
}

#[instrument(skip(core, body))]
pub async fn restart_scheduler(
    State(core): CoreState,
    body: Option<Json<Value>>,
) -> Result<Json<StartOutcome>, MonitoringError> {
    let config = parse_optional_config(body)?;
    Ok(Json(core.restart_monitoring(config).await?))
}

pub async fn get_dashboard(State(core): CoreState) -> Json<DashboardSnapshot> {
    Json(core.dashboard().await)
}

#[instrument(skip(core))]
pub async fn trigger_health_check(State(core): CoreState) -> Json<TickReport> {
    Json(core.trigger_health_check().await)
}

// =====================================================================================
// ALERTS
// =====================================================================================

pub async fn list_alerts(State(core): CoreState, Query(query): Query<AlertListQuery>) -> Json<Vec<Alert>> {
    Json(core.alerts(query.include_resolved.unwrap_or(false)).await)
}

#[instrument(skip(core))]
pub async fn resolve_alert(
    State(core): CoreState,
    Path(alert_id): Path<String>,
) -> Result<Json<ResolveOutcome>, MonitoringError> {
    match core.resolve_alert(&alert_id).await {
        ResolveOutcome::NotFound => Err(MonitoringError::AlertNotFound(alert_id)),
        outcome => Ok(Json(outcome)),
    }
}

#[instrument(skip(core, body))]
pub async fn send_test_alert(
    State(core): CoreState,
    body: Option<Json<TestAlertRequest>>,
) -> Json<Vec<AlertChange>> {
    let request = body.map(|Json(request)| request).unwrap_or(TestAlertRequest {
        severity: None,
        category: None,
        message: None,
    });
    Json(core.test_alert(request).await)
}

// =====================================================================================
// METRICS
// =====================================================================================

pub async fn get_metrics(State(core): CoreState) -> Json<Value> {
    let snapshot = core.latest_snapshot().await;
    let score = core.latest_score().await;
    Json(json!({
        "snapshot": snapshot,
        "health_score": score,
        "requests": core.recorder().totals(),
    }))
}

pub async fn get_metrics_history(
    State(core): CoreState,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<Arc<MetricSnapshot>>> {
    Json(core.snapshot_history(query.limit).await)
}

pub async fn get_trends(State(core): CoreState, Query(query): Query<HistoryQuery>) -> Json<TrendReport> {
    Json(core.trends(query.limit).await)
}

// =====================================================================================
// CONFIGURATION & EXPORT
// =====================================================================================

pub async fn get_config(State(core): CoreState) -> Json<MonitoringConfig> {
    Json(core.config().await.redacted())
}

#[instrument(skip(core, body))]
pub async fn replace_config(
    State(core): CoreState,
    Json(body): Json<Value>,
) -> Result<Json<MonitoringConfig>, MonitoringError> {
    let config = MonitoringConfig::from_value(body)?;
    Ok(Json(core.update_config(config).await?))
}

#[instrument(skip(core))]
pub async fn set_config_value(
    State(core): CoreState,
    Json(request): Json<SetConfigValueRequest>,
) -> Result<Json<MonitoringConfig>, MonitoringError> {
    Ok(Json(core.set_config_value(&request.key, &request.value).await?))
}

pub async fn export_state(State(core): CoreState) -> Json<ExportBundle> {
    Json(core.export().await)
}

pub async fn get_circuits(State(core): CoreState) -> Json<Vec<CircuitBreakerSnapshot>> {
    Json(core.circuits().await)
}

pub async fn get_events(State(core): CoreState, Query(query): Query<EventQuery>) -> Json<Vec<MonitoringEvent>> {
    Json(core.events(&query).await)
}

// =====================================================================================
// INGESTION
// =====================================================================================

pub async fn ingest_ui_events(State(core): CoreState, Json(request): Json<IngestRequest>) -> impl IntoResponse {
    let counters = core.ui_counters();
    let accepted = request.events.len();
    for event in request.events {
        counters.record(event);
    }
    (StatusCode::ACCEPTED, Json(json!({ "accepted": accepted })))
}

pub async fn ingest_progressive_events(
    State(core): CoreState,
    Json(request): Json<IngestRequest>,
) -> impl IntoResponse {
    let counters = core.progressive_counters();
    let accepted = request.events.len();
    for event in request.events {
        counters.record(event);
    }
    (StatusCode::ACCEPTED, Json(json!({ "accepted": accepted })))
}

// =====================================================================================
// MIDDLEWARE
// =====================================================================================

/// Feeds every operator API request into the API category.
pub async fn record_request(State(core): CoreState, request: Request<Body>, next: Next) -> Response {
    let endpoint = format!(
        "{} {}",
        request.method(),
        request
            .extensions()
            .get::<MatchedPath>()
            .map(|path| path.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string())
    );
    let started = Instant::now();
    let response = next.run(request).await;

    core.recorder()
        .record_request(
            &endpoint,
            started.elapsed().as_millis() as u64,
            response.status().is_server_error(),
        )
        .await;
    response
}

fn parse_optional_config(body: Option<Json<Value>>) -> Result<Option<MonitoringConfig>, ConfigError> {
    match body {
        Some(Json(Value::Null)) | None => Ok(None),
        Some(Json(value)) => MonitoringConfig::from_value(value).map(Some),
    }
}

// =====================================================================================
// ERROR HANDLING
// =====================================================================================

impl IntoResponse for MonitoringError {
    fn into_response(self) -> Response {
        let status = match &self {
            MonitoringError::Config(_) => StatusCode::BAD_REQUEST,
            MonitoringError::AlertNotFound(_) => StatusCode::NOT_FOUND,
            MonitoringError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            MonitoringError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Monitoring request failed: {}", self);
        }

        (status, Json(json!({
            "error": self.to_string(),
            "timestamp": chrono::Utc::now()
        }))).into_response()
    }
}
