use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use monitoring_cell::models::{ApiMetrics, CategoryMetrics};
use monitoring_cell::{create_monitoring_router, MonitoringCore, StaticProbe};
use shared_config::{AlertsConfig, CategoryIntervals, MonitoringConfig};
use shared_utils::test_utils::OperatorTokens;
use shared_utils::OperatorAuth;

const SECRET: &str = "test_operator_secret";

fn core() -> Arc<MonitoringCore> {
    let config = MonitoringConfig {
        environment_id: "router-test".to_string(),
        intervals: CategoryIntervals::uniform(60_000),
        ..MonitoringConfig::default()
    };
    MonitoringCore::builder(config)
        .with_local_probes()
        .with_probe(Arc::new(StaticProbe::new(CategoryMetrics::Api(ApiMetrics::default()))))
        .build()
        .unwrap()
}

fn open_app(core: Arc<MonitoringCore>) -> Router {
    create_monitoring_router(core, Arc::new(OperatorAuth::disabled()))
}

fn secured_app(core: Arc<MonitoringCore>) -> Router {
    create_monitoring_router(core, Arc::new(OperatorAuth::new(Some(SECRET.to_string()))))
}

fn request(method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn status_reports_environment() {
    let response = open_app(core()).oneshot(request("GET", "/status", None, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["environment_id"], "router-test");
    assert_eq!(json["scheduler"]["running"], false);
}

#[tokio::test]
async fn resolving_unknown_alert_is_not_found() {
    let response = open_app(core())
        .oneshot(request("POST", "/alerts/missing-id/resolve", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("missing-id"));
}

#[tokio::test]
async fn mutating_routes_require_operator_token() {
    let core = core();
    let app = secured_app(core.clone());

    let anonymous = app
        .clone()
        .oneshot(request("POST", "/scheduler/start", None, None))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let viewer = OperatorTokens::create("viewer", "viewer", SECRET, 1);
    let forbidden = app
        .clone()
        .oneshot(request("POST", "/scheduler/start", None, Some(&viewer)))
        .await
        .unwrap();
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let token = OperatorTokens::operator(SECRET);
    let started = app
        .clone()
        .oneshot(request("POST", "/scheduler/start", None, Some(&token)))
        .await
        .unwrap();
    assert_eq!(started.status(), StatusCode::OK);
    assert_eq!(json_body(started).await["outcome"], "started");

    let read_only = app.oneshot(request("GET", "/config", None, None)).await.unwrap();
    assert_eq!(read_only.status(), StatusCode::OK);

    core.stop_monitoring().await;
}

#[tokio::test]
async fn webhook_url_stays_behind_operator_auth() {
    let config = MonitoringConfig {
        environment_id: "router-test".to_string(),
        alerts: AlertsConfig {
            webhook_url: Some("https://hooks.example.com/services/T000/SECRET".to_string()),
            ..AlertsConfig::default()
        },
        ..MonitoringConfig::default()
    };
    let app = secured_app(MonitoringCore::builder(config).build().unwrap());

    let public = app.clone().oneshot(request("GET", "/config", None, None)).await.unwrap();
    assert_eq!(public.status(), StatusCode::OK);
    let public = json_body(public).await;
    assert_eq!(public["alerts"]["webhook_url"], "[redacted]");
    assert!(!public.to_string().contains("SECRET"));

    let anonymous = app.clone().oneshot(request("GET", "/export", None, None)).await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let token = OperatorTokens::operator(SECRET);
    let export = app.oneshot(request("GET", "/export", None, Some(&token))).await.unwrap();
    assert_eq!(export.status(), StatusCode::OK);
    assert_eq!(
        json_body(export).await["config"]["alerts"]["webhook_url"],
        "https://hooks.example.com/services/T000/SECRET"
    );
}

#[tokio::test]
async fn config_errors_name_the_field() {
    let app = open_app(core());

    let response = app
        .clone()
        .oneshot(request("PUT", "/config", Some(json!({ "intervals": { "api": 0 } })), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].as_str().unwrap().contains("intervals.api"));

    let response = app
        .clone()
        .oneshot(request(
            "PATCH",
            "/config",
            Some(json!({ "key": "intervals.cache", "value": "100" })),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(request(
            "PATCH",
            "/config",
            Some(json!({ "key": "intervals.api", "value": "2500" })),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["intervals"]["api"], 2500);
}

#[tokio::test]
async fn ingested_ui_events_appear_in_next_check() {
    let core = core();
    let app = open_app(core.clone());

    let events = json!({ "events": [
        { "duration_ms": 120 },
        { "duration_ms": 80, "failed": true }
    ]});
    let response = app
        .clone()
        .oneshot(request("POST", "/ingest/ui", Some(events), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .oneshot(request("POST", "/health/check", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let report = json_body(response).await;
    let ui = &report["snapshot"]["categories"]["ui"]["metrics"];
    assert_eq!(ui["page_views"], 2);
    assert_eq!(ui["client_error_rate"], 50.0);
}

#[tokio::test]
async fn operator_requests_are_recorded() {
    let core = core();
    let app = open_app(core.clone());

    app.clone().oneshot(request("GET", "/dashboard", None, None)).await.unwrap();
    app.oneshot(request("GET", "/circuits", None, None)).await.unwrap();

    assert_eq!(core.recorder().totals().requests, 2);
}
