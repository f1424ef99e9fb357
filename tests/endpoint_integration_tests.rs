/// End-to-end operator API suite.
///
/// Each test serves the composite router on an ephemeral port and drives it
/// over HTTP the way the `clarity-monitor` CLI does:
/// - Scheduler lifecycle and operator authentication
/// - Health checks, alert deduplication and resolution
/// - Session store outage tripping the breaker
/// - Configuration updates and export
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clarity_monitor::create_router;
use monitoring_cell::models::{ApiMetrics, CategoryMetrics};
use monitoring_cell::{MonitoringCore, StaticProbe};
use shared_config::{
    AlertComparison, AlertRule, AlertSeverity, AlertsConfig, AppConfig, Category, CategoryIntervals,
    CircuitBreakerSettings, MetricKey, MonitoringConfig,
};
use shared_utils::test_utils::OperatorTokens;
use shared_utils::OperatorAuth;

const OPERATOR_SECRET: &str = "endpoint_test_secret";

/// Test client with operator authentication
pub struct ApiTestClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl ApiTestClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            auth_token: None,
        }
    }

    pub fn authenticate(&mut self) {
        self.auth_token = Some(OperatorTokens::operator(OPERATOR_SECRET));
    }

    pub async fn get(&self, endpoint: &str) -> Response {
        let mut request = self.client.get(format!("{}{}", self.base_url, endpoint));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        request.send().await.unwrap()
    }

    pub async fn send(&self, method: reqwest::Method, endpoint: &str, body: Option<Value>) -> Response {
        let mut request = self.client.request(method, format!("{}{}", self.base_url, endpoint));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        request.send().await.unwrap()
    }

    pub async fn post(&self, endpoint: &str, body: Option<Value>) -> Response {
        self.send(reqwest::Method::POST, endpoint, body).await
    }
}

async fn json_of(response: Response) -> Value {
    response.json().await.unwrap()
}

async fn serve(core: Arc<MonitoringCore>, app: AppConfig) -> ApiTestClient {
    let auth = Arc::new(OperatorAuth::new(Some(OPERATOR_SECRET.to_string())));
    let router = create_router(core, Arc::new(app), auth);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    ApiTestClient::new(format!("http://{}", addr))
}

fn breaching_config() -> MonitoringConfig {
    MonitoringConfig {
        environment_id: "e2e".to_string(),
        intervals: CategoryIntervals::uniform(60_000),
        alerts: AlertsConfig {
            rules: vec![AlertRule::new(
                "api.error_rate_high",
                Category::Api,
                MetricKey::ApiErrorRate,
                AlertComparison::GreaterThan,
                5.0,
                AlertSeverity::Error,
                "High Error Rate",
            )],
            ..AlertsConfig::default()
        },
        ..MonitoringConfig::default()
    }
}

fn breaching_core() -> Arc<MonitoringCore> {
    let api = CategoryMetrics::Api(ApiMetrics {
        total_requests: 200,
        error_rate: 12.0,
        ..ApiMetrics::default()
    });
    MonitoringCore::builder(breaching_config())
        .with_probe(Arc::new(StaticProbe::new(api)))
        .build()
        .unwrap()
}

#[tokio::test]
async fn scheduler_lifecycle_requires_operator() {
    let mut client = serve(breaching_core(), AppConfig::default()).await;

    let anonymous = client.post("/scheduler/start", None).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    client.authenticate();
    let started = json_of(client.post("/scheduler/start", None).await).await;
    assert_eq!(started["outcome"], "started");

    let again = json_of(client.post("/scheduler/start", None).await).await;
    assert_eq!(again["outcome"], "already_running");
    assert_eq!(again["session"]["id"], started["session"]["id"]);

    let status = json_of(client.get("/status").await).await;
    assert_eq!(status["scheduler"]["running"], true);

    let stopped = json_of(client.post("/scheduler/stop", None).await).await;
    assert_eq!(stopped["stopped"], true);

    let status = json_of(client.get("/status").await).await;
    assert_eq!(status["scheduler"]["running"], false);
}

#[tokio::test]
async fn breach_raises_one_alert_that_resolves_once() {
    let mut client = serve(breaching_core(), AppConfig::default()).await;
    client.authenticate();

    for _ in 0..3 {
        let response = client.post("/health/check", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let active = json_of(client.get("/alerts").await).await;
    let active = active.as_array().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["occurrences"], 3);
    let id = active[0]["id"].as_str().unwrap().to_string();

    let resolved = json_of(client.post(&format!("/alerts/{}/resolve", id), None).await).await;
    assert_eq!(resolved["outcome"], "resolved");

    let repeated = json_of(client.post(&format!("/alerts/{}/resolve", id), None).await).await;
    assert_eq!(repeated["outcome"], "already_resolved");

    let unknown = client
        .post(&format!("/alerts/{}/resolve", Uuid::new_v4()), None)
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    // Still breaching, so the next check opens a fresh alert.
    let report = json_of(client.post("/health/check", None).await).await;
    assert_eq!(report["changes"][0]["change"], "created");
    assert_ne!(report["changes"][0]["alert"]["id"], id.as_str());

    let dashboard = json_of(client.get("/dashboard").await).await;
    assert_eq!(dashboard["active_alerts"].as_array().unwrap().len(), 1);
    assert!(dashboard["health_score"]["overall"].as_f64().unwrap() < 100.0);
}

#[tokio::test]
async fn session_store_outage_trips_breaker() {
    let store = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/session"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&store)
        .await;

    let app = AppConfig {
        environment_id: "e2e".to_string(),
        session_store_url: store.uri(),
        session_store_api_key: "anon-key".to_string(),
        ..AppConfig::default()
    };
    let config = MonitoringConfig {
        environment_id: "e2e".to_string(),
        intervals: CategoryIntervals::uniform(60_000),
        circuit_breaker: CircuitBreakerSettings {
            failure_threshold: 3,
            base_backoff_ms: 60_000,
            max_backoff_ms: 60_000,
            call_timeout_ms: 0,
        },
        ..MonitoringConfig::default()
    };
    let core = MonitoringCore::from_app_config(&app, config).await.unwrap();
    let client = serve(core, app).await;

    for _ in 0..3 {
        let response = client.post("/sessions/validate", Some(json!({ "token": "abc" }))).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    let rejected = client.post("/sessions/validate", Some(json!({ "token": "abc" }))).await;
    assert_eq!(rejected.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(rejected.headers().contains_key("retry-after"));
    assert_eq!(json_of(rejected).await["retryable"], true);

    let circuits = json_of(client.get("/circuits").await).await;
    assert_eq!(circuits[0]["name"], "session-store");
    assert_eq!(circuits[0]["state"], "open");
    assert_eq!(circuits[0]["rejected_calls"], 1);

    // Dropping the mock server verifies the store saw exactly three lookups.
    drop(store);
}

#[tokio::test]
async fn config_changes_are_validated_and_exported() {
    let mut client = serve(breaching_core(), AppConfig::default()).await;
    client.authenticate();

    let rejected = client
        .send(
            reqwest::Method::PATCH,
            "/config",
            Some(json!({ "key": "scoring.weights.api", "value": "-1" })),
        )
        .await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let accepted = client
        .send(
            reqwest::Method::PATCH,
            "/config",
            Some(json!({ "key": "snapshot_capacity", "value": "3" })),
        )
        .await;
    assert_eq!(accepted.status(), StatusCode::OK);

    for _ in 0..5 {
        client.post("/health/check", None).await;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    let export = json_of(client.get("/export").await).await;
    assert_eq!(export["config"]["snapshot_capacity"], 3);
    assert_eq!(export["snapshots"].as_array().unwrap().len(), 3);
    assert_eq!(export["alerts"].as_array().unwrap().len(), 1);

    let events = json_of(client.get("/events").await).await;
    assert!(events
        .as_array()
        .unwrap()
        .iter()
        .any(|event| event["kind"] == "config_updated"));
}

#[tokio::test]
async fn environment_fingerprint_is_served() {
    let app = AppConfig {
        environment_id: "e2e-env".to_string(),
        git_commit: Some("deadbeef".to_string()),
        ..AppConfig::default()
    };
    let client = serve(breaching_core(), app).await;

    let fingerprint = json_of(client.get("/environment").await).await;
    assert_eq!(fingerprint["environment_id"], "e2e-env");
    assert_eq!(fingerprint["git_commit"], "deadbeef");
    assert_eq!(fingerprint["operator_auth_enabled"], false);
}
