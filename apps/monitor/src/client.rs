// =====================================================================================
// OPERATOR API CLIENT
// =====================================================================================

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use monitoring_cell::models::{AlertChange, MonitoringStatus};
use monitoring_cell::{Alert, HealthScore, MetricSnapshot};
use resilience_cell::CircuitBreakerSnapshot;
use shared_config::Category;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_millis(750);

/// `GET /dashboard` as the CLI reads it.
#[derive(Debug, Deserialize)]
pub struct DashboardView {
    pub status: MonitoringStatus,
    pub system_overview: OverviewView,
    pub active_alerts: Vec<Alert>,
    pub health_score: Option<HealthScore>,
    #[serde(default)]
    pub circuits: Vec<CircuitBreakerSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct OverviewView {
    pub environment_id: String,
    pub snapshots_retained: usize,
    pub degraded_categories: Vec<Category>,
}

/// `GET /metrics`.
#[derive(Debug, Deserialize)]
pub struct MetricsView {
    pub snapshot: Option<MetricSnapshot>,
    pub health_score: Option<HealthScore>,
    pub requests: Value,
}

/// `POST /health/check`.
#[derive(Debug, Deserialize)]
pub struct HealthCheckView {
    pub snapshot: MetricSnapshot,
    pub score: HealthScore,
    pub changes: Vec<AlertChange>,
}

#[derive(Debug, Deserialize)]
pub struct StopView {
    pub stopped: bool,
}

pub struct OperatorClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl OperatorClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// True when a monitor already answers `GET /status` at the base URL.
    pub async fn is_reachable(&self) -> bool {
        self.http
            .get(format!("{}/status", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.request(Method::GET, path)).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Option<&Value>) -> Result<T> {
        let mut builder = self.request(Method::POST, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.send(builder).await
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        self.send(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn patch<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        self.send(self.request(Method::PATCH, path).json(body)).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("Monitor API at {} is unreachable (is `clarity-monitor start` running?)", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            return Err(anyhow!("{} ({})", message, status.as_u16()));
        }

        response.json::<T>().await.context("Unexpected response from monitor API")
    }
}
