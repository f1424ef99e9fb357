use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;
use shared_models::SessionRecord;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session store is not configured")]
    NotConfigured,

    #[error("Authentication error: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Request accounting shared by every call made through a [`StoreClient`].
#[derive(Debug, Default)]
pub struct StoreStats {
    in_flight: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    latency_total_ms: AtomicU64,
    calls: AtomicU64,
}

/// Store activity since the previous [`StoreStats::take_window`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreWindow {
    pub in_flight: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub average_latency_ms: f64,
}

impl StoreStats {
    pub fn take_window(&self) -> StoreWindow {
        let calls = self.calls.swap(0, Ordering::SeqCst);
        let latency = self.latency_total_ms.swap(0, Ordering::SeqCst);
        StoreWindow {
            in_flight: self.in_flight.load(Ordering::SeqCst),
            succeeded: self.succeeded.swap(0, Ordering::SeqCst),
            failed: self.failed.swap(0, Ordering::SeqCst),
            average_latency_ms: if calls > 0 { latency as f64 / calls as f64 } else { 0.0 },
        }
    }

    fn begin(&self) -> InFlight<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight {
            stats: self,
            started: Instant::now(),
        }
    }
}

struct InFlight<'a> {
    stats: &'a StoreStats,
    started: Instant,
}

impl InFlight<'_> {
    fn finish(self, ok: bool) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        self.stats.latency_total_ms.fetch_add(elapsed, Ordering::SeqCst);
        if ok {
            self.stats.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.stats.failed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    session: SessionRecord,
}

/// REST client for the external session store.
pub struct StoreClient {
    client: Client,
    base_url: String,
    api_key: String,
    stats: Arc<StoreStats>,
}

impl StoreClient {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_base_url(&config.session_store_url, &config.session_store_api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            stats: Arc::new(StoreStats::default()),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> Arc<StoreStats> {
        self.stats.clone()
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.api_key).map_err(|e| StoreError::InvalidHeader(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| StoreError::InvalidHeader(e.to_string()))?,
            );
        }

        Ok(headers)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        if !self.is_configured() {
            return Err(StoreError::NotConfigured);
        }

        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let headers = self.get_headers(auth_token)?;
        let mut req = self.client.request(method, &url).headers(headers);
        if let Some(body_data) = body {
            req = req.json(body_data);
        }

        let guard = self.stats.begin();
        let outcome = Self::send(req).await;
        // 401/404 are answers, not store failures
        let healthy = match &outcome {
            Ok(_) => true,
            Err(StoreError::Unauthorized(_)) | Err(StoreError::NotFound(_)) => true,
            Err(_) => false,
        };
        guard.finish(healthy);
        outcome
    }

    async fn send<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> Result<T, StoreError> {
        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized(error_text),
                StatusCode::NOT_FOUND => StoreError::NotFound(error_text),
                _ => {
                    error!("Session store error ({}): {}", status, error_text);
                    StoreError::Api {
                        status: status.as_u16(),
                        body: error_text,
                    }
                }
            });
        }

        Ok(response.json::<T>().await?)
    }

    /// Looks up the session behind `token`. `Ok(None)` means the store
    /// answered and does not recognise the token.
    pub async fn fetch_session(&self, token: &str) -> Result<Option<SessionRecord>, StoreError> {
        // A token that cannot be sent is unknown to the store by definition
        if HeaderValue::from_str(&format!("Bearer {}", token)).is_err() {
            return Ok(None);
        }

        match self
            .request::<SessionEnvelope>(Method::GET, "/auth/v1/session", Some(token), None)
            .await
        {
            Ok(envelope) => Ok(Some(envelope.session)),
            Err(StoreError::Unauthorized(_)) | Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn refresh_session(&self, token: &str) -> Result<SessionRecord, StoreError> {
        let envelope: SessionEnvelope = self
            .request(Method::POST, "/auth/v1/session/refresh", Some(token), None)
            .await?;
        Ok(envelope.session)
    }

    /// Liveness round trip; returns the observed latency.
    pub async fn ping(&self) -> Result<Duration, StoreError> {
        let started = Instant::now();
        self.request::<Value>(Method::GET, "/rest/v1/health", None, None).await?;
        Ok(started.elapsed())
    }
}
