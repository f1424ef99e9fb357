// =====================================================================================
// CATEGORY PROBES
// =====================================================================================

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tracing::debug;

use resilience_cell::CircuitBreaker;
use session_cell::SessionOutcomeCounters;
use shared_config::{Category, IntegrationTarget, MonitoringConfig};
use shared_database::StoreClient;

use crate::models::{
    CategoryMetrics, DatabaseHealth, DatabaseMetrics, IntegrationMetrics, ProviderHealth, ProviderStatus,
    SessionMetrics, SystemMetrics,
};
use crate::services::recorder::{FeatureCounters, RequestRecorder};

const DATABASE_DEGRADED_PING_MS: u64 = 1_000;
const PROVIDER_DEADLINE_SHARE: f64 = 0.8;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProbeError {
    #[error("probe source unavailable: {0}")]
    Unavailable(String),
    #[error("probe failed: {0}")]
    Failed(String),
}

/// Samples one category. Implementations must not hold locks shared with
/// other probes across awaits.
#[async_trait]
pub trait CategoryProbe: Send + Sync {
    fn category(&self) -> Category;

    async fn probe(&self) -> Result<CategoryMetrics, ProbeError>;

    /// Picks up a new configuration. Most probes have nothing to change.
    fn reconfigure(&self, _config: &MonitoringConfig) {}
}

// =====================================================================================
// SYSTEM
// =====================================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuSample {
    pub busy: u64,
    pub total: u64,
}

/// Host resource usage read from procfs and `df`.
#[derive(Debug, Default)]
pub struct SystemProbe {
    last_cpu: Mutex<Option<CpuSample>>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::default()
    }

    async fn disk_percent() -> Option<f64> {
        let output = tokio::process::Command::new("df")
            .arg("-P")
            .arg("/")
            .kill_on_drop(true)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_df_use_percent(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl CategoryProbe for SystemProbe {
    fn category(&self) -> Category {
        Category::System
    }

    async fn probe(&self) -> Result<CategoryMetrics, ProbeError> {
        let meminfo = tokio::fs::read_to_string("/proc/meminfo")
            .await
            .map_err(|e| ProbeError::Unavailable(format!("/proc/meminfo: {}", e)))?;
        let memory_percent = parse_meminfo_used_percent(&meminfo)
            .ok_or_else(|| ProbeError::Failed("unrecognised /proc/meminfo format".to_string()))?;

        let cpu_percent = match tokio::fs::read_to_string("/proc/stat").await {
            Ok(stat) => parse_cpu_sample(&stat).and_then(|sample| {
                let mut last = self.last_cpu.lock().unwrap_or_else(|p| p.into_inner());
                let previous = last.replace(sample);
                previous.and_then(|prev| cpu_percent_between(prev, sample))
            }),
            Err(_) => None,
        };

        let uptime_seconds = tokio::fs::read_to_string("/proc/uptime")
            .await
            .ok()
            .and_then(|raw| parse_uptime_seconds(&raw))
            .unwrap_or(0);

        Ok(CategoryMetrics::System(SystemMetrics {
            memory_percent,
            cpu_percent,
            disk_percent: Self::disk_percent().await,
            uptime_seconds,
        }))
    }
}

pub fn parse_meminfo_used_percent(raw: &str) -> Option<f64> {
    let field = |name: &str| {
        raw.lines()
            .find(|line| line.starts_with(name))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|value| value.parse::<f64>().ok())
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:").or_else(|| field("MemFree:"))?;
    if total <= 0.0 {
        return None;
    }
    Some(((total - available) / total * 100.0).clamp(0.0, 100.0))
}

pub fn parse_cpu_sample(raw: &str) -> Option<CpuSample> {
    let line = raw.lines().find(|line| line.starts_with("cpu "))?;
    let values: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse().ok())
        .collect();
    if values.len() < 4 {
        return None;
    }
    let total: u64 = values.iter().sum();
    let idle = values[3] + values.get(4).copied().unwrap_or(0);
    Some(CpuSample {
        busy: total.saturating_sub(idle),
        total,
    })
}

pub fn cpu_percent_between(previous: CpuSample, current: CpuSample) -> Option<f64> {
    let total = current.total.checked_sub(previous.total)?;
    let busy = current.busy.checked_sub(previous.busy)?;
    if total == 0 {
        return None;
    }
    Some((busy as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
}

pub fn parse_uptime_seconds(raw: &str) -> Option<u64> {
    raw.split_whitespace()
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .map(|secs| secs as u64)
}

pub fn parse_df_use_percent(raw: &str) -> Option<f64> {
    raw.lines()
        .nth(1)?
        .split_whitespace()
        .find(|column| column.ends_with('%'))
        .and_then(|column| column.trim_end_matches('%').parse().ok())
}

// =====================================================================================
// IN-PROCESS COUNTERS
// =====================================================================================

pub struct ApiProbe {
    recorder: Arc<RequestRecorder>,
}

impl ApiProbe {
    pub fn new(recorder: Arc<RequestRecorder>) -> Self {
        Self { recorder }
    }
}

#[async_trait]
impl CategoryProbe for ApiProbe {
    fn category(&self) -> Category {
        Category::Api
    }

    async fn probe(&self) -> Result<CategoryMetrics, ProbeError> {
        Ok(CategoryMetrics::Api(self.recorder.take_window().await))
    }
}

pub struct UiProbe {
    counters: Arc<FeatureCounters>,
}

impl UiProbe {
    pub fn new(counters: Arc<FeatureCounters>) -> Self {
        Self { counters }
    }
}

#[async_trait]
impl CategoryProbe for UiProbe {
    fn category(&self) -> Category {
        Category::Ui
    }

    async fn probe(&self) -> Result<CategoryMetrics, ProbeError> {
        Ok(CategoryMetrics::Ui(self.counters.take_ui_metrics()))
    }
}

pub struct ProgressiveProbe {
    counters: Arc<FeatureCounters>,
}

impl ProgressiveProbe {
    pub fn new(counters: Arc<FeatureCounters>) -> Self {
        Self { counters }
    }
}

#[async_trait]
impl CategoryProbe for ProgressiveProbe {
    fn category(&self) -> Category {
        Category::Progressive
    }

    async fn probe(&self) -> Result<CategoryMetrics, ProbeError> {
        Ok(CategoryMetrics::Progressive(self.counters.take_progressive_metrics()))
    }
}

/// Drains session validation outcomes and reads the session-store breaker.
pub struct SessionProbe {
    counters: Arc<SessionOutcomeCounters>,
    breaker: CircuitBreaker,
}

impl SessionProbe {
    pub fn new(counters: Arc<SessionOutcomeCounters>, breaker: CircuitBreaker) -> Self {
        Self { counters, breaker }
    }
}

#[async_trait]
impl CategoryProbe for SessionProbe {
    fn category(&self) -> Category {
        Category::Session
    }

    async fn probe(&self) -> Result<CategoryMetrics, ProbeError> {
        let window = self.counters.take_window();
        Ok(CategoryMetrics::Session(SessionMetrics {
            validations: window.validations(),
            successes: window.successes,
            invalid: window.invalid,
            store_errors: window.store_errors,
            breaker_rejections: window.breaker_rejections,
            refreshes: window.refreshes,
            refresh_failures: window.refresh_failures,
            failure_rate: window.failure_rate(),
            breaker_state: self.breaker.state(),
        }))
    }
}

// =====================================================================================
// EXTERNAL DEPENDENCIES
// =====================================================================================

/// Session store liveness plus the request accounting of its client.
pub struct DatabaseProbe {
    client: Arc<StoreClient>,
}

impl DatabaseProbe {
    pub fn new(client: Arc<StoreClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CategoryProbe for DatabaseProbe {
    fn category(&self) -> Category {
        Category::Database
    }

    async fn probe(&self) -> Result<CategoryMetrics, ProbeError> {
        if !self.client.is_configured() {
            return Err(ProbeError::Unavailable("session store is not configured".to_string()));
        }

        let ping = self.client.ping().await;
        let window = self.client.stats().take_window();

        let (status, ping_ms) = match &ping {
            Ok(latency) if latency.as_millis() as u64 > DATABASE_DEGRADED_PING_MS => {
                (DatabaseHealth::Degraded, latency.as_millis() as f64)
            }
            Ok(latency) => (DatabaseHealth::Healthy, latency.as_millis() as f64),
            Err(e) => {
                debug!("Database ping failed: {}", e);
                (DatabaseHealth::Unhealthy, 0.0)
            }
        };

        Ok(CategoryMetrics::Database(DatabaseMetrics {
            status,
            active_connections: window.in_flight,
            average_query_time_ms: if window.average_latency_ms > 0.0 {
                window.average_latency_ms
            } else {
                ping_ms
            },
            transactions_succeeded: window.succeeded,
            transactions_failed: window.failed,
        }))
    }
}

/// Concurrent GET per configured external provider.
pub struct IntegrationProbe {
    client: reqwest::Client,
    settings: RwLock<IntegrationSettings>,
}

#[derive(Debug, Clone)]
struct IntegrationSettings {
    targets: Vec<IntegrationTarget>,
    provider_deadline: Duration,
}

/// Each provider must answer before the collector's own probe deadline so
/// the providers that did respond are still reported.
pub fn provider_deadline(probe_timeout: Duration) -> Duration {
    probe_timeout.mul_f64(PROVIDER_DEADLINE_SHARE)
}

impl IntegrationProbe {
    pub fn new(targets: Vec<IntegrationTarget>, probe_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings: RwLock::new(IntegrationSettings {
                targets,
                provider_deadline: provider_deadline(probe_timeout),
            }),
        }
    }

    pub fn targets(&self) -> Vec<IntegrationTarget> {
        self.settings.read().unwrap_or_else(|p| p.into_inner()).targets.clone()
    }

    async fn check(&self, target: &IntegrationTarget, deadline: Duration) -> ProviderStatus {
        let started = Instant::now();
        let result = tokio::time::timeout(deadline, self.client.get(&target.url).timeout(deadline).send()).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(response)) if response.status().is_success() => ProviderStatus {
                name: target.name.clone(),
                status: if latency_ms > target.degraded_latency_ms {
                    ProviderHealth::Degraded
                } else {
                    ProviderHealth::Up
                },
                latency_ms: Some(latency_ms),
                error: None,
            },
            Ok(Ok(response)) => ProviderStatus {
                name: target.name.clone(),
                status: ProviderHealth::Down,
                latency_ms: Some(latency_ms),
                error: Some(format!("HTTP {}", response.status())),
            },
            Ok(Err(e)) => ProviderStatus {
                name: target.name.clone(),
                status: ProviderHealth::Down,
                latency_ms: None,
                error: Some(e.to_string()),
            },
            Err(_) => ProviderStatus {
                name: target.name.clone(),
                status: ProviderHealth::Down,
                latency_ms: None,
                error: Some(format!("no answer within {} ms", deadline.as_millis())),
            },
        }
    }
}

#[async_trait]
impl CategoryProbe for IntegrationProbe {
    fn category(&self) -> Category {
        Category::Integration
    }

    async fn probe(&self) -> Result<CategoryMetrics, ProbeError> {
        let settings = self.settings.read().unwrap_or_else(|p| p.into_inner()).clone();
        let providers = join_all(
            settings
                .targets
                .iter()
                .map(|target| self.check(target, settings.provider_deadline)),
        )
        .await;
        Ok(CategoryMetrics::Integration(IntegrationMetrics { providers }))
    }

    fn reconfigure(&self, config: &MonitoringConfig) {
        let mut settings = self.settings.write().unwrap_or_else(|p| p.into_inner());
        settings.targets = config.integrations.clone();
        settings.provider_deadline = provider_deadline(config.probe_timeout());
    }
}

// =====================================================================================
// STATIC
// =====================================================================================

/// Returns scripted responses, then repeats the fallback. Optionally sleeps
/// before answering.
pub struct StaticProbe {
    category: Category,
    script: Mutex<VecDeque<Result<CategoryMetrics, ProbeError>>>,
    fallback: Mutex<Result<CategoryMetrics, ProbeError>>,
    delay: Mutex<Option<Duration>>,
}

impl StaticProbe {
    pub fn new(metrics: CategoryMetrics) -> Self {
        Self {
            category: metrics.category(),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(metrics)),
            delay: Mutex::new(None),
        }
    }

    pub fn failing(category: Category, reason: &str) -> Self {
        Self {
            category,
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Err(ProbeError::Failed(reason.to_string()))),
            delay: Mutex::new(None),
        }
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(Some(delay));
        self
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|p| p.into_inner()) = delay;
    }

    /// Replaces the value returned once the script is exhausted.
    pub fn set(&self, response: Result<CategoryMetrics, ProbeError>) {
        *self.fallback.lock().unwrap_or_else(|p| p.into_inner()) = response;
    }

    pub fn push(&self, response: Result<CategoryMetrics, ProbeError>) {
        self.script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(response);
    }
}

#[async_trait]
impl CategoryProbe for StaticProbe {
    fn category(&self) -> Category {
        self.category
    }

    async fn probe(&self) -> Result<CategoryMetrics, ProbeError> {
        let delay = *self.delay.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        match scripted {
            Some(response) => response,
            None => self.fallback.lock().unwrap_or_else(|p| p.into_inner()).clone(),
        }
    }
}
