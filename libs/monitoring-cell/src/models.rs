// =====================================================================================
// MONITORING MODELS
// =====================================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use resilience_cell::{CircuitBreakerSnapshot, CircuitState};
use shared_config::{AlertSeverity, Category, ConfigError, MonitoringConfig};

// =====================================================================================
// CATEGORY METRICS
// =====================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub memory_percent: f64,
    /// `None` until two CPU samples exist.
    pub cpu_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Percentage of failed requests, 0-100.
    pub error_rate: f64,
    pub average_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub slowest_endpoint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl DatabaseHealth {
    pub fn as_metric(&self) -> f64 {
        match self {
            DatabaseHealth::Healthy => 0.0,
            DatabaseHealth::Degraded => 1.0,
            DatabaseHealth::Unhealthy => 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseMetrics {
    pub status: DatabaseHealth,
    pub active_connections: u64,
    pub average_query_time_ms: f64,
    pub transactions_succeeded: u64,
    pub transactions_failed: u64,
}

impl DatabaseMetrics {
    pub fn transaction_failure_rate(&self) -> f64 {
        let total = self.transactions_succeeded + self.transactions_failed;
        if total == 0 {
            0.0
        } else {
            self.transactions_failed as f64 / total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderHealth {
    Up,
    Degraded,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub name: String,
    pub status: ProviderHealth,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationMetrics {
    pub providers: Vec<ProviderStatus>,
}

impl IntegrationMetrics {
    pub fn down_count(&self) -> usize {
        self.providers
            .iter()
            .filter(|p| p.status == ProviderHealth::Down)
            .count()
    }

    pub fn max_latency_ms(&self) -> Option<u64> {
        self.providers.iter().filter_map(|p| p.latency_ms).max()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiMetrics {
    pub page_views: u64,
    pub client_errors: u64,
    pub client_error_rate: f64,
    pub average_render_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub validations: u64,
    pub successes: u64,
    pub invalid: u64,
    pub store_errors: u64,
    pub breaker_rejections: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
    pub failure_rate: f64,
    pub breaker_state: CircuitState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressiveMetrics {
    pub feature_loads: u64,
    pub load_failures: u64,
    pub failure_rate: f64,
    pub average_load_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum CategoryMetrics {
    System(SystemMetrics),
    Api(ApiMetrics),
    Database(DatabaseMetrics),
    Integration(IntegrationMetrics),
    Ui(UiMetrics),
    Session(SessionMetrics),
    Progressive(ProgressiveMetrics),
}

impl CategoryMetrics {
    pub fn category(&self) -> Category {
        match self {
            CategoryMetrics::System(_) => Category::System,
            CategoryMetrics::Api(_) => Category::Api,
            CategoryMetrics::Database(_) => Category::Database,
            CategoryMetrics::Integration(_) => Category::Integration,
            CategoryMetrics::Ui(_) => Category::Ui,
            CategoryMetrics::Session(_) => Category::Session,
            CategoryMetrics::Progressive(_) => Category::Progressive,
        }
    }
}

// =====================================================================================
// SNAPSHOTS
// =====================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Ok,
    TimedOut,
    Failed,
    /// No probe is registered for the category.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryReading {
    pub status: ProbeStatus,
    pub metrics: Option<CategoryMetrics>,
    pub error: Option<String>,
    pub observed_at: DateTime<Utc>,
    pub latency_ms: u64,
}

impl CategoryReading {
    pub fn ok(metrics: CategoryMetrics, observed_at: DateTime<Utc>, latency_ms: u64) -> Self {
        Self {
            status: ProbeStatus::Ok,
            metrics: Some(metrics),
            error: None,
            observed_at,
            latency_ms,
        }
    }

    pub fn degraded(status: ProbeStatus, error: impl Into<String>, observed_at: DateTime<Utc>, latency_ms: u64) -> Self {
        Self {
            status,
            metrics: None,
            error: Some(error.into()),
            observed_at,
            latency_ms,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ProbeStatus::Ok && self.metrics.is_some()
    }
}

/// One collection across every category. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub environment_id: String,
    pub categories: BTreeMap<Category, CategoryReading>,
}

impl MetricSnapshot {
    pub fn reading(&self, category: Category) -> Option<&CategoryReading> {
        self.categories.get(&category)
    }

    pub fn metrics(&self, category: Category) -> Option<&CategoryMetrics> {
        self.reading(category)
            .filter(|r| r.status == ProbeStatus::Ok)
            .and_then(|r| r.metrics.as_ref())
    }

    pub fn system(&self) -> Option<&SystemMetrics> {
        match self.metrics(Category::System)? {
            CategoryMetrics::System(m) => Some(m),
            _ => None,
        }
    }

    pub fn api(&self) -> Option<&ApiMetrics> {
        match self.metrics(Category::Api)? {
            CategoryMetrics::Api(m) => Some(m),
            _ => None,
        }
    }

    pub fn database(&self) -> Option<&DatabaseMetrics> {
        match self.metrics(Category::Database)? {
            CategoryMetrics::Database(m) => Some(m),
            _ => None,
        }
    }

    pub fn integration(&self) -> Option<&IntegrationMetrics> {
        match self.metrics(Category::Integration)? {
            CategoryMetrics::Integration(m) => Some(m),
            _ => None,
        }
    }

    pub fn ui(&self) -> Option<&UiMetrics> {
        match self.metrics(Category::Ui)? {
            CategoryMetrics::Ui(m) => Some(m),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<&SessionMetrics> {
        match self.metrics(Category::Session)? {
            CategoryMetrics::Session(m) => Some(m),
            _ => None,
        }
    }

    pub fn progressive(&self) -> Option<&ProgressiveMetrics> {
        match self.metrics(Category::Progressive)? {
            CategoryMetrics::Progressive(m) => Some(m),
            _ => None,
        }
    }

    /// Categories whose latest reading carries no usable value.
    pub fn degraded_categories(&self) -> Vec<Category> {
        Category::ALL
            .iter()
            .copied()
            .filter(|c| self.metrics(*c).is_none())
            .collect()
    }
}

// =====================================================================================
// HEALTH SCORE
// =====================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub overall: f64,
    pub breakdown: BTreeMap<Category, f64>,
    pub trend: Trend,
    /// Change in `overall` against the prior snapshot.
    pub delta: Option<f64>,
    pub computed_at: DateTime<Utc>,
    pub snapshot_sequence: u64,
    /// Categories scored with the unknown-category score.
    pub unknown_categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub samples: usize,
    pub first: Option<f64>,
    pub last: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub average: Option<f64>,
    pub trend: Trend,
    pub category_deltas: BTreeMap<Category, f64>,
}

// =====================================================================================
// ALERTS
// =====================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub severity: AlertSeverity,
    pub category: Category,
    pub title: String,
    pub message: String,
    pub source: String,
    pub metadata: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrences: u64,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

impl Alert {
    pub fn new(
        severity: AlertSeverity,
        category: Category,
        title: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            severity,
            category,
            title: title.into(),
            message: message.into(),
            source: source.into(),
            metadata: BTreeMap::new(),
            timestamp: now,
            last_seen: now,
            occurrences: 1,
            resolved: false,
            resolved_at: None,
            resolution: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.resolved
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", content = "alert", rename_all = "snake_case")]
pub enum AlertChange {
    Created(Alert),
    Updated(Alert),
    Resolved(Alert),
}

impl AlertChange {
    pub fn alert(&self) -> &Alert {
        match self {
            AlertChange::Created(alert) | AlertChange::Updated(alert) | AlertChange::Resolved(alert) => alert,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlertChange::Created(_) => "created",
            AlertChange::Updated(_) => "updated",
            AlertChange::Resolved(_) => "resolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "alert", rename_all = "snake_case")]
pub enum ResolveOutcome {
    Resolved(Alert),
    AlreadyResolved(Alert),
    NotFound,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertCounts {
    pub active: usize,
    pub retained: usize,
    pub created_total: u64,
    pub resolved_total: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestAlertRequest {
    pub severity: Option<AlertSeverity>,
    pub category: Option<Category>,
    pub message: Option<String>,
}

// =====================================================================================
// SCHEDULER
// =====================================================================================

/// One scheduler run, from start to stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSession {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub active_intervals: BTreeMap<Category, u64>,
    pub checks_performed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "session", rename_all = "snake_case")]
pub enum StartOutcome {
    Started(MonitoringSession),
    AlreadyRunning(MonitoringSession),
}

impl StartOutcome {
    pub fn session(&self) -> &MonitoringSession {
        match self {
            StartOutcome::Started(session) | StartOutcome::AlreadyRunning(session) => session,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub session: Option<MonitoringSession>,
    pub uptime_seconds: u64,
    pub active_intervals: BTreeMap<Category, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStatus {
    pub environment_id: String,
    pub scheduler: SchedulerStatus,
    pub alerts: AlertCounts,
    pub snapshots_retained: usize,
    pub snapshot_capacity: usize,
    pub ticks_total: u64,
    pub latest_score: Option<f64>,
    pub last_tick_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickTrigger {
    Scheduled,
    Manual,
}

/// Result of one Collector -> Health Score -> Alert Manager pass.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub trigger: TickTrigger,
    pub snapshot: Arc<MetricSnapshot>,
    pub score: Arc<HealthScore>,
    pub changes: Vec<AlertChange>,
}

// =====================================================================================
// EVENTS
// =====================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Tick,
    HealthCheck,
    ProbeTimeout,
    ProbeFailure,
    AlertCreated,
    AlertResolved,
    AlertDeliveryFailed,
    BreakerTransition,
    SchedulerStarted,
    SchedulerStopped,
    ConfigUpdated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub kind: EventKind,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    pub after: Option<u64>,
    pub limit: Option<usize>,
}

// =====================================================================================
// READ MODELS
// =====================================================================================

#[derive(Debug, Clone, Serialize)]
pub struct SystemOverview {
    pub environment_id: String,
    pub latest_snapshot: Option<Arc<MetricSnapshot>>,
    pub snapshots_retained: usize,
    pub degraded_categories: Vec<Category>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub status: MonitoringStatus,
    pub system_overview: SystemOverview,
    pub active_alerts: Vec<Alert>,
    pub health_score: Option<Arc<HealthScore>>,
    pub circuits: Vec<CircuitBreakerSnapshot>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportBundle {
    pub exported_at: DateTime<Utc>,
    pub config: MonitoringConfig,
    pub status: MonitoringStatus,
    pub snapshots: Vec<Arc<MetricSnapshot>>,
    pub health_scores: Vec<Arc<HealthScore>>,
    pub alerts: Vec<Alert>,
    pub circuits: Vec<CircuitBreakerSnapshot>,
}

// Request/Response models
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AlertListQuery {
    pub include_resolved: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SetConfigValueRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FeatureEvent {
    pub duration_ms: u64,
    #[serde(default)]
    pub failed: bool,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub events: Vec<FeatureEvent>,
}

#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Alert not found: {0}")]
    AlertNotFound(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}
