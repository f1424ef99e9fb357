// =====================================================================================
// MONITORING CONFIGURATION - TYPED, VALIDATED OPERATOR SETTINGS
// =====================================================================================

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ConfigError;

const WEIGHT_TOLERANCE: f64 = 1e-6;
const MAX_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

// =====================================================================================
// VOCABULARY
// =====================================================================================

/// The fixed partition of monitored concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    System,
    Api,
    Database,
    Integration,
    Ui,
    Session,
    Progressive,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::System,
        Category::Api,
        Category::Database,
        Category::Integration,
        Category::Ui,
        Category::Session,
        Category::Progressive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::System => "system",
            Category::Api => "api",
            Category::Database => "database",
            Category::Integration => "integration",
            Category::Ui => "ui",
            Category::Session => "session",
            Category::Progressive => "progressive",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::invalid("category", format!("unknown category '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
            AlertSeverity::Critical => "critical",
        };
        f.write_str(label)
    }
}

impl FromStr for AlertSeverity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(AlertSeverity::Info),
            "warning" => Ok(AlertSeverity::Warning),
            "error" => Ok(AlertSeverity::Error),
            "critical" => Ok(AlertSeverity::Critical),
            other => Err(ConfigError::invalid("severity", format!("unknown severity '{}'", other))),
        }
    }
}

/// Value an alert rule reads out of a snapshot or health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    SystemMemoryPercent,
    SystemCpuPercent,
    SystemDiskPercent,
    ApiErrorRate,
    ApiAverageLatencyMs,
    /// 0 = healthy, 1 = degraded, 2 = unhealthy
    DatabaseStatus,
    DatabaseQueryTimeMs,
    DatabaseTransactionFailureRate,
    IntegrationDownCount,
    IntegrationMaxLatencyMs,
    UiClientErrorRate,
    UiAverageRenderMs,
    SessionFailureRate,
    /// 1 while the session-store breaker is open, else 0
    SessionBreakerOpen,
    ProgressiveFailureRate,
    ProgressiveAverageLoadMs,
    CategoryScore(Category),
    OverallScore,
    /// 1 while the category's latest probe did not produce a value
    ProbeUnavailable(Category),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertComparison {
    GreaterThan,
    LessThan,
    Equals,
}

impl AlertComparison {
    pub fn breached(&self, value: f64, threshold: f64) -> bool {
        match self {
            AlertComparison::GreaterThan => value > threshold,
            AlertComparison::LessThan => value < threshold,
            AlertComparison::Equals => (value - threshold).abs() < 0.001,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            AlertComparison::GreaterThan => "exceeds",
            AlertComparison::LessThan => "is below",
            AlertComparison::Equals => "equals",
        }
    }
}

// =====================================================================================
// SECTIONS
// =====================================================================================

/// Sampling interval per category, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CategoryIntervals {
    pub system: u64,
    pub api: u64,
    pub database: u64,
    pub integration: u64,
    pub ui: u64,
    pub session: u64,
    pub progressive: u64,
}

impl Default for CategoryIntervals {
    fn default() -> Self {
        Self {
            system: 30_000,
            api: 15_000,
            database: 30_000,
            integration: 60_000,
            ui: 60_000,
            session: 15_000,
            progressive: 120_000,
        }
    }
}

impl CategoryIntervals {
    pub fn uniform(interval_ms: u64) -> Self {
        Self {
            system: interval_ms,
            api: interval_ms,
            database: interval_ms,
            integration: interval_ms,
            ui: interval_ms,
            session: interval_ms,
            progressive: interval_ms,
        }
    }

    pub fn get(&self, category: Category) -> u64 {
        match category {
            Category::System => self.system,
            Category::Api => self.api,
            Category::Database => self.database,
            Category::Integration => self.integration,
            Category::Ui => self.ui,
            Category::Session => self.session,
            Category::Progressive => self.progressive,
        }
    }

    pub fn as_map(&self) -> BTreeMap<Category, u64> {
        Category::ALL.iter().map(|c| (*c, self.get(*c))).collect()
    }

    pub fn duration(&self, category: Category) -> Duration {
        Duration::from_millis(self.get(category))
    }
}

/// Weight of each category in the overall score. Must sum to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CategoryWeights {
    pub system: f64,
    pub api: f64,
    pub database: f64,
    pub integration: f64,
    pub ui: f64,
    pub session: f64,
    pub progressive: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            system: 0.2,
            api: 0.2,
            database: 0.2,
            integration: 0.15,
            ui: 0.1,
            session: 0.1,
            progressive: 0.05,
        }
    }
}

impl CategoryWeights {
    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::System => self.system,
            Category::Api => self.api,
            Category::Database => self.database,
            Category::Integration => self.integration,
            Category::Ui => self.ui,
            Category::Session => self.session,
            Category::Progressive => self.progressive,
        }
    }

    pub fn total(&self) -> f64 {
        Category::ALL.iter().map(|c| self.get(*c)).sum()
    }
}

/// Linear band mapping a raw metric onto 0-100.
///
/// `best` scores 100 and `worst` scores 0. Either direction works: when
/// `best < worst` lower values are better (latency, error rate), when
/// `best > worst` higher values are better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoreBand {
    pub best: f64,
    pub worst: f64,
}

impl ScoreBand {
    pub const fn new(best: f64, worst: f64) -> Self {
        Self { best, worst }
    }

    pub fn score(&self, value: f64) -> f64 {
        if value.is_nan() {
            return 0.0;
        }
        let span = self.worst - self.best;
        if span == 0.0 {
            return if value == self.best { 100.0 } else { 0.0 };
        }
        let position = (value - self.best) / span;
        (100.0 * (1.0 - position)).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoreBands {
    pub memory_percent: ScoreBand,
    pub cpu_percent: ScoreBand,
    pub disk_percent: ScoreBand,
    pub api_error_rate: ScoreBand,
    pub api_latency_ms: ScoreBand,
    pub db_query_time_ms: ScoreBand,
    pub db_transaction_failure_rate: ScoreBand,
    pub integration_latency_ms: ScoreBand,
    pub ui_client_error_rate: ScoreBand,
    pub ui_render_ms: ScoreBand,
    pub session_failure_rate: ScoreBand,
    pub progressive_failure_rate: ScoreBand,
    pub progressive_load_ms: ScoreBand,
}

impl Default for ScoreBands {
    fn default() -> Self {
        Self {
            memory_percent: ScoreBand::new(70.0, 95.0),
            cpu_percent: ScoreBand::new(70.0, 95.0),
            disk_percent: ScoreBand::new(80.0, 98.0),
            api_error_rate: ScoreBand::new(0.0, 10.0),
            api_latency_ms: ScoreBand::new(200.0, 2000.0),
            db_query_time_ms: ScoreBand::new(100.0, 1000.0),
            db_transaction_failure_rate: ScoreBand::new(0.0, 5.0),
            integration_latency_ms: ScoreBand::new(500.0, 5000.0),
            ui_client_error_rate: ScoreBand::new(0.0, 5.0),
            ui_render_ms: ScoreBand::new(100.0, 1000.0),
            session_failure_rate: ScoreBand::new(0.0, 20.0),
            progressive_failure_rate: ScoreBand::new(0.0, 10.0),
            progressive_load_ms: ScoreBand::new(200.0, 2000.0),
        }
    }
}

impl ScoreBands {
    fn named(&self) -> [(&'static str, ScoreBand); 13] {
        [
            ("memory_percent", self.memory_percent),
            ("cpu_percent", self.cpu_percent),
            ("disk_percent", self.disk_percent),
            ("api_error_rate", self.api_error_rate),
            ("api_latency_ms", self.api_latency_ms),
            ("db_query_time_ms", self.db_query_time_ms),
            ("db_transaction_failure_rate", self.db_transaction_failure_rate),
            ("integration_latency_ms", self.integration_latency_ms),
            ("ui_client_error_rate", self.ui_client_error_rate),
            ("ui_render_ms", self.ui_render_ms),
            ("session_failure_rate", self.session_failure_rate),
            ("progressive_failure_rate", self.progressive_failure_rate),
            ("progressive_load_ms", self.progressive_load_ms),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    pub weights: CategoryWeights,
    pub bands: ScoreBands,
    /// Minimum change in overall score that counts as a trend.
    pub trend_epsilon: f64,
    /// Score given to a category whose probe produced no value.
    pub unknown_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: CategoryWeights::default(),
            bands: ScoreBands::default(),
            trend_epsilon: 1.0,
            unknown_score: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertRule {
    /// Condition signature; unique per rule.
    pub id: String,
    pub category: Category,
    pub metric: MetricKey,
    pub comparison: AlertComparison,
    pub threshold: f64,
    pub severity: AlertSeverity,
    pub title: String,
}

impl AlertRule {
    pub fn new(
        id: &str,
        category: Category,
        metric: MetricKey,
        comparison: AlertComparison,
        threshold: f64,
        severity: AlertSeverity,
        title: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            category,
            metric,
            comparison,
            threshold,
            severity,
            title: title.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertsConfig {
    pub rules: Vec<AlertRule>,
    pub max_resolved: usize,
    pub resolved_retention_secs: u64,
    pub webhook_url: Option<String>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        use AlertComparison::*;
        use AlertSeverity::*;

        let rules = vec![
            AlertRule::new("system.memory_high", Category::System, MetricKey::SystemMemoryPercent, GreaterThan, 90.0, Warning, "High memory usage"),
            AlertRule::new("system.cpu_high", Category::System, MetricKey::SystemCpuPercent, GreaterThan, 90.0, Warning, "High CPU usage"),
            AlertRule::new("system.disk_high", Category::System, MetricKey::SystemDiskPercent, GreaterThan, 90.0, Error, "Disk nearly full"),
            AlertRule::new("api.error_rate_high", Category::Api, MetricKey::ApiErrorRate, GreaterThan, 5.0, Warning, "High Error Rate"),
            AlertRule::new("api.error_rate_critical", Category::Api, MetricKey::ApiErrorRate, GreaterThan, 10.0, Critical, "Critical Error Rate"),
            AlertRule::new("api.latency_high", Category::Api, MetricKey::ApiAverageLatencyMs, GreaterThan, 2000.0, Warning, "High Response Time"),
            AlertRule::new("database.unhealthy", Category::Database, MetricKey::DatabaseStatus, GreaterThan, 1.5, Critical, "Database unhealthy"),
            AlertRule::new("database.slow_queries", Category::Database, MetricKey::DatabaseQueryTimeMs, GreaterThan, 1000.0, Warning, "Slow database queries"),
            AlertRule::new("database.probe_unavailable", Category::Database, MetricKey::ProbeUnavailable(Category::Database), GreaterThan, 0.5, Warning, "Database probe unavailable"),
            AlertRule::new("integration.provider_down", Category::Integration, MetricKey::IntegrationDownCount, GreaterThan, 0.0, Error, "External provider down"),
            AlertRule::new("ui.client_errors_high", Category::Ui, MetricKey::UiClientErrorRate, GreaterThan, 5.0, Warning, "Elevated client-side errors"),
            AlertRule::new("session.breaker_open", Category::Session, MetricKey::SessionBreakerOpen, GreaterThan, 0.5, Critical, "Session store circuit open"),
            AlertRule::new("session.failure_rate_high", Category::Session, MetricKey::SessionFailureRate, GreaterThan, 10.0, Error, "Session store failures"),
            AlertRule::new("progressive.failure_rate_high", Category::Progressive, MetricKey::ProgressiveFailureRate, GreaterThan, 10.0, Warning, "Progressive features failing to load"),
        ];

        Self {
            rules,
            max_resolved: 500,
            resolved_retention_secs: 24 * 60 * 60,
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// 0 disables the per-call timeout.
    pub call_timeout_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            base_backoff_ms: 30_000,
            max_backoff_ms: 300_000,
            call_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    /// Sessions expiring within this window are refreshed in the background.
    pub refresh_window_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_window_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegrationTarget {
    pub name: String,
    pub url: String,
    #[serde(default = "default_degraded_latency_ms")]
    pub degraded_latency_ms: u64,
}

fn default_degraded_latency_ms() -> u64 {
    2_000
}

// =====================================================================================
// ROOT
// =====================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitoringConfig {
    pub environment_id: String,
    pub intervals: CategoryIntervals,
    pub probe_timeout_ms: u64,
    pub snapshot_capacity: usize,
    pub event_log_capacity: usize,
    pub scoring: ScoringConfig,
    pub alerts: AlertsConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub session: SessionSettings,
    pub integrations: Vec<IntegrationTarget>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            environment_id: "local".to_string(),
            intervals: CategoryIntervals::default(),
            probe_timeout_ms: 5_000,
            snapshot_capacity: 120,
            event_log_capacity: 500,
            scoring: ScoringConfig::default(),
            alerts: AlertsConfig::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            session: SessionSettings::default(),
            integrations: Vec::new(),
        }
    }
}

const REDACTED: &str = "[redacted]";

impl MonitoringConfig {
    /// Copy safe to show without operator credentials. Webhook URLs often
    /// embed a token.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.alerts.webhook_url.is_some() {
            copy.alerts.webhook_url = Some(REDACTED.to_string());
        }
        copy
    }

    /// Parses and validates a JSON document. Sections left out keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: MonitoringConfig = serde_json::from_str(raw).map_err(ConfigError::from_serde)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let config: MonitoringConfig = serde_json::from_value(value).map_err(ConfigError::from_serde)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!("Loaded monitoring configuration from {}", path.display());
        Self::from_json_str(&raw)
    }

    pub fn to_pretty_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Returns a copy with the dotted `key` set to `raw`.
    ///
    /// `raw` is read as JSON when it parses (`42`, `true`, `{"a":1}`) and as a
    /// plain string otherwise. Array elements are addressed by index, e.g.
    /// `alerts.rules.0.threshold`.
    pub fn with_value(&self, key: &str, raw: &str) -> Result<Self, ConfigError> {
        let mut document = serde_json::to_value(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let segments: Vec<&str> = key.split('.').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut cursor = &mut document;
        for segment in &segments {
            cursor = match cursor {
                Value::Object(map) => map
                    .get_mut(*segment)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?,
                Value::Array(items) => {
                    let index: usize = segment
                        .parse()
                        .map_err(|_| ConfigError::UnknownKey(key.to_string()))?;
                    items
                        .get_mut(index)
                        .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?
                }
                _ => return Err(ConfigError::UnknownKey(key.to_string())),
            };
        }

        *cursor = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        Self::from_value(document)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment_id.trim().is_empty() {
            return Err(ConfigError::invalid("environment_id", "must not be empty"));
        }

        for category in Category::ALL {
            let interval = self.intervals.get(category);
            if interval == 0 || interval > MAX_INTERVAL_MS {
                return Err(ConfigError::invalid(
                    format!("intervals.{}", category),
                    format!("must be between 1 and {} ms, got {}", MAX_INTERVAL_MS, interval),
                ));
            }
        }

        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::invalid("probe_timeout_ms", "must be greater than zero"));
        }
        if self.snapshot_capacity < 2 {
            return Err(ConfigError::invalid(
                "snapshot_capacity",
                "must retain at least 2 snapshots to compute a trend",
            ));
        }
        if self.event_log_capacity == 0 {
            return Err(ConfigError::invalid("event_log_capacity", "must be greater than zero"));
        }

        self.validate_scoring()?;
        self.validate_alerts()?;

        let breaker = &self.circuit_breaker;
        if breaker.failure_threshold == 0 {
            return Err(ConfigError::invalid("circuit_breaker.failure_threshold", "must be at least 1"));
        }
        if breaker.base_backoff_ms == 0 {
            return Err(ConfigError::invalid("circuit_breaker.base_backoff_ms", "must be greater than zero"));
        }
        if breaker.max_backoff_ms < breaker.base_backoff_ms {
            return Err(ConfigError::invalid(
                "circuit_breaker.max_backoff_ms",
                "must not be smaller than base_backoff_ms",
            ));
        }

        for (index, target) in self.integrations.iter().enumerate() {
            if target.name.trim().is_empty() {
                return Err(ConfigError::invalid(format!("integrations.{}.name", index), "must not be empty"));
            }
            if !(target.url.starts_with("http://") || target.url.starts_with("https://")) {
                return Err(ConfigError::invalid(
                    format!("integrations.{}.url", index),
                    "must be an http(s) URL",
                ));
            }
        }

        Ok(())
    }

    fn validate_scoring(&self) -> Result<(), ConfigError> {
        let scoring = &self.scoring;
        for category in Category::ALL {
            let weight = scoring.weights.get(category);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::invalid(
                    format!("scoring.weights.{}", category),
                    "must be a non-negative number",
                ));
            }
        }
        let total = scoring.weights.total();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::invalid(
                "scoring.weights",
                format!("must sum to 1.0, got {:.6}", total),
            ));
        }

        for (name, band) in scoring.bands.named() {
            if !band.best.is_finite() || !band.worst.is_finite() || band.best == band.worst {
                return Err(ConfigError::invalid(
                    format!("scoring.bands.{}", name),
                    "best and worst must be finite and distinct",
                ));
            }
        }

        if !scoring.trend_epsilon.is_finite() || scoring.trend_epsilon < 0.0 {
            return Err(ConfigError::invalid("scoring.trend_epsilon", "must be a non-negative number"));
        }
        if !(0.0..=100.0).contains(&scoring.unknown_score) {
            return Err(ConfigError::invalid("scoring.unknown_score", "must be between 0 and 100"));
        }
        Ok(())
    }

    fn validate_alerts(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, rule) in self.alerts.rules.iter().enumerate() {
            if rule.id.trim().is_empty() {
                return Err(ConfigError::invalid(format!("alerts.rules.{}.id", index), "must not be empty"));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(ConfigError::invalid(
                    format!("alerts.rules.{}.id", index),
                    format!("duplicate rule id '{}'", rule.id),
                ));
            }
            if !rule.threshold.is_finite() {
                return Err(ConfigError::invalid(
                    format!("alerts.rules.{}.threshold", index),
                    "must be a finite number",
                ));
            }
        }
        if let Some(url) = &self.alerts.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::invalid("alerts.webhook_url", "must be an http(s) URL"));
            }
        }
        Ok(())
    }
}
