// =====================================================================================
// ALERT MANAGER SERVICE
// =====================================================================================

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use resilience_cell::CircuitState;
use shared_config::{AlertRule, AlertSeverity, AlertsConfig, Category, MetricKey};

use crate::models::{
    Alert, AlertChange, AlertCounts, HealthScore, MetricSnapshot, ResolveOutcome, TestAlertRequest,
};

const RULE_SOURCE_PREFIX: &str = "rule:";
const TEST_ALERT_SOURCE: &str = "synthetic";

#[derive(Debug)]
struct AlertState {
    rules: Vec<AlertRule>,
    max_resolved: usize,
    retention: Duration,
    /// Creation order; active alerts are never trimmed.
    alerts: Vec<Alert>,
    /// (category, rule id) -> id of the active alert.
    active_index: HashMap<(Category, String), String>,
    created_total: u64,
    resolved_total: u64,
}

impl AlertState {
    fn resolve_at(&mut self, position: usize, resolution: &str) -> Alert {
        let now = Utc::now();
        let alert = &mut self.alerts[position];
        alert.resolved = true;
        alert.resolved_at = Some(now);
        alert.resolution = Some(resolution.to_string());
        let resolved = alert.clone();
        self.active_index.retain(|_, id| *id != resolved.id);
        self.resolved_total += 1;
        resolved
    }

    fn position(&self, alert_id: &str) -> Option<usize> {
        self.alerts.iter().position(|alert| alert.id == alert_id)
    }

    fn trim(&mut self) {
        let cutoff = Utc::now() - self.retention;
        self.alerts
            .retain(|alert| alert.is_active() || alert.resolved_at.map_or(true, |at| at >= cutoff));

        let resolved = self.alerts.iter().filter(|alert| alert.resolved).count();
        let mut excess = resolved.saturating_sub(self.max_resolved);
        if excess > 0 {
            self.alerts.retain(|alert| {
                if excess > 0 && alert.resolved {
                    excess -= 1;
                    false
                } else {
                    true
                }
            });
        }
    }
}

pub struct AlertManagerService {
    state: RwLock<AlertState>,
}

impl AlertManagerService {
    pub fn new(config: &AlertsConfig) -> Self {
        Self {
            state: RwLock::new(AlertState {
                rules: config.rules.clone(),
                max_resolved: config.max_resolved,
                retention: retention(config),
                alerts: Vec::new(),
                active_index: HashMap::new(),
                created_total: 0,
                resolved_total: 0,
            }),
        }
    }

    /// Checks every rule against the snapshot and score. A rule whose metric
    /// has no value this tick leaves its alert untouched.
    #[instrument(skip(self, snapshot, score), fields(sequence = snapshot.sequence))]
    pub async fn evaluate(&self, snapshot: &MetricSnapshot, score: &HealthScore) -> Vec<AlertChange> {
        let mut state = self.state.write().await;
        let mut changes = Vec::new();
        let rules = state.rules.clone();

        for rule in &rules {
            let Some(value) = read_metric(rule.metric, snapshot, score) else {
                continue;
            };
            let breached = rule.comparison.breached(value, rule.threshold);
            let key = (rule.category, rule.id.clone());
            let active = state.active_index.get(&key).cloned();

            match (breached, active) {
                (true, None) => {
                    let alert = build_alert(rule, value, snapshot.sequence);
                    info!(alert_id = %alert.id, rule = %rule.id, value, "Alert raised: {}", alert.title);
                    state.active_index.insert(key, alert.id.clone());
                    state.alerts.push(alert.clone());
                    state.created_total += 1;
                    changes.push(AlertChange::Created(alert));
                }
                (true, Some(id)) => {
                    if let Some(position) = state.position(&id) {
                        let alert = &mut state.alerts[position];
                        alert.last_seen = Utc::now();
                        alert.occurrences += 1;
                        alert.metadata.insert("value".to_string(), json!(value));
                        alert.metadata.insert("snapshot_sequence".to_string(), json!(snapshot.sequence));
                        changes.push(AlertChange::Updated(alert.clone()));
                    }
                }
                (false, Some(id)) => {
                    if let Some(position) = state.position(&id) {
                        let resolved = state.resolve_at(position, "condition cleared");
                        info!(alert_id = %resolved.id, rule = %rule.id, value, "Alert resolved: {}", resolved.title);
                        changes.push(AlertChange::Resolved(resolved));
                    }
                }
                (false, None) => {}
            }
        }

        state.trim();
        changes
    }

    /// Operator resolution. Unknown and already-resolved ids are outcomes,
    /// not errors.
    #[instrument(skip(self))]
    pub async fn resolve(&self, alert_id: &str, resolution: Option<&str>) -> ResolveOutcome {
        let mut state = self.state.write().await;
        let Some(position) = state.position(alert_id) else {
            return ResolveOutcome::NotFound;
        };
        if state.alerts[position].resolved {
            return ResolveOutcome::AlreadyResolved(state.alerts[position].clone());
        }
        let resolved = state.resolve_at(position, resolution.unwrap_or("resolved by operator"));
        state.trim();
        info!(alert_id, "Alert resolved by operator");
        ResolveOutcome::Resolved(resolved)
    }

    /// Raises and immediately resolves a synthetic alert so delivery channels
    /// can be exercised without touching the active set.
    pub async fn test_alert(&self, request: TestAlertRequest) -> Vec<AlertChange> {
        let severity = request.severity.unwrap_or(AlertSeverity::Info);
        let category = request.category.unwrap_or(Category::System);
        let message = request
            .message
            .unwrap_or_else(|| "Synthetic alert to verify delivery channels".to_string());

        let mut alert = Alert::new(severity, category, "Test alert", message, TEST_ALERT_SOURCE);
        alert.metadata.insert("synthetic".to_string(), json!(true));

        let mut state = self.state.write().await;
        state.alerts.push(alert.clone());
        state.created_total += 1;
        let position = state.alerts.len() - 1;
        let resolved = state.resolve_at(position, "synthetic alert auto-resolved");
        state.trim();

        debug!(alert_id = %alert.id, "Synthetic alert created");
        vec![AlertChange::Created(alert), AlertChange::Resolved(resolved)]
    }

    /// Swaps the rule set. Active alerts whose rule disappeared are resolved.
    pub async fn apply_config(&self, config: &AlertsConfig) -> Vec<AlertChange> {
        let mut state = self.state.write().await;
        state.rules = config.rules.clone();
        state.max_resolved = config.max_resolved;
        state.retention = retention(config);

        let live: HashSet<(Category, String)> = state
            .rules
            .iter()
            .map(|rule| (rule.category, rule.id.clone()))
            .collect();
        let orphaned: Vec<String> = state
            .active_index
            .iter()
            .filter(|(key, _)| !live.contains(*key))
            .map(|(_, id)| id.clone())
            .collect();

        let mut changes = Vec::new();
        for id in orphaned {
            if let Some(position) = state.position(&id) {
                changes.push(AlertChange::Resolved(state.resolve_at(position, "rule removed")));
            }
        }
        state.trim();
        changes
    }

    pub async fn active(&self) -> Vec<Alert> {
        let state = self.state.read().await;
        state.alerts.iter().filter(|a| a.is_active()).cloned().collect()
    }

    pub async fn all(&self) -> Vec<Alert> {
        self.state.read().await.alerts.clone()
    }

    pub async fn get(&self, alert_id: &str) -> Option<Alert> {
        let state = self.state.read().await;
        state.alerts.iter().find(|a| a.id == alert_id).cloned()
    }

    pub async fn counts(&self) -> AlertCounts {
        let state = self.state.read().await;
        AlertCounts {
            active: state.active_index.len(),
            retained: state.alerts.len(),
            created_total: state.created_total,
            resolved_total: state.resolved_total,
        }
    }

    pub async fn rules(&self) -> Vec<AlertRule> {
        self.state.read().await.rules.clone()
    }
}

fn retention(config: &AlertsConfig) -> Duration {
    Duration::seconds(config.resolved_retention_secs.min(i64::MAX as u64 / 1_000) as i64)
}

fn build_alert(rule: &AlertRule, value: f64, sequence: u64) -> Alert {
    let message = format!(
        "{} is {:.2}, which {} threshold {:.2}",
        metric_label(rule.metric),
        value,
        rule.comparison.describe(),
        rule.threshold
    );
    let mut alert = Alert::new(
        rule.severity,
        rule.category,
        rule.title.clone(),
        message,
        format!("{}{}", RULE_SOURCE_PREFIX, rule.id),
    );
    alert.metadata.insert("rule_id".to_string(), json!(rule.id));
    alert.metadata.insert("metric".to_string(), json!(rule.metric));
    alert.metadata.insert("value".to_string(), json!(value));
    alert.metadata.insert("threshold".to_string(), json!(rule.threshold));
    alert.metadata.insert("comparison".to_string(), json!(rule.comparison));
    alert.metadata.insert("snapshot_sequence".to_string(), json!(sequence));
    alert
}

fn metric_label(metric: MetricKey) -> String {
    match metric {
        MetricKey::CategoryScore(category) => format!("{} health score", category),
        MetricKey::ProbeUnavailable(category) => format!("{} probe unavailable", category),
        other => serde_json::to_value(other)
            .ok()
            .and_then(|v| v.as_str().map(|s| s.replace('_', " ")))
            .unwrap_or_else(|| format!("{:?}", other)),
    }
}

/// Current value of `metric`, or `None` when this tick has no data for it.
pub fn read_metric(metric: MetricKey, snapshot: &MetricSnapshot, score: &HealthScore) -> Option<f64> {
    match metric {
        MetricKey::SystemMemoryPercent => snapshot.system().map(|m| m.memory_percent),
        MetricKey::SystemCpuPercent => snapshot.system().and_then(|m| m.cpu_percent),
        MetricKey::SystemDiskPercent => snapshot.system().and_then(|m| m.disk_percent),
        MetricKey::ApiErrorRate => snapshot.api().map(|m| m.error_rate),
        MetricKey::ApiAverageLatencyMs => snapshot.api().map(|m| m.average_latency_ms),
        MetricKey::DatabaseStatus => snapshot.database().map(|m| m.status.as_metric()),
        MetricKey::DatabaseQueryTimeMs => snapshot.database().map(|m| m.average_query_time_ms),
        MetricKey::DatabaseTransactionFailureRate => snapshot.database().map(|m| m.transaction_failure_rate()),
        MetricKey::IntegrationDownCount => snapshot.integration().map(|m| m.down_count() as f64),
        MetricKey::IntegrationMaxLatencyMs => snapshot
            .integration()
            .and_then(|m| m.max_latency_ms())
            .map(|ms| ms as f64),
        MetricKey::UiClientErrorRate => snapshot.ui().map(|m| m.client_error_rate),
        MetricKey::UiAverageRenderMs => snapshot.ui().map(|m| m.average_render_ms),
        MetricKey::SessionFailureRate => snapshot.session().map(|m| m.failure_rate),
        MetricKey::SessionBreakerOpen => snapshot.session().map(|m| match m.breaker_state {
            CircuitState::Closed => 0.0,
            CircuitState::Open | CircuitState::HalfOpen => 1.0,
        }),
        MetricKey::ProgressiveFailureRate => snapshot.progressive().map(|m| m.failure_rate),
        MetricKey::ProgressiveAverageLoadMs => snapshot.progressive().map(|m| m.average_load_ms),
        MetricKey::CategoryScore(category) => score.breakdown.get(&category).copied(),
        MetricKey::OverallScore => Some(score.overall),
        MetricKey::ProbeUnavailable(category) => {
            Some(if snapshot.metrics(category).is_some() { 0.0 } else { 1.0 })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiMetrics, CategoryMetrics, CategoryReading, Trend};
    use shared_config::AlertComparison;
    use std::collections::BTreeMap;

    fn error_rate_rule() -> AlertRule {
        AlertRule::new(
            "api.error_rate_high",
            Category::Api,
            MetricKey::ApiErrorRate,
            AlertComparison::GreaterThan,
            5.0,
            AlertSeverity::Warning,
            "High Error Rate",
        )
    }

    fn config(rules: Vec<AlertRule>) -> AlertsConfig {
        AlertsConfig {
            rules,
            ..AlertsConfig::default()
        }
    }

    fn tick(sequence: u64, error_rate: Option<f64>) -> (MetricSnapshot, HealthScore) {
        let mut categories = BTreeMap::new();
        if let Some(error_rate) = error_rate {
            categories.insert(
                Category::Api,
                CategoryReading::ok(
                    CategoryMetrics::Api(ApiMetrics {
                        error_rate,
                        ..ApiMetrics::default()
                    }),
                    Utc::now(),
                    1,
                ),
            );
        }
        let snapshot = MetricSnapshot {
            sequence,
            timestamp: Utc::now(),
            environment_id: "test".to_string(),
            categories,
        };
        let score = HealthScore {
            overall: 90.0,
            breakdown: BTreeMap::new(),
            trend: Trend::Stable,
            delta: None,
            computed_at: Utc::now(),
            snapshot_sequence: sequence,
            unknown_categories: Vec::new(),
        };
        (snapshot, score)
    }

    #[tokio::test]
    async fn sustained_breach_creates_exactly_one_alert() {
        let manager = AlertManagerService::new(&config(vec![error_rate_rule()]));

        let mut created = 0;
        for sequence in 1..=5 {
            let (snapshot, score) = tick(sequence, Some(12.0));
            for change in manager.evaluate(&snapshot, &score).await {
                if matches!(change, AlertChange::Created(_)) {
                    created += 1;
                }
            }
        }

        assert_eq!(created, 1);
        let active = manager.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].occurrences, 5);
        assert_eq!(active[0].severity, AlertSeverity::Warning);
    }

    #[tokio::test]
    async fn cleared_condition_resolves_once_and_recurrence_creates_new_alert() {
        let manager = AlertManagerService::new(&config(vec![error_rate_rule()]));

        let (s1, h1) = tick(1, Some(12.0));
        let first = manager.evaluate(&s1, &h1).await;
        let first_id = first[0].alert().id.clone();

        let (s2, h2) = tick(2, Some(1.0));
        let cleared = manager.evaluate(&s2, &h2).await;
        assert_eq!(cleared.len(), 1);
        assert!(matches!(&cleared[0], AlertChange::Resolved(a) if a.id == first_id));

        let (s3, h3) = tick(3, Some(1.0));
        assert!(manager.evaluate(&s3, &h3).await.is_empty());

        let (s4, h4) = tick(4, Some(20.0));
        let again = manager.evaluate(&s4, &h4).await;
        assert!(matches!(&again[0], AlertChange::Created(a) if a.id != first_id));

        let old = manager.get(&first_id).await.unwrap();
        assert!(old.resolved);
        assert_eq!(manager.counts().await.created_total, 2);
    }

    #[tokio::test]
    async fn missing_metric_leaves_active_alert_alone() {
        let manager = AlertManagerService::new(&config(vec![error_rate_rule()]));
        let (s1, h1) = tick(1, Some(12.0));
        manager.evaluate(&s1, &h1).await;

        let (s2, h2) = tick(2, None);
        assert!(manager.evaluate(&s2, &h2).await.is_empty());
        assert_eq!(manager.active().await.len(), 1);
    }

    #[tokio::test]
    async fn resolve_reports_outcomes_instead_of_errors() {
        let manager = AlertManagerService::new(&config(vec![error_rate_rule()]));
        let (s1, h1) = tick(1, Some(12.0));
        let id = manager.evaluate(&s1, &h1).await[0].alert().id.clone();

        assert_eq!(manager.resolve("does-not-exist", None).await, ResolveOutcome::NotFound);
        assert_eq!(manager.active().await.len(), 1);

        assert!(matches!(manager.resolve(&id, None).await, ResolveOutcome::Resolved(_)));
        assert!(matches!(manager.resolve(&id, None).await, ResolveOutcome::AlreadyResolved(_)));
        assert!(manager.active().await.is_empty());
    }

    #[tokio::test]
    async fn test_alert_never_occupies_active_set() {
        let manager = AlertManagerService::new(&AlertsConfig::default());
        let changes = manager
            .test_alert(TestAlertRequest {
                severity: Some(AlertSeverity::Critical),
                category: None,
                message: None,
            })
            .await;

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].label(), "created");
        assert_eq!(changes[1].label(), "resolved");
        assert!(manager.active().await.is_empty());
        assert_eq!(manager.counts().await.retained, 1);
    }

    #[tokio::test]
    async fn retention_trims_only_resolved_alerts() {
        let alerts_config = AlertsConfig {
            rules: vec![error_rate_rule()],
            max_resolved: 2,
            ..AlertsConfig::default()
        };
        let manager = AlertManagerService::new(&alerts_config);
        for _ in 0..4 {
            manager.test_alert(TestAlertRequest { severity: None, category: None, message: None }).await;
        }
        let (s1, h1) = tick(1, Some(12.0));
        manager.evaluate(&s1, &h1).await;

        let all = manager.all().await;
        assert_eq!(all.iter().filter(|a| a.resolved).count(), 2);
        assert_eq!(all.iter().filter(|a| !a.resolved).count(), 1);
    }

    #[tokio::test]
    async fn removing_a_rule_resolves_its_alert() {
        let manager = AlertManagerService::new(&config(vec![error_rate_rule()]));
        let (s1, h1) = tick(1, Some(12.0));
        manager.evaluate(&s1, &h1).await;

        let changes = manager.apply_config(&config(Vec::new())).await;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].alert().resolution.as_deref(), Some("rule removed"));
        assert!(manager.active().await.is_empty());
    }
}
