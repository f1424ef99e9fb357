// =====================================================================================
// DASHBOARD AGGREGATOR
// =====================================================================================

use std::sync::Arc;

use chrono::Utc;

use resilience_cell::CircuitBreakerSnapshot;

use crate::models::{Alert, DashboardSnapshot, HealthScore, MetricSnapshot, MonitoringStatus, SystemOverview};

/// Everything the dashboard reads, captured before assembly.
pub struct DashboardInputs {
    pub status: MonitoringStatus,
    pub latest_snapshot: Option<Arc<MetricSnapshot>>,
    pub active_alerts: Vec<Alert>,
    pub health_score: Option<Arc<HealthScore>>,
    pub circuits: Vec<CircuitBreakerSnapshot>,
}

/// Builds the read-only dashboard view. Active alerts are ordered by
/// severity, most severe first, then newest first.
pub fn assemble(inputs: DashboardInputs) -> DashboardSnapshot {
    let DashboardInputs {
        status,
        latest_snapshot,
        mut active_alerts,
        health_score,
        circuits,
    } = inputs;

    active_alerts.retain(Alert::is_active);
    active_alerts.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });

    let degraded_categories = latest_snapshot
        .as_ref()
        .map(|snapshot| snapshot.degraded_categories())
        .unwrap_or_default();

    let system_overview = SystemOverview {
        environment_id: status.environment_id.clone(),
        snapshots_retained: status.snapshots_retained,
        latest_snapshot,
        degraded_categories,
    };

    DashboardSnapshot {
        status,
        system_overview,
        active_alerts,
        health_score,
        circuits,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertCounts, SchedulerStatus};
    use chrono::Duration;
    use shared_config::{AlertSeverity, Category};
    use std::collections::BTreeMap;

    fn status() -> MonitoringStatus {
        MonitoringStatus {
            environment_id: "staging".to_string(),
            scheduler: SchedulerStatus {
                running: false,
                session: None,
                uptime_seconds: 0,
                active_intervals: BTreeMap::new(),
            },
            alerts: AlertCounts::default(),
            snapshots_retained: 0,
            snapshot_capacity: 10,
            ticks_total: 0,
            latest_score: None,
            last_tick_at: None,
        }
    }

    #[test]
    fn alerts_sorted_by_severity_then_recency() {
        let mut older_critical = Alert::new(AlertSeverity::Critical, Category::Database, "db", "m", "s");
        older_critical.timestamp = Utc::now() - Duration::minutes(10);
        let newer_critical = Alert::new(AlertSeverity::Critical, Category::Session, "session", "m", "s");
        let warning = Alert::new(AlertSeverity::Warning, Category::Api, "api", "m", "s");
        let mut resolved = Alert::new(AlertSeverity::Critical, Category::Api, "gone", "m", "s");
        resolved.resolved = true;

        let dashboard = assemble(DashboardInputs {
            status: status(),
            latest_snapshot: None,
            active_alerts: vec![warning, older_critical, resolved, newer_critical],
            health_score: None,
            circuits: Vec::new(),
        });

        let titles: Vec<&str> = dashboard.active_alerts.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["session", "db", "api"]);
        assert_eq!(dashboard.system_overview.environment_id, "staging");
        assert!(dashboard.system_overview.degraded_categories.is_empty());
    }
}
