// =====================================================================================
// TERMINAL RENDERING
// =====================================================================================

use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use std::fmt::Write;
use tabled::{settings::Style, Table, Tabled};

use environment_cell::{
    CheckStatus, Comparison, EnvironmentFingerprint, ValidationCheck, ValidationReport, VerificationReport,
};
use monitoring_cell::models::{AlertChange, MonitoringEvent, MonitoringStatus, ProbeStatus, TrendReport};
use monitoring_cell::{Alert, HealthScore, MetricSnapshot, Trend};
use resilience_cell::{CircuitBreakerSnapshot, CircuitState};
use shared_config::AlertSeverity;

use crate::client::{DashboardView, HealthCheckView, MetricsView};

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Seen")]
    occurrences: u64,
    #[tabled(rename = "Raised")]
    raised: String,
    #[tabled(rename = "State")]
    state: String,
}

#[derive(Tabled)]
struct CircuitRow {
    #[tabled(rename = "Breaker")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Failures")]
    failures: String,
    #[tabled(rename = "Calls")]
    calls: u64,
    #[tabled(rename = "Rejected")]
    rejected: u64,
    #[tabled(rename = "Next retry")]
    next_retry: String,
}

#[derive(Tabled)]
struct CategoryRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Probe")]
    status: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Latency")]
    latency: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "Check")]
    name: String,
    #[tabled(rename = "Result")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Left")]
    left: String,
    #[tabled(rename = "Right")]
    right: String,
}

fn table<T: Tabled>(rows: Vec<T>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn when(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn severity(severity: AlertSeverity) -> ColoredString {
    let label = severity.to_string();
    match severity {
        AlertSeverity::Critical => label.red().bold(),
        AlertSeverity::Error => label.red(),
        AlertSeverity::Warning => label.yellow(),
        AlertSeverity::Info => label.blue(),
    }
}

fn score(value: f64) -> ColoredString {
    let label = format!("{:.1}", value);
    if value >= 80.0 {
        label.green()
    } else if value >= 50.0 {
        label.yellow()
    } else {
        label.red()
    }
}

fn trend(trend: Trend) -> &'static str {
    match trend {
        Trend::Improving => "improving",
        Trend::Stable => "stable",
        Trend::Degrading => "degrading",
    }
}

fn check_status(status: CheckStatus) -> ColoredString {
    match status {
        CheckStatus::Pass => "pass".green(),
        CheckStatus::Warn => "warn".yellow(),
        CheckStatus::Fail => "fail".red().bold(),
    }
}

pub fn status(status: &MonitoringStatus) -> String {
    let mut out = String::new();
    let state = if status.scheduler.running {
        "running".green().bold()
    } else {
        "stopped".yellow().bold()
    };
    let _ = writeln!(out, "{} {} ({})", "Monitor".bold(), state, status.environment_id);

    if let Some(session) = &status.scheduler.session {
        let _ = writeln!(
            out,
            "  session {} since {} ({}s, {} checks)",
            session.id,
            when(&session.start_time),
            status.scheduler.uptime_seconds,
            session.checks_performed
        );
    }
    match status.latest_score {
        Some(value) => {
            let _ = writeln!(out, "  health score {}", score(value));
        }
        None => {
            let _ = writeln!(out, "  health score {}", "n/a".dimmed());
        }
    }
    let _ = writeln!(
        out,
        "  alerts {} active, {} raised, {} resolved",
        status.alerts.active, status.alerts.created_total, status.alerts.resolved_total
    );
    let _ = writeln!(
        out,
        "  snapshots {}/{}, {} checks total",
        status.snapshots_retained, status.snapshot_capacity, status.ticks_total
    );
    if let Some(at) = &status.last_tick_at {
        let _ = writeln!(out, "  last check {}", when(at));
    }
    out
}

pub fn alerts(alerts: &[Alert]) -> String {
    if alerts.is_empty() {
        return "No alerts.".to_string();
    }
    let rows = alerts
        .iter()
        .map(|alert| AlertRow {
            id: alert.id.clone(),
            severity: severity(alert.severity).to_string(),
            category: alert.category.to_string(),
            title: alert.title.clone(),
            occurrences: alert.occurrences,
            raised: when(&alert.timestamp),
            state: if alert.resolved { "resolved".to_string() } else { "active".to_string() },
        })
        .collect();
    table(rows)
}

pub fn alert_change(change: &AlertChange) -> String {
    let alert = change.alert();
    format!(
        "{} {} [{}] {}: {}",
        change.label().bold(),
        severity(alert.severity),
        alert.category,
        alert.title,
        alert.message
    )
}

pub fn circuits(circuits: &[CircuitBreakerSnapshot]) -> String {
    if circuits.is_empty() {
        return "No circuit breakers registered.".to_string();
    }
    let rows = circuits
        .iter()
        .map(|circuit| CircuitRow {
            name: circuit.name.clone(),
            state: match circuit.state {
                CircuitState::Closed => circuit.state.to_string().green().to_string(),
                CircuitState::HalfOpen => circuit.state.to_string().yellow().to_string(),
                CircuitState::Open => circuit.state.to_string().red().to_string(),
            },
            failures: format!("{}/{}", circuit.failure_count, circuit.failure_threshold),
            calls: circuit.total_calls,
            rejected: circuit.rejected_calls,
            next_retry: circuit.next_retry_time.as_ref().map(when).unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    table(rows)
}

fn categories(snapshot: &MetricSnapshot, health: Option<&HealthScore>) -> String {
    let rows = snapshot
        .categories
        .iter()
        .map(|(category, reading)| CategoryRow {
            category: category.to_string(),
            status: match reading.status {
                ProbeStatus::Ok => "ok".green().to_string(),
                ProbeStatus::TimedOut => "timed out".red().to_string(),
                ProbeStatus::Failed => "failed".red().to_string(),
                ProbeStatus::Unavailable => "unavailable".dimmed().to_string(),
            },
            score: health
                .and_then(|h| h.breakdown.get(category))
                .map(|value| score(*value).to_string())
                .unwrap_or_else(|| "-".to_string()),
            latency: format!("{} ms", reading.latency_ms),
            detail: reading.error.clone().unwrap_or_default(),
        })
        .collect();
    table(rows)
}

fn headline(health: &HealthScore) -> String {
    let delta = health
        .delta
        .map(|d| format!(" ({:+.1})", d))
        .unwrap_or_default();
    format!("Health {}{} {}", score(health.overall).bold(), delta, trend(health.trend))
}

pub fn metrics(view: &MetricsView) -> String {
    let mut out = String::new();
    match (&view.snapshot, &view.health_score) {
        (Some(snapshot), health) => {
            if let Some(health) = health {
                let _ = writeln!(out, "{}", headline(health));
            }
            let _ = writeln!(out, "Snapshot #{} at {}", snapshot.sequence, when(&snapshot.timestamp));
            let _ = writeln!(out, "{}", categories(snapshot, health.as_ref()));
        }
        (None, _) => {
            let _ = writeln!(out, "No metrics collected yet.");
        }
    }
    let _ = write!(out, "Operator API requests: {}", view.requests);
    out
}

pub fn health_check(view: &HealthCheckView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", headline(&view.score));
    let _ = writeln!(out, "{}", categories(&view.snapshot, Some(&view.score)));
    if view.changes.is_empty() {
        let _ = write!(out, "No alert changes.");
    } else {
        for change in &view.changes {
            let _ = writeln!(out, "{}", alert_change(change));
        }
    }
    out
}

pub fn trends(report: &TrendReport) -> String {
    if report.samples == 0 {
        return "No health scores recorded yet.".to_string();
    }
    let fmt = |value: Option<f64>| value.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".to_string());
    let mut out = String::new();
    let _ = writeln!(out, "{} samples, {}", report.samples, trend(report.trend));
    let _ = writeln!(
        out,
        "  first {}  last {}  min {}  max {}  avg {}",
        fmt(report.first),
        fmt(report.last),
        fmt(report.min),
        fmt(report.max),
        fmt(report.average)
    );
    for (category, delta) in &report.category_deltas {
        let _ = writeln!(out, "  {:<12} {:+.1}", category.to_string(), delta);
    }
    out
}

pub fn dashboard(view: &DashboardView) -> String {
    let mut out = status(&view.status);
    let _ = writeln!(out);
    if let Some(health) = &view.health_score {
        let _ = writeln!(out, "{}", headline(health));
    }
    if !view.system_overview.degraded_categories.is_empty() {
        let degraded: Vec<String> = view
            .system_overview
            .degraded_categories
            .iter()
            .map(ToString::to_string)
            .collect();
        let _ = writeln!(out, "{} {}", "Degraded:".red(), degraded.join(", "));
    }
    let _ = writeln!(out, "\n{}", "Active alerts".bold());
    let _ = writeln!(out, "{}", alerts(&view.active_alerts));
    let _ = writeln!(out, "\n{}", "Circuits".bold());
    let _ = write!(out, "{}", circuits(&view.circuits));
    out
}

pub fn events(events: &[MonitoringEvent]) -> String {
    let mut out = String::new();
    for event in events {
        let _ = writeln!(
            out,
            "{:>6} {} {:<5} {:?}: {}",
            event.seq,
            when(&event.timestamp),
            format!("{:?}", event.level).to_lowercase(),
            event.kind,
            event.message
        );
    }
    out
}

fn checks(checks: &[ValidationCheck]) -> String {
    let rows = checks
        .iter()
        .map(|check| CheckRow {
            name: check.name.clone(),
            status: check_status(check.status).to_string(),
            detail: check.detail.clone(),
        })
        .collect();
    table(rows)
}

pub fn validation(report: &ValidationReport) -> String {
    let verdict = if report.passed { "PASSED".green().bold() } else { "FAILED".red().bold() };
    format!("{} {}\n{}", report.target, verdict, checks(&report.checks))
}

pub fn verification(report: &VerificationReport) -> String {
    let verdict = if report.verified { "VERIFIED".green().bold() } else { "MISMATCH".red().bold() };
    format!("{} {}\n{}", report.target, verdict, checks(&report.checks))
}

pub fn fingerprint(fp: &EnvironmentFingerprint) -> String {
    let rows = vec![
        ("environment", fp.environment_id.clone()),
        ("type", fp.environment_type.clone()),
        ("version", fp.version.clone()),
        ("commit", fp.git_commit.clone().unwrap_or_else(|| "-".to_string())),
        ("branch", fp.git_branch.clone().unwrap_or_else(|| "-".to_string())),
        ("host", fp.hostname.clone().unwrap_or_else(|| "-".to_string())),
        ("platform", format!("{}/{}", fp.os, fp.arch)),
        ("operator auth", fp.operator_auth_enabled.to_string()),
        ("store configured", fp.store_configured.to_string()),
        ("captured", when(&fp.captured_at)),
    ];
    rows.into_iter()
        .map(|(label, value)| format!("{:<18}{}", label, value))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn comparison(comparison: &Comparison) -> String {
    if comparison.identical {
        return format!("{} and {} are {}", comparison.left, comparison.right, "identical".green());
    }
    let rows = comparison
        .differences
        .iter()
        .map(|difference| FieldRow {
            field: difference.field.clone(),
            left: difference.left.to_string(),
            right: difference.right.to_string(),
        })
        .collect();
    format!("{} vs {}\n{}", comparison.left, comparison.right, table(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_config::Category;

    #[test]
    fn empty_alert_list_has_a_message() {
        assert_eq!(alerts(&[]), "No alerts.");
    }

    #[test]
    fn alert_table_lists_each_alert() {
        let first = Alert::new(AlertSeverity::Critical, Category::Session, "Breaker open", "m", "rule:a");
        let second = Alert::new(AlertSeverity::Info, Category::Ui, "Slow page", "m", "rule:b");
        let rendered = alerts(&[first.clone(), second]);
        assert!(rendered.contains(&first.id));
        assert!(rendered.contains("Slow page"));
        assert!(rendered.contains("session"));
    }

    #[test]
    fn trends_without_samples() {
        let report = TrendReport {
            samples: 0,
            first: None,
            last: None,
            min: None,
            max: None,
            average: None,
            trend: Trend::Stable,
            category_deltas: Default::default(),
        };
        assert_eq!(trends(&report), "No health scores recorded yet.");
    }
}
