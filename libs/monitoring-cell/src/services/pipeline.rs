// =====================================================================================
// MONITORING PIPELINE - COLLECT, SCORE, ALERT
// =====================================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use shared_config::{Category, MonitoringConfig};

use crate::models::{
    AlertChange, EventKind, EventLevel, HealthScore, MetricSnapshot, ProbeStatus, TickReport, TickTrigger,
};
use crate::services::alerts::AlertManagerService;
use crate::services::events::EventLog;
use crate::services::health::HealthScoreCalculator;
use crate::services::metrics::MetricsCollectorService;
use crate::services::sinks::AlertSink;

/// One pass runs Collector -> Health Score -> Alert Manager. Passes never
/// overlap; sink delivery happens after the pass is released.
pub struct MonitoringPipeline {
    collector: Arc<MetricsCollectorService>,
    calculator: RwLock<HealthScoreCalculator>,
    alerts: Arc<AlertManagerService>,
    sinks: RwLock<Vec<Arc<dyn AlertSink>>>,
    events: Arc<EventLog>,
    scores: RwLock<VecDeque<Arc<HealthScore>>>,
    score_capacity: AtomicUsize,
    run_lock: Mutex<()>,
    ticks: AtomicU64,
    last_tick_at: RwLock<Option<DateTime<Utc>>>,
}

impl MonitoringPipeline {
    pub fn new(
        config: &MonitoringConfig,
        collector: Arc<MetricsCollectorService>,
        alerts: Arc<AlertManagerService>,
        events: Arc<EventLog>,
        sinks: Vec<Arc<dyn AlertSink>>,
    ) -> Self {
        Self {
            collector,
            calculator: RwLock::new(HealthScoreCalculator::new(config.scoring.clone())),
            alerts,
            sinks: RwLock::new(sinks),
            events,
            scores: RwLock::new(VecDeque::new()),
            score_capacity: AtomicUsize::new(config.snapshot_capacity),
            run_lock: Mutex::new(()),
            ticks: AtomicU64::new(0),
            last_tick_at: RwLock::new(None),
        }
    }

    pub fn collector(&self) -> &Arc<MetricsCollectorService> {
        &self.collector
    }

    pub fn alerts(&self) -> &Arc<AlertManagerService> {
        &self.alerts
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    #[instrument(skip(self, due), fields(due = due.len()))]
    pub async fn run(&self, due: &[Category], trigger: TickTrigger) -> TickReport {
        let report = {
            let _pass = self.run_lock.lock().await;

            let collection = self.collector.collect(due).await;
            let previous = self.collector.previous().await;
            let score = Arc::new(
                self.calculator
                    .read()
                    .await
                    .compute(&collection.snapshot, previous.as_deref()),
            );
            self.push_score(score.clone()).await;

            let changes = self.alerts.evaluate(&collection.snapshot, &score).await;

            self.ticks.fetch_add(1, Ordering::Relaxed);
            *self.last_tick_at.write().await = Some(collection.snapshot.timestamp);

            self.record_probe_events(&collection.snapshot, &collection.probed).await;
            self.record_alert_events(&changes).await;

            let (level, kind) = match trigger {
                TickTrigger::Scheduled => (EventLevel::Debug, EventKind::Tick),
                TickTrigger::Manual => (EventLevel::Info, EventKind::HealthCheck),
            };
            self.events
                .record(
                    level,
                    kind,
                    format!(
                        "snapshot {} scored {:.2} ({:?})",
                        collection.snapshot.sequence, score.overall, score.trend
                    ),
                )
                .await;

            TickReport {
                trigger,
                snapshot: collection.snapshot,
                score,
                changes,
            }
        };

        self.dispatch(&report.changes).await;
        report
    }

    /// Hands alert changes to every sink. A failing sink is logged and skipped.
    pub async fn dispatch(&self, changes: &[AlertChange]) {
        if changes.is_empty() {
            return;
        }
        let sinks = self.sinks.read().await.clone();
        for change in changes {
            for sink in &sinks {
                if let Err(e) = sink.deliver(change).await {
                    warn!(sink = sink.name(), alert_id = %change.alert().id, "Alert delivery failed: {}", e);
                    self.events
                        .record(
                            EventLevel::Warn,
                            EventKind::AlertDeliveryFailed,
                            format!("{} sink failed for alert {}: {}", sink.name(), change.alert().id, e),
                        )
                        .await;
                }
            }
        }
    }

    pub async fn apply_config(&self, config: &MonitoringConfig) -> Vec<AlertChange> {
        let _pass = self.run_lock.lock().await;

        *self.calculator.write().await = HealthScoreCalculator::new(config.scoring.clone());
        self.collector.apply_settings(config).await;
        self.events.set_capacity(config.event_log_capacity).await;

        self.score_capacity.store(config.snapshot_capacity, Ordering::Relaxed);
        {
            let mut scores = self.scores.write().await;
            while scores.len() > config.snapshot_capacity {
                scores.pop_front();
            }
        }

        let changes = self.alerts.apply_config(&config.alerts).await;
        self.record_alert_events(&changes).await;
        changes
    }

    /// Replaces the sink named `name`, or removes it when `sink` is `None`.
    pub async fn replace_sink(&self, name: &str, sink: Option<Arc<dyn AlertSink>>) {
        let mut sinks = self.sinks.write().await;
        sinks.retain(|existing| existing.name() != name);
        if let Some(sink) = sink {
            sinks.push(sink);
        }
    }

    pub async fn sink_names(&self) -> Vec<String> {
        self.sinks.read().await.iter().map(|s| s.name().to_string()).collect()
    }

    pub async fn latest_score(&self) -> Option<Arc<HealthScore>> {
        self.scores.read().await.back().cloned()
    }

    /// Oldest first.
    pub async fn score_history(&self, limit: Option<usize>) -> Vec<Arc<HealthScore>> {
        let scores = self.scores.read().await;
        let skip = limit.map_or(0, |limit| scores.len().saturating_sub(limit));
        scores.iter().skip(skip).cloned().collect()
    }

    pub async fn trend_epsilon(&self) -> f64 {
        self.calculator.read().await.scoring().trend_epsilon
    }

    pub fn ticks_total(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub async fn last_tick_at(&self) -> Option<DateTime<Utc>> {
        *self.last_tick_at.read().await
    }

    async fn push_score(&self, score: Arc<HealthScore>) {
        let capacity = self.score_capacity.load(Ordering::Relaxed);
        let mut scores = self.scores.write().await;
        scores.push_back(score);
        while scores.len() > capacity {
            scores.pop_front();
        }
    }

    async fn record_probe_events(&self, snapshot: &MetricSnapshot, probed: &[Category]) {
        for category in probed {
            let Some(reading) = snapshot.reading(*category) else {
                continue;
            };
            let kind = match reading.status {
                ProbeStatus::TimedOut => EventKind::ProbeTimeout,
                ProbeStatus::Failed => EventKind::ProbeFailure,
                ProbeStatus::Ok | ProbeStatus::Unavailable => continue,
            };
            let message = format!(
                "{} probe: {}",
                category,
                reading.error.as_deref().unwrap_or("no detail")
            );
            self.events.record(EventLevel::Warn, kind, message).await;
        }
    }

    pub async fn record_alert_events(&self, changes: &[AlertChange]) {
        for change in changes {
            let alert = change.alert();
            let (level, kind) = match change {
                AlertChange::Created(_) => (EventLevel::Warn, EventKind::AlertCreated),
                AlertChange::Resolved(_) => (EventLevel::Info, EventKind::AlertResolved),
                AlertChange::Updated(_) => continue,
            };
            self.events
                .record(level, kind, format!("[{}] {} ({})", alert.severity, alert.title, alert.id))
                .await;
        }
        debug!(changes = changes.len(), "Recorded alert events");
    }
}
