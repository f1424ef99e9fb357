// =====================================================================================
// MONITORING CORE - ONE INSTANCE PER PROCESS, SHARED BY HANDLE
// =====================================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use resilience_cell::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerSnapshot, CircuitState,
};
use session_cell::{ResilientSessionValidator, SessionStore, SESSION_STORE_BREAKER};
use shared_config::{AppConfig, Category, MonitoringConfig};
use shared_database::StoreClient;

use crate::models::{
    Alert, AlertChange, DashboardSnapshot, EventKind, EventLevel, EventQuery, ExportBundle, HealthScore,
    MetricSnapshot, MonitoringError, MonitoringEvent, MonitoringSession, MonitoringStatus, ResolveOutcome,
    StartOutcome, TestAlertRequest, TickReport, TickTrigger, TrendReport,
};
use crate::services::alerts::AlertManagerService;
use crate::services::dashboard::{self, DashboardInputs};
use crate::services::events::EventLog;
use crate::services::health::summarize_trends;
use crate::services::metrics::MetricsCollectorService;
use crate::services::pipeline::MonitoringPipeline;
use crate::services::probes::{
    ApiProbe, CategoryProbe, DatabaseProbe, IntegrationProbe, ProgressiveProbe, SessionProbe, SystemProbe,
    UiProbe,
};
use crate::services::recorder::{FeatureCounters, RequestRecorder};
use crate::services::scheduler::MonitoringScheduler;
use crate::services::sinks::{AlertSink, LogAlertSink, WebhookAlertSink};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_EVENT_LIMIT: usize = 100;

pub struct MonitoringCore {
    config: RwLock<MonitoringConfig>,
    pipeline: Arc<MonitoringPipeline>,
    scheduler: MonitoringScheduler,
    registry: CircuitBreakerRegistry,
    recorder: Arc<RequestRecorder>,
    ui_counters: Arc<FeatureCounters>,
    progressive_counters: Arc<FeatureCounters>,
    session_validator: Option<Arc<ResilientSessionValidator>>,
}

pub struct MonitoringCoreBuilder {
    config: MonitoringConfig,
    probes: Vec<Arc<dyn CategoryProbe>>,
    sinks: Vec<Arc<dyn AlertSink>>,
    registry: Option<CircuitBreakerRegistry>,
    session_validator: Option<Arc<ResilientSessionValidator>>,
    recorder: Arc<RequestRecorder>,
    ui_counters: Arc<FeatureCounters>,
    progressive_counters: Arc<FeatureCounters>,
    local_probes: bool,
}

impl MonitoringCoreBuilder {
    pub fn with_probe(mut self, probe: Arc<dyn CategoryProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_registry(mut self, registry: CircuitBreakerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Also registers the session probe reading this validator.
    pub fn with_session_validator(mut self, validator: Arc<ResilientSessionValidator>) -> Self {
        self.session_validator = Some(validator);
        self
    }

    /// Registers the API, UI and progressive probes fed by this core's own
    /// recorder and counters.
    pub fn with_local_probes(mut self) -> Self {
        self.local_probes = true;
        self
    }

    pub fn build(self) -> Result<Arc<MonitoringCore>, MonitoringError> {
        self.config.validate()?;

        let registry = self
            .registry
            .unwrap_or_else(|| CircuitBreakerRegistry::new(CircuitBreakerConfig::from(&self.config.circuit_breaker)));

        let mut probes: Vec<Arc<dyn CategoryProbe>> = Vec::new();
        if self.local_probes {
            probes.push(Arc::new(ApiProbe::new(self.recorder.clone())));
            probes.push(Arc::new(UiProbe::new(self.ui_counters.clone())));
            probes.push(Arc::new(ProgressiveProbe::new(self.progressive_counters.clone())));
        }
        if let Some(validator) = &self.session_validator {
            probes.push(Arc::new(SessionProbe::new(validator.counters(), validator.breaker().clone())));
        }
        // Explicit probes win over the built-in ones for the same category.
        probes.extend(self.probes);

        let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogAlertSink)];
        if let Some(url) = &self.config.alerts.webhook_url {
            let webhook = WebhookAlertSink::new(url.clone(), WEBHOOK_TIMEOUT)
                .map_err(|e| MonitoringError::Internal(e.to_string()))?;
            sinks.push(Arc::new(webhook));
        }
        sinks.extend(self.sinks);

        let events = Arc::new(EventLog::new(self.config.event_log_capacity));
        let collector = Arc::new(MetricsCollectorService::new(&self.config, probes));
        let alerts = Arc::new(AlertManagerService::new(&self.config.alerts));
        let pipeline = Arc::new(MonitoringPipeline::new(&self.config, collector, alerts, events.clone(), sinks));

        forward_breaker_events(&registry, events);

        info!(
            environment_id = %self.config.environment_id,
            probes = ?pipeline.collector().registered_categories(),
            "Monitoring core ready"
        );

        Ok(Arc::new(MonitoringCore {
            config: RwLock::new(self.config),
            scheduler: MonitoringScheduler::new(pipeline.clone()),
            pipeline,
            registry,
            recorder: self.recorder,
            ui_counters: self.ui_counters,
            progressive_counters: self.progressive_counters,
            session_validator: self.session_validator,
        }))
    }
}

/// Copies breaker transitions into the event log. Needs a running tokio
/// runtime; without one transitions are only traced.
fn forward_breaker_events(registry: &CircuitBreakerRegistry, events: Arc<EventLog>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return;
    };
    let mut transitions = registry.subscribe();
    runtime.spawn(async move {
        loop {
            match transitions.recv().await {
                Ok(transition) => {
                    let level = match transition.to {
                        CircuitState::Open => EventLevel::Warn,
                        CircuitState::HalfOpen => EventLevel::Debug,
                        CircuitState::Closed => EventLevel::Info,
                    };
                    let message = format!(
                        "{}: {} -> {} after {} failures",
                        transition.breaker, transition.from, transition.to, transition.failure_count
                    );
                    events.record(level, EventKind::BreakerTransition, message).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Breaker event forwarder lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

impl MonitoringCore {
    pub fn builder(config: MonitoringConfig) -> MonitoringCoreBuilder {
        MonitoringCoreBuilder {
            config,
            probes: Vec::new(),
            sinks: Vec::new(),
            registry: None,
            session_validator: None,
            recorder: Arc::new(RequestRecorder::new()),
            ui_counters: Arc::new(FeatureCounters::new()),
            progressive_counters: Arc::new(FeatureCounters::new()),
            local_probes: false,
        }
    }

    /// Production wiring: session store client, breaker-guarded validator
    /// and every built-in probe.
    pub async fn from_app_config(app: &AppConfig, config: MonitoringConfig) -> Result<Arc<Self>, MonitoringError> {
        config.validate()?;

        let registry = CircuitBreakerRegistry::new(CircuitBreakerConfig::from(&config.circuit_breaker));
        let store = Arc::new(StoreClient::new(app));
        let breaker = registry.get_or_create(SESSION_STORE_BREAKER).await;
        let validator = Arc::new(ResilientSessionValidator::new(
            store.clone() as Arc<dyn SessionStore>,
            breaker,
            &config.session,
        ));

        let system: Arc<dyn CategoryProbe> = Arc::new(SystemProbe::new());
        let database: Arc<dyn CategoryProbe> = Arc::new(DatabaseProbe::new(store));
        let integration: Arc<dyn CategoryProbe> =
            Arc::new(IntegrationProbe::new(config.integrations.clone(), config.probe_timeout()));

        Self::builder(config)
            .with_registry(registry)
            .with_session_validator(validator)
            .with_local_probes()
            .with_probe(system)
            .with_probe(database)
            .with_probe(integration)
            .build()
    }

    // =====================================================================================
    // SCHEDULER
    // =====================================================================================

    /// Starts the scheduler. A supplied configuration is validated first and
    /// applied only if the scheduler was stopped.
    #[instrument(skip_all)]
    pub async fn start_monitoring(&self, config: Option<MonitoringConfig>) -> Result<StartOutcome, MonitoringError> {
        if let Some(config) = &config {
            config.validate()?;
        }
        if self.scheduler.is_running().await {
            return Ok(self.scheduler.start(&self.config.read().await.intervals).await);
        }
        if let Some(config) = config {
            self.apply_config(config).await;
        }

        let intervals = self.config.read().await.intervals.clone();
        let outcome = self.scheduler.start(&intervals).await;
        if let StartOutcome::Started(session) = &outcome {
            self.pipeline
                .events()
                .record(EventLevel::Info, EventKind::SchedulerStarted, format!("session {} started", session.id))
                .await;
        }
        Ok(outcome)
    }

    #[instrument(skip_all)]
    pub async fn stop_monitoring(&self) -> Option<MonitoringSession> {
        let session = self.scheduler.stop().await?;
        self.pipeline
            .events()
            .record(
                EventLevel::Info,
                EventKind::SchedulerStopped,
                format!("session {} stopped after {} checks", session.id, session.checks_performed),
            )
            .await;
        Some(session)
    }

    pub async fn restart_monitoring(&self, config: Option<MonitoringConfig>) -> Result<StartOutcome, MonitoringError> {
        if let Some(config) = &config {
            config.validate()?;
        }
        self.stop_monitoring().await;
        self.start_monitoring(config).await
    }

    pub async fn status(&self) -> MonitoringStatus {
        let environment_id = self.config.read().await.environment_id.clone();
        let collector = self.pipeline.collector();
        MonitoringStatus {
            environment_id,
            scheduler: self.scheduler.status().await,
            alerts: self.pipeline.alerts().counts().await,
            snapshots_retained: collector.len().await,
            snapshot_capacity: collector.capacity().await,
            ticks_total: self.pipeline.ticks_total(),
            latest_score: self.pipeline.latest_score().await.map(|score| score.overall),
            last_tick_at: self.pipeline.last_tick_at().await,
        }
    }

    /// Best-effort view; parts with no data yet are empty.
    pub async fn dashboard(&self) -> DashboardSnapshot {
        dashboard::assemble(DashboardInputs {
            status: self.status().await,
            latest_snapshot: self.pipeline.collector().latest().await,
            active_alerts: self.pipeline.alerts().active().await,
            health_score: self.pipeline.latest_score().await,
            circuits: self.circuits().await,
        })
    }

    /// Runs one pass over every category outside the schedule.
    pub async fn trigger_health_check(&self) -> TickReport {
        self.pipeline.run(&Category::ALL, TickTrigger::Manual).await
    }

    // =====================================================================================
    // ALERTS
    // =====================================================================================

    /// Newest first.
    pub async fn alerts(&self, include_resolved: bool) -> Vec<Alert> {
        let alerts = self.pipeline.alerts();
        let mut list = if include_resolved {
            alerts.all().await
        } else {
            alerts.active().await
        };
        list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        list
    }

    pub async fn resolve_alert(&self, alert_id: &str) -> ResolveOutcome {
        let outcome = self.pipeline.alerts().resolve(alert_id, None).await;
        if let ResolveOutcome::Resolved(alert) = &outcome {
            let changes = vec![AlertChange::Resolved(alert.clone())];
            self.pipeline.record_alert_events(&changes).await;
            self.pipeline.dispatch(&changes).await;
        }
        outcome
    }

    pub async fn test_alert(&self, request: TestAlertRequest) -> Vec<AlertChange> {
        let changes = self.pipeline.alerts().test_alert(request).await;
        self.pipeline.record_alert_events(&changes).await;
        self.pipeline.dispatch(&changes).await;
        changes
    }

    // =====================================================================================
    // METRICS
    // =====================================================================================

    pub async fn latest_snapshot(&self) -> Option<Arc<MetricSnapshot>> {
        self.pipeline.collector().latest().await
    }

    pub async fn latest_score(&self) -> Option<Arc<HealthScore>> {
        self.pipeline.latest_score().await
    }

    pub async fn snapshot_history(&self, limit: Option<usize>) -> Vec<Arc<MetricSnapshot>> {
        self.pipeline.collector().history(limit).await
    }

    pub async fn trends(&self, limit: Option<usize>) -> TrendReport {
        let history: Vec<HealthScore> = self
            .pipeline
            .score_history(limit)
            .await
            .iter()
            .map(|score| score.as_ref().clone())
            .collect();
        summarize_trends(&history, self.pipeline.trend_epsilon().await)
    }

    // =====================================================================================
    // CONFIGURATION
    // =====================================================================================

    pub async fn config(&self) -> MonitoringConfig {
        self.config.read().await.clone()
    }

    /// Validates and applies `config` everywhere. A running scheduler is
    /// restarted when its intervals changed.
    #[instrument(skip_all)]
    pub async fn update_config(&self, config: MonitoringConfig) -> Result<MonitoringConfig, MonitoringError> {
        config.validate()?;
        let intervals_changed = self.config.read().await.intervals != config.intervals;

        self.apply_config(config.clone()).await;

        if intervals_changed && self.scheduler.is_running().await {
            info!("Sampling intervals changed, restarting scheduler");
            self.scheduler.restart(&config.intervals).await;
        }
        Ok(config)
    }

    pub async fn set_config_value(&self, key: &str, value: &str) -> Result<MonitoringConfig, MonitoringError> {
        let updated = self.config.read().await.with_value(key, value)?;
        self.update_config(updated).await
    }

    async fn apply_config(&self, config: MonitoringConfig) {
        let webhook_changed = self.config.read().await.alerts.webhook_url != config.alerts.webhook_url;

        let changes = self.pipeline.apply_config(&config).await;
        self.pipeline.dispatch(&changes).await;

        if webhook_changed {
            let webhook = config.alerts.webhook_url.as_ref().and_then(|url| {
                match WebhookAlertSink::new(url.clone(), WEBHOOK_TIMEOUT) {
                    Ok(sink) => Some(Arc::new(sink) as Arc<dyn AlertSink>),
                    Err(e) => {
                        warn!("Webhook sink not installed: {}", e);
                        None
                    }
                }
            });
            self.pipeline.replace_sink("webhook", webhook).await;
        }

        let environment_id = config.environment_id.clone();
        *self.config.write().await = config;
        self.pipeline
            .events()
            .record(
                EventLevel::Info,
                EventKind::ConfigUpdated,
                format!("configuration applied for environment {}", environment_id),
            )
            .await;
    }

    // =====================================================================================
    // READ MODELS
    // =====================================================================================

    pub async fn export(&self) -> ExportBundle {
        ExportBundle {
            exported_at: Utc::now(),
            config: self.config().await,
            status: self.status().await,
            snapshots: self.snapshot_history(None).await,
            health_scores: self.pipeline.score_history(None).await,
            alerts: self.alerts(true).await,
            circuits: self.circuits().await,
        }
    }

    pub async fn circuits(&self) -> Vec<CircuitBreakerSnapshot> {
        self.registry.snapshots().await
    }

    pub async fn events(&self, query: &EventQuery) -> Vec<MonitoringEvent> {
        let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
        let log = self.pipeline.events();
        match query.after {
            Some(seq) => log.after(seq, limit).await,
            None => log.recent(limit).await,
        }
    }

    // =====================================================================================
    // HANDLES
    // =====================================================================================

    pub fn registry(&self) -> &CircuitBreakerRegistry {
        &self.registry
    }

    pub fn recorder(&self) -> Arc<RequestRecorder> {
        self.recorder.clone()
    }

    pub fn ui_counters(&self) -> Arc<FeatureCounters> {
        self.ui_counters.clone()
    }

    pub fn progressive_counters(&self) -> Arc<FeatureCounters> {
        self.progressive_counters.clone()
    }

    pub fn session_validator(&self) -> Option<Arc<ResilientSessionValidator>> {
        self.session_validator.clone()
    }

    pub async fn sink_names(&self) -> Vec<String> {
        self.pipeline.sink_names().await
    }
}
