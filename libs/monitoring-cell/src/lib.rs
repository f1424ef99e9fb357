// =====================================================================================
// MONITORING CELL - METRICS, HEALTH SCORING, ALERTING & SCHEDULING
// =====================================================================================
//
// One tick runs Collector -> Health Score -> Alert Manager over the seven
// monitored categories. `MonitoringCore` owns every piece and is shared by
// handle with the operator HTTP API.
//
// =====================================================================================

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Alert, AlertChange, CategoryMetrics, CategoryReading, DashboardSnapshot, HealthScore, MetricSnapshot,
    MonitoringError, MonitoringStatus, ResolveOutcome, StartOutcome, TickReport, Trend,
};

pub use services::{
    AlertManagerService, AlertSink, CategoryProbe, HealthScoreCalculator, MetricsCollectorService, MonitoringCore,
    MonitoringScheduler, StaticProbe,
};

pub use router::create_monitoring_router;
