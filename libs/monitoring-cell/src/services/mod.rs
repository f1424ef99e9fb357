pub mod alerts;
pub mod core;
pub mod dashboard;
pub mod events;
pub mod health;
pub mod metrics;
pub mod pipeline;
pub mod probes;
pub mod recorder;
pub mod scheduler;
pub mod sinks;

pub use alerts::{read_metric, AlertManagerService};
pub use self::core::{MonitoringCore, MonitoringCoreBuilder};
pub use events::EventLog;
pub use health::HealthScoreCalculator;
pub use metrics::{Collection, MetricsCollectorService};
pub use pipeline::MonitoringPipeline;
pub use probes::{CategoryProbe, IntegrationProbe, ProbeError, StaticProbe};
pub use recorder::{FeatureCounters, RequestRecorder, RequestTotals};
pub use scheduler::MonitoringScheduler;
pub use sinks::{AlertSink, LogAlertSink, SinkError, WebhookAlertSink};
