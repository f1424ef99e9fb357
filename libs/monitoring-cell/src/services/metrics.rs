// =====================================================================================
// METRICS COLLECTOR SERVICE
// =====================================================================================

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use shared_config::{Category, MonitoringConfig};

use crate::models::{CategoryReading, MetricSnapshot, ProbeStatus};
use crate::services::probes::CategoryProbe;

#[derive(Debug, Clone)]
struct CollectorSettings {
    environment_id: String,
    probe_timeout: Duration,
    capacity: usize,
}

/// Output of one collection: the snapshot plus which categories were probed
/// (the rest carry their previous reading).
#[derive(Debug, Clone)]
pub struct Collection {
    pub snapshot: Arc<MetricSnapshot>,
    pub probed: Vec<Category>,
}

pub struct MetricsCollectorService {
    probes: BTreeMap<Category, Arc<dyn CategoryProbe>>,
    settings: RwLock<CollectorSettings>,
    history: RwLock<VecDeque<Arc<MetricSnapshot>>>,
}

impl MetricsCollectorService {
    pub fn new(config: &MonitoringConfig, probes: Vec<Arc<dyn CategoryProbe>>) -> Self {
        let mut registered = BTreeMap::new();
        for probe in probes {
            if registered.insert(probe.category(), probe).is_some() {
                warn!("Replacing duplicate probe registration");
            }
        }

        Self {
            probes: registered,
            settings: RwLock::new(CollectorSettings {
                environment_id: config.environment_id.clone(),
                probe_timeout: config.probe_timeout(),
                capacity: config.snapshot_capacity,
            }),
            history: RwLock::new(VecDeque::with_capacity(config.snapshot_capacity)),
        }
    }

    pub fn registered_categories(&self) -> Vec<Category> {
        self.probes.keys().copied().collect()
    }

    pub async fn apply_settings(&self, config: &MonitoringConfig) {
        let capacity = {
            let mut settings = self.settings.write().await;
            settings.environment_id = config.environment_id.clone();
            settings.probe_timeout = config.probe_timeout();
            settings.capacity = config.snapshot_capacity;
            settings.capacity
        };

        for probe in self.probes.values() {
            probe.reconfigure(config);
        }

        let mut history = self.history.write().await;
        while history.len() > capacity {
            history.pop_front();
        }
    }

    /// Probes the `due` categories concurrently and appends the snapshot.
    /// Categories not due keep their previous reading.
    #[instrument(skip(self))]
    pub async fn collect(&self, due: &[Category]) -> Collection {
        let settings = self.settings.read().await.clone();
        let previous = self.latest().await;

        let to_probe: Vec<(Category, Arc<dyn CategoryProbe>)> = Category::ALL
            .iter()
            .copied()
            .filter(|category| {
                due.contains(category)
                    || previous
                        .as_ref()
                        .map_or(true, |snapshot| snapshot.reading(*category).is_none())
            })
            .filter_map(|category| self.probes.get(&category).map(|probe| (category, probe.clone())))
            .collect();

        let results = join_all(
            to_probe
                .iter()
                .map(|(category, probe)| run_probe(*category, probe.clone(), settings.probe_timeout)),
        )
        .await;

        let mut categories: BTreeMap<Category, CategoryReading> = results.into_iter().collect();
        let probed: Vec<Category> = categories.keys().copied().collect();

        for category in Category::ALL {
            if categories.contains_key(&category) {
                continue;
            }
            let carried = previous.as_ref().and_then(|snapshot| snapshot.reading(category).cloned());
            let reading = carried.unwrap_or_else(|| {
                CategoryReading::degraded(ProbeStatus::Unavailable, "no probe registered", Utc::now(), 0)
            });
            categories.insert(category, reading);
        }

        let now = Utc::now();
        let (sequence, timestamp) = match &previous {
            Some(prev) => {
                let floor = prev.timestamp + chrono::Duration::microseconds(1);
                (prev.sequence + 1, now.max(floor))
            }
            None => (1, now),
        };

        let snapshot = Arc::new(MetricSnapshot {
            sequence,
            timestamp,
            environment_id: settings.environment_id,
            categories,
        });

        {
            let mut history = self.history.write().await;
            history.push_back(snapshot.clone());
            while history.len() > settings.capacity {
                history.pop_front();
            }
        }

        debug!(sequence, probed = probed.len(), "Collected metric snapshot");
        Collection { snapshot, probed }
    }

    pub async fn latest(&self) -> Option<Arc<MetricSnapshot>> {
        self.history.read().await.back().cloned()
    }

    /// The snapshot before the latest one.
    pub async fn previous(&self) -> Option<Arc<MetricSnapshot>> {
        let history = self.history.read().await;
        let len = history.len();
        if len < 2 {
            return None;
        }
        history.get(len - 2).cloned()
    }

    /// Oldest first; at most `limit` of the newest snapshots when given.
    pub async fn history(&self, limit: Option<usize>) -> Vec<Arc<MetricSnapshot>> {
        let history = self.history.read().await;
        let skip = limit.map_or(0, |limit| history.len().saturating_sub(limit));
        history.iter().skip(skip).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.history.read().await.len()
    }

    pub async fn capacity(&self) -> usize {
        self.settings.read().await.capacity
    }
}

async fn run_probe(
    category: Category,
    probe: Arc<dyn CategoryProbe>,
    timeout: Duration,
) -> (Category, CategoryReading) {
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, probe.probe()).await;
    let latency_ms = started.elapsed().as_millis() as u64;
    let observed_at = Utc::now();

    let reading = match outcome {
        Ok(Ok(metrics)) if metrics.category() == category => CategoryReading::ok(metrics, observed_at, latency_ms),
        Ok(Ok(metrics)) => CategoryReading::degraded(
            ProbeStatus::Failed,
            format!("probe returned {} metrics", metrics.category()),
            observed_at,
            latency_ms,
        ),
        Ok(Err(e)) => {
            debug!(%category, "Probe failed: {}", e);
            CategoryReading::degraded(ProbeStatus::Failed, e.to_string(), observed_at, latency_ms)
        }
        Err(_) => {
            warn!(%category, timeout_ms = timeout.as_millis() as u64, "Probe timed out");
            CategoryReading::degraded(
                ProbeStatus::TimedOut,
                format!("timed out after {} ms", timeout.as_millis()),
                observed_at,
                latency_ms,
            )
        }
    };

    (category, reading)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiMetrics, CategoryMetrics, UiMetrics};
    use crate::services::probes::StaticProbe;

    fn config(capacity: usize) -> MonitoringConfig {
        MonitoringConfig {
            snapshot_capacity: capacity,
            probe_timeout_ms: 100,
            ..MonitoringConfig::default()
        }
    }

    #[tokio::test]
    async fn ring_buffer_is_bounded_and_timestamps_increase() {
        let probe: Arc<dyn CategoryProbe> = Arc::new(StaticProbe::new(CategoryMetrics::Api(ApiMetrics::default())));
        let collector = MetricsCollectorService::new(&config(3), vec![probe]);

        for _ in 0..10 {
            collector.collect(&Category::ALL).await;
            assert!(collector.len().await <= 3);
        }

        let history = collector.history(None).await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].sequence, 8);
        for pair in history.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
            assert!(pair[0].sequence < pair[1].sequence);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probe_times_out_without_failing_collection() {
        let slow: Arc<dyn CategoryProbe> = Arc::new(
            StaticProbe::new(CategoryMetrics::Ui(UiMetrics::default())).with_delay(Duration::from_secs(30)),
        );
        let fast: Arc<dyn CategoryProbe> = Arc::new(StaticProbe::new(CategoryMetrics::Api(ApiMetrics::default())));
        let collector = MetricsCollectorService::new(&config(5), vec![slow, fast]);

        let collection = collector.collect(&Category::ALL).await;
        let snapshot = collection.snapshot;

        assert_eq!(snapshot.reading(Category::Ui).unwrap().status, ProbeStatus::TimedOut);
        assert!(snapshot.api().is_some());
        assert_eq!(snapshot.reading(Category::System).unwrap().status, ProbeStatus::Unavailable);
        assert_eq!(collection.probed, vec![Category::Api, Category::Ui]);
    }

    #[tokio::test]
    async fn categories_not_due_carry_previous_reading() {
        let api = Arc::new(StaticProbe::new(CategoryMetrics::Api(ApiMetrics::default())));
        let collector = MetricsCollectorService::new(&config(5), vec![api.clone() as Arc<dyn CategoryProbe>]);

        let first = collector.collect(&[Category::Api]).await.snapshot;
        api.set(Ok(CategoryMetrics::Api(ApiMetrics {
            total_requests: 9,
            ..ApiMetrics::default()
        })));

        let second = collector.collect(&[Category::Ui]).await;
        assert!(second.probed.is_empty());
        assert_eq!(second.snapshot.reading(Category::Api), first.reading(Category::Api));

        let third = collector.collect(&[Category::Api]).await.snapshot;
        assert_eq!(third.api().unwrap().total_requests, 9);
        assert_eq!(collector.previous().await.unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn shrinking_capacity_evicts_oldest() {
        let collector = MetricsCollectorService::new(&config(10), Vec::new());
        for _ in 0..6 {
            collector.collect(&Category::ALL).await;
        }
        collector.apply_settings(&config(2)).await;
        let history = collector.history(None).await;
        assert_eq!(history.iter().map(|s| s.sequence).collect::<Vec<_>>(), vec![5, 6]);
        assert_eq!(collector.history(Some(1)).await[0].sequence, 6);
    }
}
