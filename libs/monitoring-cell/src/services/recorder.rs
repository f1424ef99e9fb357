// =====================================================================================
// REQUEST RECORDER & FEATURE COUNTERS
// =====================================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::models::{ApiMetrics, FeatureEvent, ProgressiveMetrics, UiMetrics};

const RECENT_LATENCY_LIMIT: usize = 1000;

#[derive(Debug, Default)]
struct RequestWindow {
    total: u64,
    failed: u64,
    latency_total_ms: u64,
    latencies: Vec<u64>,
    endpoints: HashMap<String, (u64, u64)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RequestTotals {
    pub requests: u64,
    pub errors: u64,
    pub average_latency_ms: f64,
}

/// Per-request accounting for the API category. The window is drained on
/// every collection; lifetime totals stay.
#[derive(Debug, Default)]
pub struct RequestRecorder {
    request_count: AtomicU64,
    error_count: AtomicU64,
    total_response_time_ms: AtomicU64,
    window: RwLock<RequestWindow>,
    recent: RwLock<Vec<u64>>,
}

impl RequestRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self))]
    pub async fn record_request(&self, endpoint: &str, response_time_ms: u64, is_error: bool) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_ms.fetch_add(response_time_ms, Ordering::Relaxed);
        if is_error {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }

        {
            let mut window = self.window.write().await;
            window.total += 1;
            window.latency_total_ms += response_time_ms;
            if is_error {
                window.failed += 1;
            }
            window.latencies.push(response_time_ms);
            let entry = window.endpoints.entry(endpoint.to_string()).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += response_time_ms;
        }

        let mut times = self.recent.write().await;
        times.push(response_time_ms);
        if times.len() > RECENT_LATENCY_LIMIT {
            times.drain(0..RECENT_LATENCY_LIMIT / 2);
        }
    }

    /// Drains the current window into API metrics.
    pub async fn take_window(&self) -> ApiMetrics {
        let window = std::mem::take(&mut *self.window.write().await);

        let error_rate = if window.total > 0 {
            window.failed as f64 / window.total as f64 * 100.0
        } else {
            0.0
        };
        let average_latency_ms = if window.total > 0 {
            window.latency_total_ms as f64 / window.total as f64
        } else {
            0.0
        };

        let slowest_endpoint = window
            .endpoints
            .iter()
            .map(|(endpoint, (count, total))| (endpoint, *total as f64 / (*count).max(1) as f64))
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(endpoint, _)| endpoint.clone());

        ApiMetrics {
            total_requests: window.total,
            successful_requests: window.total - window.failed,
            failed_requests: window.failed,
            error_rate,
            average_latency_ms,
            p95_latency_ms: percentile(window.latencies, 0.95),
            slowest_endpoint,
        }
    }

    pub fn totals(&self) -> RequestTotals {
        let requests = self.request_count.load(Ordering::Relaxed);
        let total_time = self.total_response_time_ms.load(Ordering::Relaxed);
        RequestTotals {
            requests,
            errors: self.error_count.load(Ordering::Relaxed),
            average_latency_ms: if requests > 0 {
                total_time as f64 / requests as f64
            } else {
                0.0
            },
        }
    }

    pub async fn get_recent_response_times(&self, count: usize) -> Vec<u64> {
        let times = self.recent.read().await;
        times.iter().rev().take(count).copied().collect()
    }
}

fn percentile(mut values: Vec<u64>, quantile: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable();
    let index = ((values.len() as f64 * quantile) as usize).min(values.len() - 1);
    values[index] as f64
}

/// Event counters for client-side feature categories (UI, progressive features).
#[derive(Debug, Default)]
pub struct FeatureCounters {
    events: AtomicU64,
    failures: AtomicU64,
    duration_total_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureWindow {
    pub events: u64,
    pub failures: u64,
    pub average_ms: f64,
}

impl FeatureWindow {
    pub fn failure_rate(&self) -> f64 {
        if self.events == 0 {
            0.0
        } else {
            self.failures as f64 / self.events as f64 * 100.0
        }
    }
}

impl FeatureCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: FeatureEvent) {
        self.events.fetch_add(1, Ordering::Relaxed);
        self.duration_total_ms.fetch_add(event.duration_ms, Ordering::Relaxed);
        if event.failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn take_window(&self) -> FeatureWindow {
        let events = self.events.swap(0, Ordering::Relaxed);
        let failures = self.failures.swap(0, Ordering::Relaxed);
        let duration = self.duration_total_ms.swap(0, Ordering::Relaxed);
        FeatureWindow {
            events,
            failures: failures.min(events),
            average_ms: if events > 0 { duration as f64 / events as f64 } else { 0.0 },
        }
    }

    pub fn take_ui_metrics(&self) -> UiMetrics {
        let window = self.take_window();
        UiMetrics {
            page_views: window.events,
            client_errors: window.failures,
            client_error_rate: window.failure_rate(),
            average_render_ms: window.average_ms,
        }
    }

    pub fn take_progressive_metrics(&self) -> ProgressiveMetrics {
        let window = self.take_window();
        ProgressiveMetrics {
            feature_loads: window.events,
            load_failures: window.failures,
            failure_rate: window.failure_rate(),
            average_load_ms: window.average_ms,
        }
    }
}
