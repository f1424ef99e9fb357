// =====================================================================================
// MONITORING SCHEDULER
// =====================================================================================

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, instrument};
use uuid::Uuid;

use shared_config::{Category, CategoryIntervals};

use crate::models::{MonitoringSession, SchedulerStatus, StartOutcome, TickTrigger};
use crate::services::pipeline::MonitoringPipeline;

struct RunningLoop {
    id: Uuid,
    start_time: DateTime<Utc>,
    intervals: BTreeMap<Category, u64>,
    checks: Arc<AtomicU64>,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RunningLoop {
    fn session(&self) -> MonitoringSession {
        MonitoringSession {
            id: self.id,
            start_time: self.start_time,
            active_intervals: self.intervals.clone(),
            checks_performed: self.checks.load(Ordering::Relaxed),
        }
    }
}

/// Drives the pipeline on per-category intervals. At most one loop runs.
pub struct MonitoringScheduler {
    pipeline: Arc<MonitoringPipeline>,
    state: Mutex<Option<RunningLoop>>,
}

impl MonitoringScheduler {
    pub fn new(pipeline: Arc<MonitoringPipeline>) -> Self {
        Self {
            pipeline,
            state: Mutex::new(None),
        }
    }

    /// Starts the loop. Calling it while running returns the current session.
    #[instrument(skip_all)]
    pub async fn start(&self, intervals: &CategoryIntervals) -> StartOutcome {
        let mut state = self.state.lock().await;
        if let Some(running) = state.as_ref() {
            return StartOutcome::AlreadyRunning(running.session());
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let checks = Arc::new(AtomicU64::new(0));
        let schedule: BTreeMap<Category, Duration> =
            Category::ALL.iter().map(|c| (*c, intervals.duration(*c))).collect();

        let handle = tokio::spawn(run_loop(self.pipeline.clone(), schedule, stop_rx, checks.clone()));

        let running = RunningLoop {
            id: Uuid::new_v4(),
            start_time: Utc::now(),
            intervals: intervals.as_map(),
            checks,
            stop_tx,
            handle,
        };
        let session = running.session();
        info!(session_id = %session.id, "Monitoring scheduler started");
        *state = Some(running);
        StartOutcome::Started(session)
    }

    /// Stops the loop and waits for any in-flight pass to finish.
    /// Returns `None` when nothing was running.
    #[instrument(skip_all)]
    pub async fn stop(&self) -> Option<MonitoringSession> {
        let mut state = self.state.lock().await;
        let running = state.take()?;

        let _ = running.stop_tx.send(true);
        let session_id = running.id;
        let checks = running.checks.clone();
        let mut session = running.session();

        if let Err(e) = running.handle.await {
            error!(%session_id, "Monitoring loop ended abnormally: {}", e);
        }
        session.checks_performed = checks.load(Ordering::Relaxed);

        info!(%session_id, checks = session.checks_performed, "Monitoring scheduler stopped");
        Some(session)
    }

    pub async fn restart(&self, intervals: &CategoryIntervals) -> StartOutcome {
        self.stop().await;
        self.start(intervals).await
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.state.lock().await;
        match state.as_ref() {
            Some(running) => {
                let session = running.session();
                SchedulerStatus {
                    running: true,
                    uptime_seconds: (Utc::now() - session.start_time).num_seconds().max(0) as u64,
                    active_intervals: session.active_intervals.clone(),
                    session: Some(session),
                }
            }
            None => SchedulerStatus {
                running: false,
                session: None,
                uptime_seconds: 0,
                active_intervals: BTreeMap::new(),
            },
        }
    }
}

async fn run_loop(
    pipeline: Arc<MonitoringPipeline>,
    schedule: BTreeMap<Category, Duration>,
    mut stop_rx: watch::Receiver<bool>,
    checks: Arc<AtomicU64>,
) {
    let started = Instant::now();
    let mut next_due: BTreeMap<Category, Instant> = schedule.keys().map(|c| (*c, started)).collect();

    loop {
        if *stop_rx.borrow() {
            break;
        }

        let now = Instant::now();
        let due: Vec<Category> = next_due
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(category, _)| *category)
            .collect();

        if !due.is_empty() {
            pipeline.run(&due, TickTrigger::Scheduled).await;
            checks.fetch_add(1, Ordering::Relaxed);

            let finished = Instant::now();
            for category in &due {
                if let Some(interval) = schedule.get(category) {
                    next_due.insert(*category, finished + *interval);
                }
            }
            continue;
        }

        let Some(wake_at) = next_due.values().min().copied() else {
            break;
        };

        tokio::select! {
            _ = tokio::time::sleep_until(wake_at) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
