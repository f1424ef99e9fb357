use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use shared_config::CircuitBreakerSettings;

use crate::error::{CircuitBreakerError, CircuitOpenError};
use crate::models::{BreakerTransition, CircuitBreakerSnapshot, CircuitState};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub call_timeout: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&CircuitBreakerSettings::default())
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            base_backoff: Duration::from_millis(settings.base_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms.max(settings.base_backoff_ms)),
            call_timeout: (settings.call_timeout_ms > 0).then(|| Duration::from_millis(settings.call_timeout_ms)),
        }
    }
}

impl CircuitBreakerConfig {
    /// Open duration after the `trips`-th consecutive opening.
    pub fn backoff_for(&self, trips: u32) -> Duration {
        let exponent = trips.saturating_sub(1).min(31);
        self.base_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    /// Consecutive openings since the breaker last closed.
    trips: u32,
    trial_in_flight: bool,
    last_failure_time: Option<DateTime<Utc>>,
    retry_at: Option<Instant>,
    next_retry_time: Option<DateTime<Utc>>,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            trips: 0,
            trial_in_flight: false,
            last_failure_time: None,
            retry_at: None,
            next_retry_time: None,
        }
    }
}

/// Per-dependency failure tracker. Clones share state.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
    total_calls: Arc<AtomicU64>,
    rejected_calls: Arc<AtomicU64>,
    events: broadcast::Sender<BreakerTransition>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: CircuitBreakerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self::with_events(name, config, events)
    }

    pub(crate) fn with_events(
        name: &str,
        config: CircuitBreakerConfig,
        events: broadcast::Sender<BreakerTransition>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            config,
            inner: Arc::new(Mutex::new(BreakerInner::new())),
            total_calls: Arc::new(AtomicU64::new(0)),
            rejected_calls: Arc::new(AtomicU64::new(0)),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BreakerTransition> {
        self.events.subscribe()
    }

    /// Current state without side effects. An open breaker whose backoff has
    /// elapsed still reports `Open` until a call admits the trial.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.lock();
        CircuitBreakerSnapshot {
            name: self.name.to_string(),
            state: inner.state,
            failure_count: inner.failure_count,
            failure_threshold: self.config.failure_threshold,
            last_failure_time: inner.last_failure_time,
            next_retry_time: inner.next_retry_time,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
        }
    }

    /// Runs `operation` through the breaker. The operation is not invoked
    /// at all when the breaker refuses the call.
    #[instrument(skip(self, operation), fields(breaker = %self.name))]
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let permit = match self.acquire() {
            Ok(permit) => permit,
            Err(open) => {
                self.rejected_calls.fetch_add(1, Ordering::Relaxed);
                debug!("Rejected call: {}", open);
                return Err(CircuitBreakerError::CircuitOpen(open));
            }
        };

        let outcome = match self.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, operation()).await.ok(),
            None => Some(operation().await),
        };

        match outcome {
            Some(Ok(value)) => {
                permit.succeed();
                Ok(value)
            }
            Some(Err(error)) => {
                permit.fail();
                Err(CircuitBreakerError::OperationFailed(error))
            }
            None => {
                permit.fail();
                Err(CircuitBreakerError::Timeout)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn acquire(&self) -> Result<Permit<'_>, CircuitOpenError> {
        let mut inner = self.lock();
        let state = inner.state;
        match state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open => {
                let due = inner.retry_at.map_or(true, |at| Instant::now() >= at);
                if !due {
                    return Err(self.open_error(&inner));
                }
                let transition = self.transition(&mut inner, CircuitState::HalfOpen);
                inner.trial_in_flight = true;
                drop(inner);
                debug!(breaker = %self.name, "Backoff elapsed, admitting trial call");
                self.publish(transition);
                Ok(Permit::new(self, true))
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    let mut error = self.open_error(&inner);
                    error.retry_at = None;
                    return Err(error);
                }
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
        }
    }

    fn open_error(&self, inner: &BreakerInner) -> CircuitOpenError {
        CircuitOpenError {
            breaker: self.name.to_string(),
            failure_count: inner.failure_count,
            retry_at: inner.next_retry_time,
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        if trial {
            inner.trial_in_flight = false;
        }
        let state = inner.state;
        match state {
            CircuitState::HalfOpen if trial => {
                inner.failure_count = 0;
                inner.trips = 0;
                inner.retry_at = None;
                inner.next_retry_time = None;
                let transition = self.transition(&mut inner, CircuitState::Closed);
                drop(inner);
                info!(breaker = %self.name, "Circuit breaker closed after successful trial");
                self.publish(transition);
            }
            CircuitState::Closed => inner.failure_count = 0,
            // Late success from a call admitted before the breaker opened.
            _ => {}
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        if trial {
            inner.trial_in_flight = false;
        }
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_time = Some(Utc::now());

        let should_open = match inner.state {
            CircuitState::Closed => inner.failure_count >= self.config.failure_threshold,
            CircuitState::HalfOpen => trial,
            CircuitState::Open => false,
        };
        if !should_open {
            return;
        }

        inner.trips = inner.trips.saturating_add(1);
        let backoff = self.config.backoff_for(inner.trips);
        inner.retry_at = Some(Instant::now() + backoff);
        inner.next_retry_time = chrono::Duration::from_std(backoff)
            .ok()
            .map(|delta| Utc::now() + delta);
        let failure_count = inner.failure_count;
        let transition = self.transition(&mut inner, CircuitState::Open);
        drop(inner);

        warn!(
            breaker = %self.name,
            failure_count,
            backoff_ms = backoff.as_millis() as u64,
            "Circuit breaker opened"
        );
        self.publish(transition);
    }

    fn on_abandoned(&self) {
        // Trial dropped before completing: the next caller becomes the trial.
        self.lock().trial_in_flight = false;
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) -> BreakerTransition {
        let from = inner.state;
        inner.state = to;
        BreakerTransition {
            breaker: self.name.to_string(),
            from,
            to,
            failure_count: inner.failure_count,
            at: Utc::now(),
            next_retry_time: inner.next_retry_time,
        }
    }

    fn publish(&self, transition: BreakerTransition) {
        // No subscribers is fine
        let _ = self.events.send(transition);
    }
}

/// Admission ticket for one call. Dropping an unsettled trial permit frees
/// the half-open slot.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.on_abandoned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicUsize;

    fn config(threshold: u32, base_ms: u64, max_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            base_backoff: Duration::from_millis(base_ms),
            max_backoff: Duration::from_millis(max_ms),
            call_timeout: None,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), CircuitBreakerError<&'static str>> {
        breaker.call(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), CircuitBreakerError<&'static str>> {
        breaker.call(|| async { Ok::<(), &'static str>(()) }).await
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = config(1, 1_000, 5_000);
        assert_eq!(config.backoff_for(1), Duration::from_millis(1_000));
        assert_eq!(config.backoff_for(2), Duration::from_millis(2_000));
        assert_eq!(config.backoff_for(3), Duration::from_millis(4_000));
        assert_eq!(config.backoff_for(4), Duration::from_millis(5_000));
        assert_eq!(config.backoff_for(40), Duration::from_millis(5_000));
    }

    #[test]
    fn settings_convert_with_disabled_timeout() {
        let settings = CircuitBreakerSettings {
            call_timeout_ms: 0,
            ..CircuitBreakerSettings::default()
        };
        let config = CircuitBreakerConfig::from(&settings);
        assert!(config.call_timeout.is_none());
        assert_eq!(config.failure_threshold, 5);
    }

    #[tokio::test]
    async fn success_resets_failure_count_while_closed() {
        let breaker = CircuitBreaker::new("dep", config(3, 1_000, 10_000));
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.snapshot().failure_count, 2);

        succeed(&breaker).await.unwrap();
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_fails_fast_without_invoking_operation() {
        let breaker = CircuitBreaker::new("dep", config(2, 1_000, 10_000));
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = invoked.clone();
        let result = breaker
            .call(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), &'static str>(())
            })
            .await;

        assert_matches!(result, Err(CircuitBreakerError::CircuitOpen(ref e)) if e.failure_count == 2);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.snapshot().rejected_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_with_longer_backoff() {
        let breaker = CircuitBreaker::new("dep", config(1, 1_000, 10_000));
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert_matches!(fail(&breaker).await, Err(CircuitBreakerError::OperationFailed("boom")));
        assert_eq!(breaker.state(), CircuitState::Open);

        // Second trip waits 2s, so 1s later the breaker still refuses.
        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert_matches!(succeed(&breaker).await, Err(CircuitBreakerError::CircuitOpen(_)));

        tokio::time::advance(Duration::from_millis(1_000)).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failure() {
        let mut cfg = config(1, 1_000, 1_000);
        cfg.call_timeout = Some(Duration::from_millis(50));
        let breaker = CircuitBreaker::new("slow", cfg);

        let result = breaker
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), &'static str>(())
            })
            .await;

        assert_matches!(result, Err(CircuitBreakerError::Timeout));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn transitions_are_published() {
        let breaker = CircuitBreaker::new("dep", config(1, 500, 500));
        let mut events = breaker.subscribe();

        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(500)).await;
        succeed(&breaker).await.unwrap();

        let opened = events.recv().await.unwrap();
        assert_eq!((opened.from, opened.to), (CircuitState::Closed, CircuitState::Open));
        let half_open = events.recv().await.unwrap();
        assert_eq!(half_open.to, CircuitState::HalfOpen);
        let closed = events.recv().await.unwrap();
        assert_eq!((closed.from, closed.to), (CircuitState::HalfOpen, CircuitState::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_trial_frees_the_half_open_slot() {
        let breaker = CircuitBreaker::new("dep", config(1, 100, 100));
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(100)).await;

        {
            let trial = breaker.call(|| std::future::pending::<Result<(), &'static str>>());
            // Poll once so the permit is taken, then drop the future.
            let _ = tokio::time::timeout(Duration::from_millis(1), trial).await;
        }
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
