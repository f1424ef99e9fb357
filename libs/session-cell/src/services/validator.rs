use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::HeaderValue;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use resilience_cell::{CircuitBreaker, CircuitBreakerError, CircuitState};
use shared_config::SessionSettings;
use shared_models::{Principal, SessionRecord};

use crate::error::SessionError;
use crate::models::{SessionOutcome, SessionOutcomeWindow};
use crate::services::store::SessionStore;

pub const SESSION_STORE_BREAKER: &str = "session-store";

const MAX_REFRESH_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// A token that cannot travel in an `Authorization` header is the caller's
/// fault and must not count against the store breaker.
fn is_transmittable(token: &str) -> bool {
    HeaderValue::from_str(&format!("Bearer {}", token)).is_ok()
}

#[derive(Debug, Default)]
struct OutcomeCells {
    successes: AtomicU64,
    invalid: AtomicU64,
    store_errors: AtomicU64,
    breaker_rejections: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
}

impl OutcomeCells {
    fn read(&self, take: bool) -> SessionOutcomeWindow {
        let load = |cell: &AtomicU64| {
            if take {
                cell.swap(0, Ordering::SeqCst)
            } else {
                cell.load(Ordering::SeqCst)
            }
        };
        SessionOutcomeWindow {
            successes: load(&self.successes),
            invalid: load(&self.invalid),
            store_errors: load(&self.store_errors),
            breaker_rejections: load(&self.breaker_rejections),
            refreshes: load(&self.refreshes),
            refresh_failures: load(&self.refresh_failures),
        }
    }
}

/// Outcome counters read by the session probe. The window is drained once
/// per collection; totals cover the process lifetime.
#[derive(Debug, Default)]
pub struct SessionOutcomeCounters {
    window: OutcomeCells,
    totals: OutcomeCells,
}

impl SessionOutcomeCounters {
    pub fn record(&self, outcome: SessionOutcome) {
        let pick = |cells: &OutcomeCells| match outcome {
            SessionOutcome::Success => cells.successes.fetch_add(1, Ordering::SeqCst),
            SessionOutcome::Invalid => cells.invalid.fetch_add(1, Ordering::SeqCst),
            SessionOutcome::StoreError => cells.store_errors.fetch_add(1, Ordering::SeqCst),
            SessionOutcome::BreakerOpen => cells.breaker_rejections.fetch_add(1, Ordering::SeqCst),
        };
        pick(&self.window);
        pick(&self.totals);
    }

    fn record_refresh(&self, ok: bool) {
        for cells in [&self.window, &self.totals] {
            if ok {
                cells.refreshes.fetch_add(1, Ordering::SeqCst);
            } else {
                cells.refresh_failures.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    pub fn take_window(&self) -> SessionOutcomeWindow {
        self.window.read(true)
    }

    pub fn totals(&self) -> SessionOutcomeWindow {
        self.totals.read(false)
    }
}

pub struct ResilientSessionValidator {
    store: Arc<dyn SessionStore>,
    breaker: CircuitBreaker,
    counters: Arc<SessionOutcomeCounters>,
    refresh_window: chrono::Duration,
    refreshing: Arc<Mutex<HashSet<String>>>,
}

impl ResilientSessionValidator {
    pub fn new(store: Arc<dyn SessionStore>, breaker: CircuitBreaker, settings: &SessionSettings) -> Self {
        let refresh_window = chrono::Duration::seconds(settings.refresh_window_secs.min(MAX_REFRESH_WINDOW_SECS) as i64);
        Self {
            store,
            breaker,
            counters: Arc::new(SessionOutcomeCounters::default()),
            refresh_window,
            refreshing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn counters(&self) -> Arc<SessionOutcomeCounters> {
        self.counters.clone()
    }

    #[instrument(skip(self, token))]
    pub async fn validate(&self, token: &str) -> Result<Principal, SessionError> {
        let token = token.trim();
        if token.is_empty() || !is_transmittable(token) {
            self.counters.record(SessionOutcome::Invalid);
            return Err(SessionError::InvalidSession);
        }

        let result = self.breaker.call(|| self.store.lookup(token)).await;

        match result {
            Ok(Some(record)) if !record.is_expired_at(Utc::now()) => {
                self.counters.record(SessionOutcome::Success);
                self.maybe_refresh(token, &record);
                Ok(Principal::from(record))
            }
            Ok(Some(record)) => {
                debug!("Session {} has expired", record.session_id);
                self.counters.record(SessionOutcome::Invalid);
                Err(SessionError::InvalidSession)
            }
            Ok(None) => {
                self.counters.record(SessionOutcome::Invalid);
                Err(SessionError::InvalidSession)
            }
            Err(CircuitBreakerError::CircuitOpen(open)) => {
                self.counters.record(SessionOutcome::BreakerOpen);
                Err(SessionError::TemporarilyUnavailable {
                    retry_at: open.retry_at,
                })
            }
            Err(CircuitBreakerError::Timeout) => {
                warn!("Session store lookup timed out");
                self.counters.record(SessionOutcome::StoreError);
                Err(SessionError::StoreUnavailable("session store timed out".to_string()))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                warn!("Session store lookup failed: {}", e);
                self.counters.record(SessionOutcome::StoreError);
                Err(SessionError::StoreUnavailable(e.to_string()))
            }
        }
    }

    /// Extends sessions close to expiry in the background. At most one
    /// refresh per session is in flight.
    fn maybe_refresh(&self, token: &str, record: &SessionRecord) {
        if record.expires_at - Utc::now() > self.refresh_window {
            return;
        }

        {
            let mut refreshing = self.refreshing.lock().unwrap_or_else(|p| p.into_inner());
            if !refreshing.insert(record.session_id.clone()) {
                return;
            }
        }

        let store = self.store.clone();
        let breaker = self.breaker.clone();
        let counters = self.counters.clone();
        let refreshing = self.refreshing.clone();
        let token = token.to_string();
        let session_id = record.session_id.clone();

        tokio::spawn(async move {
            let result = breaker.call(|| store.refresh(&token)).await;
            match result {
                Ok(refreshed) => {
                    info!(session = %session_id, expires_at = %refreshed.expires_at, "Session refreshed");
                    counters.record_refresh(true);
                }
                Err(e) => {
                    warn!(session = %session_id, "Session refresh failed: {}", e);
                    counters.record_refresh(false);
                }
            }
            refreshing
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(&session_id);
        });
    }
}
