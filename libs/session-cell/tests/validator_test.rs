use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;
use tokio::sync::Notify;

use resilience_cell::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use session_cell::{ResilientSessionValidator, SessionError, SessionStore, SESSION_STORE_BREAKER};
use shared_config::SessionSettings;
use shared_database::StoreError;
use shared_models::SessionRecord;

mock! {
    pub Store {}

    #[async_trait]
    impl SessionStore for Store {
        async fn lookup(&self, token: &str) -> Result<Option<SessionRecord>, StoreError>;
        async fn refresh(&self, token: &str) -> Result<SessionRecord, StoreError>;
    }
}

fn record(expires_in: chrono::Duration) -> SessionRecord {
    SessionRecord {
        session_id: "sess-42".to_string(),
        user_id: "user-42".to_string(),
        email: Some("investor@example.com".to_string()),
        role: Some("member".to_string()),
        expires_at: Utc::now() + expires_in,
    }
}

fn breaker(threshold: u32) -> CircuitBreaker {
    CircuitBreaker::new(
        SESSION_STORE_BREAKER,
        CircuitBreakerConfig {
            failure_threshold: threshold,
            base_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(300),
            call_timeout: None,
        },
    )
}

fn validator(store: impl SessionStore + 'static, threshold: u32) -> ResilientSessionValidator {
    ResilientSessionValidator::new(Arc::new(store), breaker(threshold), &SessionSettings::default())
}

#[tokio::test]
async fn valid_session_yields_principal() {
    let mut store = MockStore::new();
    store
        .expect_lookup()
        .times(1)
        .returning(|_| Ok(Some(record(chrono::Duration::hours(2)))));

    let validator = validator(store, 3);
    let principal = validator.validate("good-token").await.unwrap();

    assert_eq!(principal.user_id, "user-42");
    assert_eq!(validator.counters().take_window().successes, 1);
}

#[tokio::test]
async fn unknown_and_expired_sessions_are_invalid_but_not_breaker_failures() {
    let mut store = MockStore::new();
    store.expect_lookup().times(4).returning(|token| {
        if token == "expired" {
            Ok(Some(record(chrono::Duration::seconds(-5))))
        } else {
            Ok(None)
        }
    });

    let validator = validator(store, 3);
    for token in ["unknown", "expired", "unknown", "expired"] {
        assert_matches!(validator.validate(token).await, Err(SessionError::InvalidSession));
    }

    let snapshot = validator.breaker().snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.failure_count, 0);
    assert_eq!(validator.counters().take_window().invalid, 4);
}

#[tokio::test]
async fn empty_token_never_reaches_the_store() {
    let mut store = MockStore::new();
    store.expect_lookup().never();

    let validator = validator(store, 3);
    assert_matches!(validator.validate("   ").await, Err(SessionError::InvalidSession));
}

#[tokio::test]
async fn malformed_tokens_are_invalid_and_leave_the_breaker_closed() {
    let mut store = MockStore::new();
    store
        .expect_lookup()
        .times(1)
        .returning(|_| Ok(Some(record(chrono::Duration::hours(2)))));

    let validator = validator(store, 3);
    for _ in 0..5 {
        assert_matches!(validator.validate("a\u{0001}b").await, Err(SessionError::InvalidSession));
    }

    let snapshot = validator.breaker().snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.failure_count, 0);

    assert!(validator.validate("good-token").await.is_ok());
    let window = validator.counters().take_window();
    assert_eq!(window.invalid, 5);
    assert_eq!(window.store_errors, 0);
}

#[tokio::test(start_paused = true)]
async fn breaker_open_is_reported_as_temporarily_unavailable() {
    let mut store = MockStore::new();
    store.expect_lookup().times(3).returning(|_| {
        Err(StoreError::Api {
            status: 500,
            body: "down".to_string(),
        })
    });

    let validator = validator(store, 3);
    for _ in 0..3 {
        assert_matches!(validator.validate("token").await, Err(SessionError::StoreUnavailable(_)));
    }

    let fourth = validator.validate("token").await;
    assert_matches!(fourth, Err(SessionError::TemporarilyUnavailable { retry_at: Some(_) }));
    assert!(fourth.unwrap_err().is_temporary());
    assert_eq!(validator.breaker_state(), CircuitState::Open);

    let window = validator.counters().take_window();
    assert_eq!(window.store_errors, 3);
    assert_eq!(window.breaker_rejections, 1);
    assert_eq!(window.validations(), 4);
    assert_eq!(validator.counters().take_window().validations(), 0);
    assert_eq!(validator.counters().totals().validations(), 4);
}

/// Store whose refresh blocks until released.
struct GatedStore {
    refresh_calls: AtomicUsize,
    gate: Notify,
}

#[async_trait]
impl SessionStore for GatedStore {
    async fn lookup(&self, _token: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(Some(record(chrono::Duration::seconds(60))))
    }

    async fn refresh(&self, _token: &str) -> Result<SessionRecord, StoreError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(record(chrono::Duration::hours(1)))
    }
}

#[tokio::test]
async fn near_expiry_triggers_a_single_background_refresh() {
    let store = Arc::new(GatedStore {
        refresh_calls: AtomicUsize::new(0),
        gate: Notify::new(),
    });
    let validator =
        ResilientSessionValidator::new(store.clone(), breaker(3), &SessionSettings::default());

    // Both validations answer immediately even though the refresh is blocked.
    validator.validate("token").await.unwrap();
    tokio::task::yield_now().await;
    validator.validate("token").await.unwrap();
    tokio::task::yield_now().await;

    assert_eq!(store.refresh_calls.load(Ordering::SeqCst), 1);

    store.gate.notify_one();
    let counters = validator.counters();
    tokio::time::timeout(Duration::from_secs(1), async {
        while counters.totals().refreshes == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    assert_eq!(counters.totals().refreshes, 1);
    assert_eq!(counters.totals().successes, 2);
}
