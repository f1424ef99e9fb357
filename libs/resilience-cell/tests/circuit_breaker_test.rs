use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use resilience_cell::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

fn session_store_breaker() -> CircuitBreaker {
    CircuitBreaker::new(
        "session-store",
        CircuitBreakerConfig {
            failure_threshold: 3,
            base_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(300),
            call_timeout: None,
        },
    )
}

async fn store_call(
    breaker: &CircuitBreaker,
    calls: &Arc<AtomicUsize>,
    healthy: bool,
) -> Result<&'static str, CircuitBreakerError<String>> {
    let calls = calls.clone();
    breaker
        .call(move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if healthy {
                Ok("session")
            } else {
                Err("store unavailable".to_string())
            }
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn session_store_opens_after_threshold_and_recovers_after_backoff() {
    let breaker = session_store_breaker();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        assert_matches!(
            store_call(&breaker, &calls, false).await,
            Err(CircuitBreakerError::OperationFailed(_))
        );
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Fourth call fails fast without reaching the store.
    let rejected = store_call(&breaker, &calls, true).await;
    assert_matches!(rejected, Err(CircuitBreakerError::CircuitOpen(ref e)) if e.breaker == "session-store");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    tokio::time::advance(Duration::from_secs(30)).await;

    assert_eq!(store_call(&breaker, &calls, true).await.unwrap(), "session");
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.failure_count, 0);
    assert!(snapshot.next_retry_time.is_none());
}

#[tokio::test(start_paused = true)]
async fn only_one_trial_is_in_flight_while_half_open() {
    let breaker = session_store_breaker();
    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let _ = store_call(&breaker, &calls, false).await;
    }
    tokio::time::advance(Duration::from_secs(30)).await;

    let (release, gate) = tokio::sync::oneshot::channel::<()>();
    let trial_breaker = breaker.clone();
    let trial = tokio::spawn(async move {
        trial_breaker
            .call(move || async move {
                let _ = gate.await;
                Ok::<_, String>("trial")
            })
            .await
    });
    tokio::task::yield_now().await;
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    let concurrent = futures::future::join_all((0..4).map(|_| store_call(&breaker, &calls, true))).await;
    assert!(concurrent.iter().all(|r| matches!(r, Err(CircuitBreakerError::CircuitOpen(_)))));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    release.send(()).unwrap();
    assert_eq!(trial.await.unwrap().unwrap(), "trial");
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn closed_breaker_never_exceeds_threshold() {
    let breaker = session_store_breaker();
    let calls = Arc::new(AtomicUsize::new(0));

    for round in 0..10 {
        let _ = store_call(&breaker, &calls, round % 4 == 3).await;
        let snapshot = breaker.snapshot();
        if snapshot.state == CircuitState::Closed {
            assert!(snapshot.failure_count < snapshot.failure_threshold);
        }
    }
}
