use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use tower::ServiceExt;

use resilience_cell::{CircuitBreaker, CircuitBreakerConfig};
use session_cell::{create_session_router, ResilientSessionValidator, SessionStore, SESSION_STORE_BREAKER};
use shared_config::SessionSettings;
use shared_database::StoreError;
use shared_models::SessionRecord;

struct FixedStore {
    healthy: bool,
}

#[async_trait]
impl SessionStore for FixedStore {
    async fn lookup(&self, token: &str) -> Result<Option<SessionRecord>, StoreError> {
        if !self.healthy {
            return Err(StoreError::Api {
                status: 503,
                body: "maintenance".to_string(),
            });
        }
        Ok((token == "valid").then(|| SessionRecord {
            session_id: "s-1".to_string(),
            user_id: "u-1".to_string(),
            email: None,
            role: None,
            expires_at: Utc::now() + chrono::Duration::hours(4),
        }))
    }

    async fn refresh(&self, _token: &str) -> Result<SessionRecord, StoreError> {
        Err(StoreError::NotConfigured)
    }
}

fn app(healthy: bool) -> axum::Router {
    let breaker = CircuitBreaker::new(
        SESSION_STORE_BREAKER,
        CircuitBreakerConfig {
            failure_threshold: 1,
            base_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(60),
            call_timeout: None,
        },
    );
    let validator = ResilientSessionValidator::new(Arc::new(FixedStore { healthy }), breaker, &SessionSettings::default());
    create_session_router(Arc::new(validator))
}

fn validate_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/sessions/validate")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn valid_token_returns_principal() {
    let response = app(true).oneshot(validate_request(r#"{"token":"valid"}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["valid"], true);
    assert_eq!(json["principal"]["user_id"], "u-1");
}

#[tokio::test]
async fn invalid_token_is_unauthorized() {
    let response = app(true).oneshot(validate_request(r#"{"token":"nope"}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bearer_header_is_accepted() {
    let request = Request::builder()
        .method("POST")
        .uri("/sessions/validate")
        .header("Authorization", "Bearer valid")
        .body(Body::empty())
        .unwrap();
    let response = app(true).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn open_breaker_maps_to_service_unavailable() {
    let app = app(false);

    let first = app.clone().oneshot(validate_request(r#"{"token":"valid"}"#)).await.unwrap();
    assert_eq!(first.status(), StatusCode::BAD_GATEWAY);

    let second = app.oneshot(validate_request(r#"{"token":"valid"}"#)).await.unwrap();
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(second.headers().contains_key("retry-after"));
}
