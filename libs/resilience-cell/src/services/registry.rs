use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::models::{BreakerTransition, CircuitBreakerSnapshot};
use crate::services::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

const REGISTRY_EVENT_CAPACITY: usize = 1024;

/// Named breakers sharing one transition channel.
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    breakers: Arc<RwLock<HashMap<String, CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
    events: broadcast::Sender<BreakerTransition>,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        let (events, _) = broadcast::channel(REGISTRY_EVENT_CAPACITY);
        Self {
            breakers: Arc::new(RwLock::new(HashMap::new())),
            default_config,
            events,
        }
    }

    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    pub async fn get_or_create(&self, name: &str) -> CircuitBreaker {
        self.get_or_create_with(name, self.default_config.clone()).await
    }

    /// Existing breakers keep the configuration they were created with.
    pub async fn get_or_create_with(&self, name: &str, config: CircuitBreakerConfig) -> CircuitBreaker {
        {
            let breakers = self.breakers.read().await;
            if let Some(breaker) = breakers.get(name) {
                return breaker.clone();
            }
        }

        let mut breakers = self.breakers.write().await;
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Registering circuit breaker '{}'", name);
                CircuitBreaker::with_events(name, config, self.events.clone())
            })
            .clone()
    }

    pub async fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.read().await.get(name).cloned()
    }

    /// Snapshots of every breaker, sorted by name.
    pub async fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let breakers = self.breakers.read().await;
        let mut snapshots: Vec<_> = breakers.values().map(CircuitBreaker::snapshot).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BreakerTransition> {
        self.events.subscribe()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CircuitState;

    #[tokio::test]
    async fn get_or_create_returns_shared_instance() {
        let registry = CircuitBreakerRegistry::default();
        let first = registry.get_or_create("session-store").await;
        let second = registry.get_or_create("session-store").await;

        let _ = first.call(|| async { Err::<(), _>("down") }).await;
        assert_eq!(second.snapshot().failure_count, 1);
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn registry_channel_carries_every_breaker() {
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::default()
        };
        let registry = CircuitBreakerRegistry::new(config);
        let mut events = registry.subscribe();

        let alpha = registry.get_or_create("alpha").await;
        let beta = registry.get_or_create("beta").await;
        let _ = beta.call(|| async { Err::<(), _>("down") }).await;
        let _ = alpha.call(|| async { Err::<(), _>("down") }).await;

        assert_eq!(events.recv().await.unwrap().breaker, "beta");
        assert_eq!(events.recv().await.unwrap().breaker, "alpha");

        let names: Vec<_> = registry.snapshots().await.into_iter().map(|s| (s.name, s.state)).collect();
        assert_eq!(
            names,
            vec![
                ("alpha".to_string(), CircuitState::Open),
                ("beta".to_string(), CircuitState::Open)
            ]
        );
    }
}
