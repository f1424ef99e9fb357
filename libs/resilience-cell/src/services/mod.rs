pub mod circuit_breaker;
pub mod registry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use registry::CircuitBreakerRegistry;
