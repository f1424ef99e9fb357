// =====================================================================================
// RESILIENCE CELL - CIRCUIT BREAKERS FOR EXTERNAL DEPENDENCIES
// =====================================================================================

pub mod error;
pub mod models;
pub mod services;

pub use error::{CircuitBreakerError, CircuitOpenError};
pub use models::{BreakerTransition, CircuitBreakerSnapshot, CircuitState};
pub use services::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry};
