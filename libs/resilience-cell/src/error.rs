use chrono::{DateTime, Utc};
use thiserror::Error;

/// Returned without invoking the wrapped operation while a breaker refuses calls.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Circuit breaker '{breaker}' is open after {failure_count} failures")]
pub struct CircuitOpenError {
    pub breaker: String,
    pub failure_count: u32,
    /// When the next trial call will be admitted. `None` while a trial is in flight.
    pub retry_at: Option<DateTime<Utc>>,
}

#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    #[error(transparent)]
    CircuitOpen(CircuitOpenError),

    #[error("Operation timed out")]
    Timeout,

    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen(_))
    }
}
