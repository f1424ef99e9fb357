use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        f.write_str(label)
    }
}

/// Read-only copy of a breaker's state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_retry_time: Option<DateTime<Utc>>,
    pub total_calls: u64,
    pub rejected_calls: u64,
}

/// Emitted on every state change of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerTransition {
    pub breaker: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub failure_count: u32,
    pub at: DateTime<Utc>,
    pub next_retry_time: Option<DateTime<Utc>>,
}
