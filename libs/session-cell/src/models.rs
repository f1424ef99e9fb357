use serde::{Deserialize, Serialize};

use shared_models::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Success,
    Invalid,
    StoreError,
    BreakerOpen,
}

/// Validation outcomes counted since the previous drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOutcomeWindow {
    pub successes: u64,
    pub invalid: u64,
    pub store_errors: u64,
    pub breaker_rejections: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
}

impl SessionOutcomeWindow {
    pub fn validations(&self) -> u64 {
        self.successes + self.invalid + self.store_errors + self.breaker_rejections
    }

    /// Store errors and breaker rejections as a percentage of validations.
    pub fn failure_rate(&self) -> f64 {
        let total = self.validations();
        if total == 0 {
            return 0.0;
        }
        (self.store_errors + self.breaker_rejections) as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidateSessionRequest {
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateSessionResponse {
    pub valid: bool,
    pub principal: Principal,
}
