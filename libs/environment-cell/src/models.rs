use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a running monitor reports about itself on `GET /environment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentFingerprint {
    pub environment_id: String,
    pub environment_type: String,
    pub version: String,
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
    pub hostname: Option<String>,
    pub os: String,
    pub arch: String,
    pub operator_auth_enabled: bool,
    pub store_configured: bool,
    pub captured_at: DateTime<Utc>,
}

/// Result of querying one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetProbe {
    pub target: String,
    pub reachable: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<u64>,
    pub fingerprint: Option<EnvironmentFingerprint>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDifference {
    pub field: String,
    pub left: Value,
    pub right: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub left: String,
    pub right: String,
    pub identical: bool,
    pub differences: Vec<FieldDifference>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl ValidationCheck {
    pub fn new(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub target: String,
    pub passed: bool,
    pub response_time_ms: Option<u64>,
    pub checks: Vec<ValidationCheck>,
    pub checked_at: DateTime<Utc>,
}

/// What a deployment is expected to be running. Unset fields are not checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectedDeployment {
    pub version: Option<String>,
    pub git_commit: Option<String>,
    pub environment_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub target: String,
    pub verified: bool,
    pub checks: Vec<ValidationCheck>,
    pub fingerprint: Option<EnvironmentFingerprint>,
}
