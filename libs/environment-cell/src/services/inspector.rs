// =====================================================================================
// ENVIRONMENT INSPECTOR
// =====================================================================================

use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use shared_config::AppConfig;

use crate::error::EnvironmentError;
use crate::models::{
    CheckStatus, Comparison, EnvironmentFingerprint, ExpectedDeployment, FieldDifference, TargetProbe,
    ValidationCheck, ValidationReport, VerificationReport,
};

/// Fields that legitimately differ between any two captures.
const VOLATILE_FIELDS: [&str; 2] = ["captured_at", "hostname"];

pub fn local_fingerprint(config: &AppConfig) -> EnvironmentFingerprint {
    EnvironmentFingerprint {
        environment_id: config.environment_id.clone(),
        environment_type: config.environment_type.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_commit: config.git_commit.clone(),
        git_branch: config.git_branch.clone(),
        hostname: hostname(),
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        operator_auth_enabled: config.is_operator_auth_enabled(),
        store_configured: config.is_configured(),
        captured_at: Utc::now(),
    }
}

fn hostname() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Field-by-field differences, ignoring capture time and host.
pub fn compare_fingerprints(left: &EnvironmentFingerprint, right: &EnvironmentFingerprint) -> Vec<FieldDifference> {
    let (Ok(Value::Object(left)), Ok(Value::Object(right))) = (serde_json::to_value(left), serde_json::to_value(right))
    else {
        return Vec::new();
    };

    left.iter()
        .filter(|(field, _)| !VOLATILE_FIELDS.contains(&field.as_str()))
        .filter_map(|(field, value)| {
            let other = right.get(field).cloned().unwrap_or(Value::Null);
            (*value != other).then(|| FieldDifference {
                field: field.clone(),
                left: value.clone(),
                right: other,
            })
        })
        .collect()
}

pub struct EnvironmentInspector {
    client: Client,
    max_response_time: Duration,
}

impl EnvironmentInspector {
    pub fn new(request_timeout: Duration, max_response_time: Duration) -> Result<Self, EnvironmentError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| EnvironmentError::Client(e.to_string()))?;
        Ok(Self {
            client,
            max_response_time,
        })
    }

    /// Reachability and response time from `GET {target}/status`, plus the
    /// fingerprint from `GET {target}/environment` when reachable.
    #[instrument(skip(self))]
    pub async fn probe(&self, target: &str) -> Result<TargetProbe, EnvironmentError> {
        let base = normalize_target(target)?;

        let started = Instant::now();
        let status = self.client.get(format!("{}/status", base)).send().await;
        let response_time_ms = started.elapsed().as_millis() as u64;

        let status = match status {
            Ok(response) => response.status(),
            Err(e) => {
                warn!(target = %base, "Target unreachable: {}", e);
                return Ok(TargetProbe {
                    target: base,
                    reachable: false,
                    status_code: None,
                    response_time_ms: None,
                    fingerprint: None,
                    error: Some(e.to_string()),
                });
            }
        };

        let (fingerprint, error) = match self.fetch_fingerprint(&base).await {
            Ok(fingerprint) => (Some(fingerprint), None),
            Err(e) => (None, Some(e.to_string())),
        };

        debug!(target = %base, status = status.as_u16(), response_time_ms, "Target probed");
        Ok(TargetProbe {
            target: base,
            reachable: status.is_success(),
            status_code: Some(status.as_u16()),
            response_time_ms: Some(response_time_ms),
            fingerprint,
            error,
        })
    }

    pub async fn fingerprint(&self, target: &str) -> Result<EnvironmentFingerprint, EnvironmentError> {
        let base = normalize_target(target)?;
        self.fetch_fingerprint(&base).await
    }

    pub async fn compare(&self, left: &str, right: &str) -> Result<Comparison, EnvironmentError> {
        let left_fp = self.fingerprint(left).await?;
        let right_fp = self.fingerprint(right).await?;
        let differences = compare_fingerprints(&left_fp, &right_fp);
        Ok(Comparison {
            left: left.to_string(),
            right: right.to_string(),
            identical: differences.is_empty(),
            differences,
        })
    }

    /// Runs the deployment health checks. `passed` is false when any check fails.
    #[instrument(skip(self))]
    pub async fn validate(&self, target: &str) -> Result<ValidationReport, EnvironmentError> {
        let probe = self.probe(target).await?;
        let mut checks = Vec::new();

        checks.push(if probe.reachable {
            ValidationCheck::new("reachable", CheckStatus::Pass, format!("status {}", probe.status_code.unwrap_or(0)))
        } else {
            let detail = probe
                .error
                .clone()
                .or_else(|| probe.status_code.map(|code| format!("status {}", code)))
                .unwrap_or_else(|| "no response".to_string());
            ValidationCheck::new("reachable", CheckStatus::Fail, detail)
        });

        if let Some(elapsed) = probe.response_time_ms {
            let limit = self.max_response_time.as_millis() as u64;
            let status = if elapsed <= limit { CheckStatus::Pass } else { CheckStatus::Fail };
            checks.push(ValidationCheck::new(
                "response_time",
                status,
                format!("{} ms (limit {} ms)", elapsed, limit),
            ));
        }

        match &probe.fingerprint {
            Some(fingerprint) => {
                checks.push(if fingerprint.store_configured {
                    ValidationCheck::new("configured", CheckStatus::Pass, "session store configured")
                } else {
                    ValidationCheck::new("configured", CheckStatus::Fail, "session store settings missing")
                });
                checks.push(security_check(fingerprint));
            }
            None => checks.push(ValidationCheck::new(
                "fingerprint",
                CheckStatus::Fail,
                probe.error.clone().unwrap_or_else(|| "fingerprint unavailable".to_string()),
            )),
        }

        Ok(ValidationReport {
            target: probe.target,
            passed: checks.iter().all(|check| check.status != CheckStatus::Fail),
            response_time_ms: probe.response_time_ms,
            checks,
            checked_at: Utc::now(),
        })
    }

    /// Confirms the target runs the expected build.
    #[instrument(skip(self))]
    pub async fn verify(&self, target: &str, expected: &ExpectedDeployment) -> Result<VerificationReport, EnvironmentError> {
        let base = normalize_target(target)?;
        let fingerprint = match self.fetch_fingerprint(&base).await {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                return Ok(VerificationReport {
                    target: base,
                    verified: false,
                    checks: vec![ValidationCheck::new("fingerprint", CheckStatus::Fail, e.to_string())],
                    fingerprint: None,
                })
            }
        };

        let mut checks = Vec::new();
        if let Some(version) = &expected.version {
            checks.push(expect_equal("version", version, Some(fingerprint.version.as_str())));
        }
        if let Some(environment_id) = &expected.environment_id {
            checks.push(expect_equal("environment_id", environment_id, Some(fingerprint.environment_id.as_str())));
        }
        if let Some(commit) = &expected.git_commit {
            let actual = fingerprint.git_commit.as_deref();
            let matches = actual.is_some_and(|actual| actual.starts_with(commit.as_str()) || commit.starts_with(actual));
            checks.push(ValidationCheck::new(
                "git_commit",
                if matches { CheckStatus::Pass } else { CheckStatus::Fail },
                format!("expected {}, found {}", commit, actual.unwrap_or("none")),
            ));
        }

        Ok(VerificationReport {
            target: base,
            verified: checks.iter().all(|check| check.status == CheckStatus::Pass),
            checks,
            fingerprint: Some(fingerprint),
        })
    }

    async fn fetch_fingerprint(&self, base: &str) -> Result<EnvironmentFingerprint, EnvironmentError> {
        let url = format!("{}/environment", base);
        let response = self.client.get(&url).send().await.map_err(|e| EnvironmentError::Unreachable {
            target: base.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnvironmentError::InvalidResponse {
                target: base.to_string(),
                reason: format!("GET /environment returned {}", status),
            });
        }

        response
            .json::<EnvironmentFingerprint>()
            .await
            .map_err(|e| EnvironmentError::InvalidResponse {
                target: base.to_string(),
                reason: e.to_string(),
            })
    }
}

fn normalize_target(target: &str) -> Result<String, EnvironmentError> {
    let trimmed = target.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Err(EnvironmentError::InvalidTarget(target.to_string()))
    }
}

fn security_check(fingerprint: &EnvironmentFingerprint) -> ValidationCheck {
    let production = fingerprint.environment_type.eq_ignore_ascii_case("production");
    match (fingerprint.operator_auth_enabled, production) {
        (true, _) => ValidationCheck::new("security", CheckStatus::Pass, "operator authentication enabled"),
        (false, true) => ValidationCheck::new(
            "security",
            CheckStatus::Fail,
            "operator authentication disabled in production",
        ),
        (false, false) => ValidationCheck::new("security", CheckStatus::Warn, "operator authentication disabled"),
    }
}

fn expect_equal(name: &str, expected: &str, actual: Option<&str>) -> ValidationCheck {
    let status = if actual == Some(expected) { CheckStatus::Pass } else { CheckStatus::Fail };
    ValidationCheck::new(
        name,
        status,
        format!("expected {}, found {}", expected, actual.unwrap_or("none")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn fingerprint() -> EnvironmentFingerprint {
        local_fingerprint(&AppConfig::default())
    }

    #[test]
    fn identical_builds_have_no_differences() {
        let a = fingerprint();
        let mut b = a.clone();
        b.captured_at = Utc::now() + chrono::Duration::minutes(5);
        b.hostname = Some("other-host".to_string());
        assert!(compare_fingerprints(&a, &b).is_empty());
    }

    #[test]
    fn differences_are_listed_by_field() {
        let a = fingerprint();
        let mut b = a.clone();
        b.environment_id = "staging".to_string();
        b.git_commit = Some("abc123".to_string());

        let fields: Vec<String> = compare_fingerprints(&a, &b).into_iter().map(|d| d.field).collect();
        assert_eq!(fields, vec!["environment_id", "git_commit"]);
    }

    #[test]
    fn targets_must_be_http_urls() {
        assert_eq!(normalize_target("http://localhost:4010/").unwrap(), "http://localhost:4010");
        assert_matches!(normalize_target("localhost:4010"), Err(EnvironmentError::InvalidTarget(_)));
    }

    #[test]
    fn production_without_operator_auth_fails_security() {
        let mut fp = fingerprint();
        fp.environment_type = "production".to_string();
        assert_eq!(security_check(&fp).status, CheckStatus::Fail);
        fp.operator_auth_enabled = true;
        assert_eq!(security_check(&fp).status, CheckStatus::Pass);
    }
}
