use std::env;
use std::path::PathBuf;
use tracing::warn;

pub mod error;
pub mod monitoring;

pub use error::ConfigError;
pub use monitoring::{
    AlertComparison, AlertRule, AlertSeverity, AlertsConfig, Category, CategoryIntervals,
    CategoryWeights, CircuitBreakerSettings, IntegrationTarget, MetricKey, MonitoringConfig,
    ScoreBand, ScoreBands, ScoringConfig, SessionSettings,
};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4010";
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:4010";

/// Process-level settings read from the environment. Operator-tunable
/// monitoring behaviour lives in [`MonitoringConfig`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub api_url: String,
    pub environment_id: String,
    pub environment_type: String,
    pub monitoring_config_path: Option<PathBuf>,
    pub session_store_url: String,
    pub session_store_api_key: String,
    pub operator_jwt_secret: Option<String>,
    pub operator_token: Option<String>,
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            bind_addr: env::var("MONITOR_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            api_url: env::var("MONITOR_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            environment_id: env::var("MONITOR_ENVIRONMENT_ID").unwrap_or_else(|_| {
                warn!("MONITOR_ENVIRONMENT_ID not set, using 'local'");
                "local".to_string()
            }),
            environment_type: env::var("MONITOR_ENVIRONMENT_TYPE")
                .unwrap_or_else(|_| "development".to_string()),
            monitoring_config_path: env::var("MONITOR_CONFIG").ok().map(PathBuf::from),
            session_store_url: env::var("SESSION_STORE_URL").unwrap_or_else(|_| {
                warn!("SESSION_STORE_URL not set, session validation will fail fast");
                String::new()
            }),
            session_store_api_key: env::var("SESSION_STORE_API_KEY").unwrap_or_else(|_| {
                warn!("SESSION_STORE_API_KEY not set, using empty value");
                String::new()
            }),
            operator_jwt_secret: non_empty(env::var("MONITOR_OPERATOR_JWT_SECRET").ok()),
            operator_token: non_empty(env::var("MONITOR_OPERATOR_TOKEN").ok()),
            git_commit: non_empty(env::var("GIT_COMMIT").ok()),
            git_branch: non_empty(env::var("GIT_BRANCH").ok()),
        };

        if !config.is_configured() {
            warn!("Monitor not fully configured - session store settings missing");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.session_store_url.is_empty() && !self.session_store_api_key.is_empty()
    }

    pub fn is_operator_auth_enabled(&self) -> bool {
        self.operator_jwt_secret.is_some()
    }

    pub fn is_production(&self) -> bool {
        self.environment_type.eq_ignore_ascii_case("production")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            environment_id: "local".to_string(),
            environment_type: "development".to_string(),
            monitoring_config_path: None,
            session_store_url: String::new(),
            session_store_api_key: String::new(),
            operator_jwt_secret: None,
            operator_token: None,
            git_commit: None,
            git_branch: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
