// =====================================================================================
// FOREGROUND DAEMON
// =====================================================================================

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use monitoring_cell::{MonitoringCore, StartOutcome};
use shared_config::{AppConfig, MonitoringConfig};
use shared_utils::OperatorAuth;

use crate::client::OperatorClient;
use crate::router::create_router;

/// Reads the monitoring configuration from `path`, then `MONITOR_CONFIG`,
/// then defaults. A config without a file takes its environment id from the
/// process environment.
pub fn load_monitoring_config(app: &AppConfig, path: Option<&Path>) -> Result<MonitoringConfig> {
    let path = path.map(Path::to_path_buf).or_else(|| app.monitoring_config_path.clone());
    match path {
        Some(path) => MonitoringConfig::load(&path)
            .with_context(|| format!("Invalid monitoring configuration in {}", path.display())),
        None => Ok(MonitoringConfig {
            environment_id: app.environment_id.clone(),
            ..MonitoringConfig::default()
        }),
    }
}

pub enum StartResult {
    /// A monitor was already listening; its scheduler was asked to start.
    Delegated(StartOutcome),
    /// This process served the API until shutdown.
    Served,
}

/// `start`: hands off to a running monitor when one answers, otherwise runs
/// the core and the operator API in the foreground until Ctrl-C.
pub async fn start(app: AppConfig, client: &OperatorClient, config_path: Option<&Path>) -> Result<StartResult> {
    if client.is_reachable().await {
        info!("Monitor already running at {}, starting its scheduler", client.base_url());
        let body = config_body(&app, config_path)?;
        let outcome: StartOutcome = client.post("/scheduler/start", body.as_ref()).await?;
        return Ok(StartResult::Delegated(outcome));
    }

    let config = load_monitoring_config(&app, config_path)?;
    serve(app, config).await?;
    Ok(StartResult::Served)
}

pub async fn serve(app: AppConfig, config: MonitoringConfig) -> Result<()> {
    let core = MonitoringCore::from_app_config(&app, config).await?;
    let outcome = core.start_monitoring(None).await?;
    info!(session = %outcome.session().id, "Monitoring scheduler started");

    let app = Arc::new(app);
    let auth = Arc::new(OperatorAuth::new(app.operator_jwt_secret.clone()));
    if !auth.is_enabled() {
        warn!("MONITOR_OPERATOR_JWT_SECRET not set, operator routes are unauthenticated");
    }

    let router = create_router(core.clone(), app.clone(), auth);
    let listener = TcpListener::bind(&app.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", app.bind_addr))?;
    info!("Listening on {}", app.bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Operator API server failed")?;

    if let Some(session) = core.stop_monitoring().await {
        info!(session = %session.id, checks = session.checks_performed, "Monitoring scheduler stopped");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// Request body for start/restart when a config file was given.
pub fn config_body(app: &AppConfig, path: Option<&Path>) -> Result<Option<Value>> {
    match path {
        Some(path) => {
            let config = load_monitoring_config(app, Some(path))?;
            Ok(Some(serde_json::to_value(&config).context("Failed to encode configuration")?))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_take_environment_id_from_process() {
        let app = AppConfig {
            environment_id: "staging".to_string(),
            ..AppConfig::default()
        };
        let config = load_monitoring_config(&app, None).unwrap();
        assert_eq!(config.environment_id, "staging");
    }

    #[test]
    fn config_file_is_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "intervals": {{ "api": 0 }} }}"#).unwrap();

        let err = load_monitoring_config(&AppConfig::default(), Some(file.path())).unwrap_err();
        assert!(format!("{:#}", err).contains("intervals.api"));
    }

    #[test]
    fn config_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "environment_id": "prod", "snapshot_capacity": 10 }}"#).unwrap();

        let config = load_monitoring_config(&AppConfig::default(), Some(file.path())).unwrap();
        assert_eq!(config.environment_id, "prod");
        assert_eq!(config.snapshot_capacity, 10);
    }
}
