// =====================================================================================
// COMMAND DISPATCH
// =====================================================================================

use anyhow::{bail, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use environment_cell::{local_fingerprint, EnvironmentInspector, ExpectedDeployment};
use monitoring_cell::models::{AlertChange, MonitoringEvent, ResolveOutcome};
use monitoring_cell::{Alert, StartOutcome};
use resilience_cell::CircuitBreakerSnapshot;
use shared_config::{AppConfig, MonitoringConfig};

use crate::cli::{AlertCommands, Cli, Commands, ConfigCommands, EnvCommands, MetricsCommands};
use crate::client::{OperatorClient, StopView};
use crate::daemon::{self, StartResult};
use crate::render;

const INSPECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESPONSE_TIME: Duration = Duration::from_millis(2000);

/// Prints `value` as JSON, or decodes it and renders it for the terminal.
fn emit<T: DeserializeOwned>(json: bool, value: Value, render: fn(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        let decoded: T = serde_json::from_value(value).context("Unexpected response shape")?;
        println!("{}", render(&decoded));
    }
    Ok(())
}

fn emit_local<T: Serialize>(json: bool, value: &T, render: fn(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", render(value));
    }
    Ok(())
}

fn start_outcome(outcome: &StartOutcome) -> String {
    match outcome {
        StartOutcome::Started(session) => format!("Scheduler started (session {})", session.id),
        StartOutcome::AlreadyRunning(session) => format!("Scheduler already running (session {})", session.id),
    }
}

fn inspector() -> Result<EnvironmentInspector> {
    Ok(EnvironmentInspector::new(INSPECT_TIMEOUT, MAX_RESPONSE_TIME)?)
}

pub async fn run(cli: Cli, app: AppConfig) -> Result<()> {
    let client = OperatorClient::new(&cli.api_url, cli.token.clone())?;
    let json = cli.json;

    match cli.command {
        Commands::Status {
            dashboard,
            alerts,
            metrics,
        } => {
            if dashboard {
                emit(json, client.get("/dashboard").await?, render::dashboard)
            } else if alerts {
                emit(json, client.get("/alerts").await?, |a: &Vec<Alert>| render::alerts(a))
            } else if metrics {
                emit(json, client.get("/metrics").await?, render::metrics)
            } else {
                emit(json, client.get("/status").await?, render::status)
            }
        }

        Commands::Start { config } => match daemon::start(app, &client, config.as_deref()).await? {
            StartResult::Delegated(outcome) => emit_local(json, &outcome, start_outcome),
            StartResult::Served => Ok(()),
        },

        Commands::Stop => {
            let stopped: Value = client.post("/scheduler/stop", None).await?;
            emit(json, stopped, |view: &StopView| {
                if view.stopped {
                    "Scheduler stopped".to_string()
                } else {
                    "Scheduler was not running".to_string()
                }
            })
        }

        Commands::Restart { config } => {
            let body = daemon::config_body(&app, config.as_deref())?;
            emit(json, client.post("/scheduler/restart", body.as_ref()).await?, start_outcome)
        }

        Commands::Dashboard { watch, interval } => {
            if !watch {
                return emit(json, client.get("/dashboard").await?, render::dashboard);
            }
            let period = Duration::from_secs(interval.max(1));
            loop {
                let value: Value = client.get("/dashboard").await?;
                if !json {
                    print!("\x1B[2J\x1B[H");
                }
                emit(json, value, render::dashboard)?;
                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    _ = tokio::signal::ctrl_c() => return Ok(()),
                }
            }
        }

        Commands::Alerts { command } => run_alerts(&client, json, command).await,
        Commands::Metrics { command } => run_metrics(&client, json, command).await,
        Commands::Config { command } => run_config(&client, &app, json, command).await,

        Commands::Health => emit(json, client.post("/health/check", None).await?, render::health_check),

        Commands::Validate { target } => {
            let target = target.unwrap_or_else(|| client.base_url().to_string());
            let report = inspector()?.validate(&target).await?;
            emit_local(json, &report, render::validation)?;
            if !report.passed {
                bail!("Validation of {} failed", target);
            }
            Ok(())
        }

        Commands::Circuits => emit(json, client.get("/circuits").await?, |c: &Vec<CircuitBreakerSnapshot>| render::circuits(c)),

        Commands::Logs {
            follow,
            limit,
            interval,
        } => run_logs(&client, json, follow, limit, interval).await,

        Commands::Env { command } => run_env(&app, json, command).await,
    }
}

async fn run_alerts(client: &OperatorClient, json: bool, command: AlertCommands) -> Result<()> {
    match command {
        AlertCommands::List { all } => {
            let path = if all { "/alerts?include_resolved=true" } else { "/alerts" };
            emit(json, client.get(path).await?, |a: &Vec<Alert>| render::alerts(a))
        }
        AlertCommands::Resolve { id } => {
            let outcome: Value = client.post(&format!("/alerts/{}/resolve", id), None).await?;
            emit(json, outcome, |outcome: &ResolveOutcome| match outcome {
                ResolveOutcome::Resolved(alert) => format!("Resolved {} ({})", alert.id, alert.title),
                ResolveOutcome::AlreadyResolved(alert) => format!("{} was already resolved", alert.id),
                ResolveOutcome::NotFound => "Alert not found".to_string(),
            })
        }
        AlertCommands::Test {
            severity,
            category,
            message,
        } => {
            let body = json!({
                "severity": severity,
                "category": category,
                "message": message,
            });
            emit(json, client.post("/alerts/test", Some(&body)).await?, |changes: &Vec<AlertChange>| {
                changes.iter().map(render::alert_change).collect::<Vec<_>>().join("\n")
            })
        }
    }
}

async fn run_metrics(client: &OperatorClient, json: bool, command: MetricsCommands) -> Result<()> {
    match command {
        MetricsCommands::Show => emit(json, client.get("/metrics").await?, render::metrics),
        MetricsCommands::Trends { limit } => {
            let path = match limit {
                Some(limit) => format!("/metrics/trends?limit={}", limit),
                None => "/metrics/trends".to_string(),
            };
            emit(json, client.get(&path).await?, render::trends)
        }
    }
}

async fn run_config(client: &OperatorClient, app: &AppConfig, json: bool, command: ConfigCommands) -> Result<()> {
    let pretty = |config: &MonitoringConfig| config.to_pretty_json().unwrap_or_default();
    match command {
        ConfigCommands::Show => emit(json, client.get("/config").await?, pretty),
        ConfigCommands::Update { file } => {
            let config = daemon::load_monitoring_config(app, Some(&file))?;
            let body = serde_json::to_value(&config)?;
            emit(json, client.put("/config", &body).await?, pretty)
        }
        ConfigCommands::Set { key, value } => {
            let body = json!({ "key": key, "value": value });
            emit(json, client.patch("/config", &body).await?, pretty)
        }
        ConfigCommands::Export { output } => {
            let bundle: Value = client.get("/export").await?;
            let document = serde_json::to_string_pretty(&bundle)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, document)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Exported monitor state to {}", path.display());
                }
                None => println!("{}", document),
            }
            Ok(())
        }
    }
}

async fn run_logs(client: &OperatorClient, json: bool, follow: bool, limit: usize, interval: u64) -> Result<()> {
    let events: Vec<MonitoringEvent> = client.get(&format!("/events?limit={}", limit)).await?;
    print_events(json, &events)?;
    if !follow {
        return Ok(());
    }

    let mut last_seq = events.last().map(|event| event.seq).unwrap_or(0);
    let period = Duration::from_secs(interval.max(1));
    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
        let events: Vec<MonitoringEvent> = client.get(&format!("/events?after={}", last_seq)).await?;
        debug!(received = events.len(), after = last_seq, "Polled events");
        if let Some(event) = events.last() {
            last_seq = event.seq;
        }
        print_events(json, &events)?;
    }
}

fn print_events(json: bool, events: &[MonitoringEvent]) -> Result<()> {
    if json {
        for event in events {
            println!("{}", serde_json::to_string(event)?);
        }
    } else {
        print!("{}", render::events(events));
    }
    Ok(())
}

async fn run_env(app: &AppConfig, json: bool, command: EnvCommands) -> Result<()> {
    match command {
        EnvCommands::Fingerprint { target } => {
            let fingerprint = match target {
                Some(target) => inspector()?.fingerprint(&target).await?,
                None => local_fingerprint(app),
            };
            emit_local(json, &fingerprint, render::fingerprint)
        }
        EnvCommands::Compare { left, right } => {
            let comparison = inspector()?.compare(&left, &right).await?;
            emit_local(json, &comparison, render::comparison)
        }
        EnvCommands::Verify {
            target,
            expected_version,
            expected_commit,
            expected_environment,
        } => {
            let expected = ExpectedDeployment {
                version: expected_version,
                git_commit: expected_commit,
                environment_id: expected_environment,
            };
            let report = inspector()?.verify(&target, &expected).await?;
            emit_local(json, &report, render::verification)?;
            if !report.verified {
                bail!("{} does not match the expected deployment", target);
            }
            Ok(())
        }
    }
}
