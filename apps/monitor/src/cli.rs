use clap::{Parser, Subcommand};
use std::path::PathBuf;

use shared_config::{AlertSeverity, Category, DEFAULT_API_URL};

#[derive(Parser)]
#[command(name = "clarity-monitor")]
#[command(about = "clarity-monitor - health scoring, alerting and circuit breaking for the Clarity services")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Base URL of the operator API
    #[arg(long, global = true, env = "MONITOR_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Bearer token for mutating operator routes
    #[arg(long, global = true, env = "MONITOR_OPERATOR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show scheduler, alert and score summary
    Status {
        /// Show the full dashboard instead
        #[arg(long, conflicts_with_all = ["alerts", "metrics"])]
        dashboard: bool,

        /// Show active alerts instead
        #[arg(long, conflicts_with = "metrics")]
        alerts: bool,

        /// Show the latest metrics instead
        #[arg(long)]
        metrics: bool,
    },

    /// Run the monitor in the foreground, or start the scheduler of a running one
    Start {
        /// Monitoring configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Stop the scheduler
    Stop,

    /// Stop then start the scheduler
    Restart {
        /// Monitoring configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Dashboard view of health, alerts and circuits
    Dashboard {
        /// Redraw until interrupted
        #[arg(long)]
        watch: bool,

        /// Seconds between redraws
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },

    /// Manage alerts
    Alerts {
        #[command(subcommand)]
        command: AlertCommands,
    },

    /// Inspect collected metrics
    Metrics {
        #[command(subcommand)]
        command: MetricsCommands,
    },

    /// Read or change the monitoring configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Run one health check now
    Health,

    /// Validate a deployment (defaults to the operator API target)
    Validate {
        #[arg(long)]
        target: Option<String>,
    },

    /// List circuit breakers
    Circuits,

    /// Show recent monitoring events
    Logs {
        /// Keep polling for new events
        #[arg(short, long)]
        follow: bool,

        /// Number of recent events to show
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Seconds between polls when following
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },

    /// Environment fingerprints
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },
}

#[derive(Subcommand)]
pub enum AlertCommands {
    /// List active alerts
    List {
        /// Include resolved alerts still retained
        #[arg(long)]
        all: bool,
    },

    /// Resolve an active alert
    Resolve { id: String },

    /// Send a synthetic alert through every sink
    Test {
        #[arg(long, default_value = "warning")]
        severity: AlertSeverity,

        #[arg(long)]
        category: Option<Category>,

        #[arg(long)]
        message: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum MetricsCommands {
    /// Latest snapshot and health score
    Show,

    /// Summary of the retained health score history
    Trends {
        /// Limit to the most recent N scores
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the active configuration
    Show,

    /// Replace the configuration with a JSON file
    Update { file: PathBuf },

    /// Set one dotted key, e.g. `intervals.api 5000`
    Set { key: String, value: String },

    /// Export config, status, history, alerts and circuits
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum EnvCommands {
    /// Fingerprint a target, or this host when no target is given
    Fingerprint {
        #[arg(long)]
        target: Option<String>,
    },

    /// Compare the fingerprints of two targets
    Compare { left: String, right: String },

    /// Check that a target runs the expected build
    Verify {
        target: String,

        #[arg(long = "expect-version")]
        expected_version: Option<String>,

        #[arg(long = "expect-commit")]
        expected_commit: Option<String>,

        #[arg(long = "expect-environment")]
        expected_environment: Option<String>,
    },
}
