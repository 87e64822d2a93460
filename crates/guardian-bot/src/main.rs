//! Trading terminal guardian - Entry Point

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use guardian_bot::orchestrator::{CLIENT_KEY, TERMINAL_KEY};
use guardian_bot::{AppConfig, Application};
use guardian_notify::Severity;
use guardian_telemetry::Metrics;
use tracing::info;

/// Trading terminal guardian
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via GUARDIAN_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the guardian daemon (default)
    Run,
    /// Terminate, pick the fastest servers, rewrite and start the terminal
    RestartTerminal,
    /// Terminate all terminal instances
    ShutdownTerminal,
    /// Restart the client, removing its data folders first
    RestartClient {
        /// Keep the client data folders
        #[arg(long)]
        keep_data: bool,
    },
    /// Terminate all client instances
    ShutdownClient,
    /// Remove the client data folders
    CleanClientData,
    /// Print terminal and client health as JSON
    Health,
    /// Measure every catalog server without touching the terminal
    Probe {
        /// Also print the Prometheus metrics gathered while probing
        #[arg(long)]
        metrics: bool,
    },
    /// Send a test notification through the configured webhook
    NotifyTest,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Determine config path: CLI arg > GUARDIAN_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("GUARDIAN_CONFIG").ok());
    let config = AppConfig::load(config_path.as_deref())?;

    guardian_telemetry::init_logging(config.telemetry.log_filter.as_deref())?;
    info!(
        config_path = config_path.as_deref().unwrap_or(guardian_bot::config::DEFAULT_CONFIG_PATH),
        "Starting guardian v{}",
        env!("CARGO_PKG_VERSION")
    );

    let command = args.command.unwrap_or(Command::Run);
    let app = Application::new(config)?;
    let orchestrator = Arc::clone(app.orchestrator());

    match command {
        Command::Run => app.run().await?,
        Command::RestartTerminal => {
            let report = orchestrator
                .exclusive(TERMINAL_KEY, orchestrator.restart_terminal())
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_success() {
                bail!("terminal restart incomplete: {}", report.errors.join("; "));
            }
        }
        Command::ShutdownTerminal => {
            let report = orchestrator
                .exclusive(TERMINAL_KEY, orchestrator.shutdown_terminal())
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.ensure_success()?;
        }
        Command::RestartClient { keep_data } => {
            let report = orchestrator
                .exclusive(CLIENT_KEY, orchestrator.restart_client(!keep_data))
                .await??;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_success() {
                bail!("client restart incomplete: {}", report.errors.join("; "));
            }
        }
        Command::ShutdownClient => {
            let report = orchestrator
                .exclusive(CLIENT_KEY, orchestrator.shutdown_client())
                .await??;
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.ensure_success()?;
        }
        Command::CleanClientData => {
            let removed = orchestrator
                .exclusive(CLIENT_KEY, async { orchestrator.clean_client_data() })
                .await??;
            for path in removed {
                println!("removed {}", path.display());
            }
        }
        Command::Health => {
            println!("{}", serde_json::to_string_pretty(&orchestrator.health())?);
        }
        Command::Probe { metrics } => {
            for measurement in orchestrator.probe_catalog().await? {
                println!("{}", measurement.describe());
            }
            if metrics {
                print!("{}", Metrics::gather_text()?);
            }
        }
        Command::NotifyTest => {
            let delivered = orchestrator
                .notifier()
                .sink()
                .send(
                    "Guardian test",
                    "Notification channel is working",
                    Severity::Info,
                )
                .await;
            if !delivered {
                bail!("test notification was not delivered");
            }
            println!("delivered");
        }
    }

    Ok(())
}
