//! Zenoh bridge for fast-polled Modbus bits.
//!
//! `run` polls every configured endpoint and publishes changes to Zenoh.
//! `probe` performs a single read against a device and prints the values.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use zenoh_bridge_modbus_fast::probe::{ProbeArgs, probe};
use zenoh_bridge_modbus_fast::{BridgeConfig, LoggingConfig, bridge, init_tracing, session};

/// Zenoh bridge for fast-polled Modbus bits (TCP/RTU).
#[derive(Parser, Debug)]
#[command(name = "zenoh-bridge-modbus-fast")]
#[command(about = "Polls Modbus bit blocks at high rate and publishes changes to Zenoh")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge (default)
    Run(RunArgs),
    /// Read once from a device and print the values as JSON
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "modbus_fast.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Probe(args)) => Ok(run_probe(&args).await),
        Some(Command::Run(args)) => run(args).await.map(|()| ExitCode::SUCCESS),
        None => run(RunArgs {
            config: PathBuf::from("modbus_fast.json5"),
            log_level: None,
        })
        .await
        .map(|()| ExitCode::SUCCESS),
    }
}

async fn run_probe(args: &ProbeArgs) -> ExitCode {
    match probe(args).await {
        Ok(report) => match serde_json::to_string(&report) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to encode report: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = BridgeConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    init_tracing(&log_config).context("Failed to init tracing")?;

    info!("Starting zenoh-bridge-modbus-fast");
    info!("Loaded configuration from {:?}", args.config);

    let session = session::connect(&config.zenoh)
        .await
        .context("Failed to connect to Zenoh")?;
    let session = Arc::new(session);

    bridge::run(&config, Arc::clone(&session), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Received shutdown signal");
    })
    .await
    .context("Bridge failed")?;

    session
        .close()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to close Zenoh session: {}", e))?;
    info!("Modbus fast bridge stopped");

    Ok(())
}
