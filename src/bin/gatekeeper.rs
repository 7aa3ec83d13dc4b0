// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! gatekeeper binary - brute-force admission gate
//!
//! Hosts an admission engine with its housekeeping tasks and answers the
//! line protocol on stdin/stdout.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use gatekeeper::server::config::{generate_config_template, load_config, GateFileConfig};
use gatekeeper::server::{build_engine, serve, Housekeeper};
use gatekeeper::utils::logging;
use gatekeeper::Dimension;
use std::fs;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Brute-force and credential-stuffing admission gate
#[derive(Parser, Debug)]
#[command(name = "gatekeeper")]
#[command(version)]
#[command(about = "Brute-force and credential-stuffing admission gate", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the line protocol on stdin/stdout (default)
    Run,

    /// Generate a configuration file template
    GenConfig {
        /// Output path (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Check configuration file for errors
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(cli.verbose);

    match cli.command {
        None | Some(Commands::Run) => run(&cli).await,
        Some(Commands::GenConfig { ref output }) => gen_config(output.as_ref()),
        Some(Commands::CheckConfig) => check_config(&cli),
    }
}

fn load(cli: &Cli) -> Result<GateFileConfig> {
    match &cli.config {
        Some(path) => load_config(Some(path))
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => load_config(None).context("Failed to load configuration"),
    }
}

/// Host the engine until stdin closes or a shutdown signal arrives
async fn run(cli: &Cli) -> Result<()> {
    tracing::info!("Starting gatekeeper");

    let config = load(cli)?;
    let engine = build_engine(&config)?;
    let housekeeper = Housekeeper::spawn(&engine, config.housekeeping_period());

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_token.cancel();
    });

    let result = serve(
        &engine,
        tokio::io::stdin(),
        tokio::io::stdout(),
        cancel_token.clone(),
    )
    .await;

    housekeeper.shutdown().await;

    let answered = result?;
    tracing::info!(answered, "gatekeeper stopped");

    // The blocking stdin reader would hold runtime shutdown until the next line
    if cancel_token.is_cancelled() {
        std::process::exit(0);
    }
    Ok(())
}

/// Resolve once SIGINT or SIGTERM is received
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}

/// Generate a configuration file template
fn gen_config(output: Option<&PathBuf>) -> Result<()> {
    let template = generate_config_template();

    if let Some(path) = output {
        fs::write(path, &template).context("Failed to write configuration file")?;
        println!("Configuration template written to {}", path.display());
    } else {
        print!("{}", template);
    }

    Ok(())
}

/// Check configuration file for errors
fn check_config(cli: &Cli) -> Result<()> {
    let config = load(cli)?;
    let engine_config = config.to_engine_config();

    println!("✓ Configuration is valid\n");
    println!("Rate limits:");
    for dimension in Dimension::ALL {
        let limits = engine_config.limiter(dimension);
        println!(
            "  {}: {} attempts per {}s (evict after {}s idle)",
            dimension,
            limits.threshold,
            limits.lifetime.as_secs(),
            limits.housekeeping_interval.as_secs()
        );
    }

    println!("\nHousekeeping period: {}s", config.housekeeping.period);

    println!("\nLists:");
    println!("  Allow: {:?}", config.lists.allow);
    println!("  Deny: {:?}", config.lists.deny);

    Ok(())
}
