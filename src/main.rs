// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info};
use warren::config::{load_config, Config};
use warren::server::master::Master;

/// Worker threads for the server runtime.
const TOKIO_WORKER_THREADS: usize = 4;

#[derive(Parser, Debug)]
#[command(
    name = "warrend",
    version,
    about = "Authoritative DNS server with health-gated dynamic answers"
)]
struct Cli {
    /// Config file path
    #[arg(short = 'c', long = "config", default_value = "config.toml")]
    config: PathBuf,

    /// Log level override (panic|fatal|error|warn|info|debug)
    #[arg(short = 'l', long = "log-level")]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("warrend: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    initialize_logging(&config);

    // Build Tokio runtime with custom thread names
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("warren-server")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "cannot build runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(cli.config, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("server failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with custom format
///
/// Respects `RUST_LOG` environment variable if set, otherwise uses the
/// configured `log_level`. Respects `RUST_LOG_FORMAT` environment variable
/// for output format (json or text).
fn initialize_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.tracing_level()));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting Warren DNS server");
    debug!("Logging initialized with file and line number tracking");
}

async fn async_main(config_path: PathBuf, config: Config) -> Result<()> {
    let master = Master::start(&config_path, config).await?;
    info!("warren started");
    master.run().await
}
