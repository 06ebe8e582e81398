// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! warrenctl: drives a running server's control API.

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "warrenctl", version, about = "Control a running warren server")]
struct Cli {
    /// Base URL of the control API
    #[arg(short = 's', long = "server", default_value = "http://127.0.0.1:8053")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-read the top-level config file, then reload everything
    Reconfig,
    /// Rescan the monitor, service and zone directories
    Reload,
    /// Reload a single zone file
    ReloadZone {
        /// Zone name (the zone file's basename)
        zonename: String,
    },
    /// List loaded zones
    Zones,
    /// List loaded services
    Services,
    /// List loaded monitors
    Monitors,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.server.trim_end_matches('/');

    let response = match &cli.command {
        Command::Reconfig => client.post(format!("{base}/v1/reconfig")).send().await,
        Command::Reload => client.post(format!("{base}/v1/reload")).send().await,
        Command::ReloadZone { zonename } => {
            client
                .post(format!("{base}/v1/zones/{zonename}/reload"))
                .send()
                .await
        }
        Command::Zones => client.get(format!("{base}/v1/zones")).send().await,
        Command::Services => client.get(format!("{base}/v1/services")).send().await,
        Command::Monitors => client.get(format!("{base}/v1/monitors")).send().await,
    }
    .with_context(|| format!("cannot reach control api at {base}"))?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        bail!("server returned {status}: {body}");
    }

    // Pretty-print when the body is JSON, else pass it through.
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}
