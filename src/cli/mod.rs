// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Sealed Payload CLI
#[derive(Parser, Debug)]
#[command(name = "sealed-payload")]
#[command(version)]
#[command(about = "Developer tools for encrypted API payloads", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bootstrap the server public key and print the transfer state
    FetchKey(commands::FetchKeyArgs),

    /// Seal a JSON payload for a server public key
    Seal(commands::SealArgs),

    /// Validate an envelope and show its decoded field sizes
    Inspect(commands::InspectArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::FetchKey(args) => commands::fetch_key(args).await,
        Commands::Seal(args) => commands::seal(args).await,
        Commands::Inspect(args) => commands::inspect(args).await,
    }
}
