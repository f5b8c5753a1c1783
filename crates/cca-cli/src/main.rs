// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::process::ExitCode;

use anyhow::Result;
use cca_cli::{Cli, Commands, Parser};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    cli.logging.init("cca")?;

    match &cli.command {
        Commands::Migrate(args) => args.run(&cli).await,
        Commands::Access(args) => args.run(&cli).await,
        Commands::Config { subcommand } => subcommand.run(&cli),
    }
}
