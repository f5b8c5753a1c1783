// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::fmt;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use cca_contrib::RepositoryRef;
use cca_logging::{CliLoggingArgs, redact};
use clap::Subcommand;

pub mod access;
pub mod config_commands;
pub mod migrate;
pub mod settings;

pub use clap::Parser;

#[derive(clap::Parser)]
#[command(
    name = "cca",
    about = "CI/CD assistant: proposes workflow migrations as pull requests",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file (default: <config dir>/cca/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(flatten)]
    pub logging: CliLoggingArgs,
    /// Access token for the forge API
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// Forge API base URL, overriding the configured one
    #[arg(long, global = true)]
    pub api_url: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

impl fmt::Debug for Cli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cli")
            .field("config", &self.config)
            .field("logging", &self.logging)
            .field("token", &self.token.as_ref().map(redact))
            .field("api_url", &self.api_url)
            .field("command", &self.command)
            .finish()
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open a pull request that adds or replaces a workflow file
    Migrate(migrate::MigrateArgs),
    /// Show who the token belongs to and whether it can push to a repository
    Access(access::AccessArgs),
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        subcommand: config_commands::ConfigCommands,
    },
}

impl Cli {
    pub fn config_sources(&self) -> settings::ConfigSources {
        settings::ConfigSources::discover(self.config.as_deref())
    }

    /// The token, or an error telling the user how to supply one
    pub fn require_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| anyhow!("no access token: pass --token or set GITHUB_TOKEN"))
    }
}

pub(crate) fn parse_repository(value: &str) -> Result<RepositoryRef, String> {
    RepositoryRef::parse(value).map_err(|e| e.to_string())
}
