// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only
#![allow(clippy::disallowed_methods)] // CLI commands print to stdout

//! Configuration inspection commands

use std::process::ExitCode;

use anyhow::Result;
use clap::Subcommand;

use crate::Cli;
use crate::settings::{self, ConfigOverrides};

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Show the resolved configuration as TOML
    Show,
    /// Print the configuration file that would be read
    Path,
}

impl ConfigCommands {
    pub fn run(&self, cli: &Cli) -> Result<ExitCode> {
        match self {
            ConfigCommands::Show => {
                let overrides = ConfigOverrides {
                    api_base_url: cli.api_url.clone(),
                    ..Default::default()
                };
                let config = settings::load(&cli.config_sources(), &overrides)?;
                print!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigCommands::Path => match cli.config_sources().file {
                Some(path) => println!("{}", path.display()),
                None => {
                    eprintln!("no configuration directory on this platform");
                    return Ok(ExitCode::FAILURE);
                }
            },
        }
        Ok(ExitCode::SUCCESS)
    }
}
