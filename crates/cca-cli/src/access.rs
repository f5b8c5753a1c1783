// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only
#![allow(clippy::disallowed_methods)] // prints the report to stdout

//! `cca access`: dry run of the first pipeline stage

use std::process::ExitCode;

use anyhow::Result;
use cca_contrib::RepositoryRef;
use cca_contrib::access::AccessResolver;
use cca_forge_client::ForgeClient;
use clap::Args;
use serde::Serialize;

use crate::Cli;
use crate::settings::{self, ConfigOverrides};

#[derive(Args, Debug, Clone)]
pub struct AccessArgs {
    /// Upstream repository as owner/name
    #[arg(long, value_parser = crate::parse_repository)]
    pub repo: RepositoryRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessReport {
    pub viewer: String,
    pub repository: String,
    pub default_branch: String,
    pub can_push_direct: bool,
    /// Whether a run would go through a fork
    pub needs_fork: bool,
}

impl AccessArgs {
    pub async fn report(&self, client: &ForgeClient, token: &str) -> Result<AccessReport> {
        let access = AccessResolver::new(client, token).resolve(&self.repo).await?;
        Ok(AccessReport {
            repository: access.repository.full_name.clone(),
            default_branch: access.default_branch().to_string(),
            can_push_direct: access.can_push_direct,
            needs_fork: !access.can_push_direct,
            viewer: access.viewer,
        })
    }

    pub async fn run(&self, cli: &Cli) -> Result<ExitCode> {
        let token = cli.require_token()?;
        let overrides = ConfigOverrides {
            api_base_url: cli.api_url.clone(),
            ..Default::default()
        };
        let config = settings::load(&cli.config_sources(), &overrides)?;
        let client = ForgeClient::http(&config.client_settings())?;

        let report = self.report(&client, token).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(ExitCode::SUCCESS)
    }
}
