// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only
#![allow(clippy::disallowed_methods)] // prints the response to stdout

//! `cca migrate`

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use cca_contrib::request::DEFAULT_WORKFLOW_PATH;
use cca_contrib::{
    CancellationToken, CommitStrategy, ContributionPipeline, MigrationRequest, MigrationResponse,
    RepositoryRef,
};
use cca_forge_client::ForgeClient;
use clap::Args;
use tracing::{info, warn};

use crate::Cli;
use crate::settings::{self, ConfigOverrides};

/// Commit strategy as spelled on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum StrategyArg {
    /// Contents API, single call
    Contents,
    /// Blob, tree, commit and ref update
    GitData,
    /// Contents API with git-data fallback
    Auto,
}

impl From<StrategyArg> for CommitStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Contents => CommitStrategy::Contents,
            StrategyArg::GitData => CommitStrategy::GitData,
            StrategyArg::Auto => CommitStrategy::Auto,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Upstream repository as owner/name
    #[arg(long, value_parser = crate::parse_repository)]
    pub repo: RepositoryRef,
    /// Local file holding the proposed workflow
    #[arg(long, value_name = "FILE")]
    pub workflow_file: PathBuf,
    /// Destination path inside the repository
    #[arg(long, default_value = DEFAULT_WORKFLOW_PATH)]
    pub workflow_path: String,
    #[arg(long, default_value = "Add CI/CD workflow")]
    pub commit_message: String,
    #[arg(long, default_value = "Migrate CI/CD pipeline")]
    pub pr_title: String,
    #[arg(long, default_value = "")]
    pub pr_body: String,
    /// How the file is written to the branch
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,
    /// Namespace for the generated branch name
    #[arg(long)]
    pub branch_prefix: Option<String>,
}

impl MigrateArgs {
    pub fn overrides(&self, api_url: Option<&str>) -> ConfigOverrides {
        ConfigOverrides {
            api_base_url: api_url.map(str::to_string),
            branch_prefix: self.branch_prefix.clone(),
            commit_strategy: self.strategy.map(Into::into),
        }
    }

    /// Read the workflow file and assemble the pipeline input
    pub fn request(&self, token: &str) -> Result<MigrationRequest> {
        let workflow_content = std::fs::read_to_string(&self.workflow_file)
            .with_context(|| format!("failed to read {}", self.workflow_file.display()))?;
        Ok(MigrationRequest {
            repository: self.repo.clone(),
            workflow_path: self.workflow_path.clone(),
            workflow_content,
            commit_message: self.commit_message.clone(),
            pr_title: self.pr_title.clone(),
            pr_body: self.pr_body.clone(),
            auth_token: token.to_string(),
        })
    }

    /// Run the pipeline and return the caller-facing response
    pub async fn execute(&self, pipeline: &ContributionPipeline, token: &str) -> Result<MigrationResponse> {
        let request = self.request(token)?;
        info!(repository = %request.repository, path = %request.workflow_path, "opening migration pull request");
        Ok(pipeline.run(&request).await.into())
    }

    pub async fn run(&self, cli: &Cli) -> Result<ExitCode> {
        let token = cli.require_token()?;
        let config = settings::load(&cli.config_sources(), &self.overrides(cli.api_url.as_deref()))?;
        let client = ForgeClient::http(&config.client_settings())?;

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping after the current request");
                on_interrupt.cancel();
            }
        });

        let pipeline = ContributionPipeline::new(client, config).with_cancellation(cancel);
        let response = self.execute(&pipeline, token).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);

        Ok(if response.ok {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}
