// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration layering for the CLI
//!
//! Precedence, lowest first: built-in defaults, the TOML file (`--config`,
//! else `<config dir>/cca/config.toml`), `CCA_*` environment variables, then
//! explicit command-line flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cca_contrib::{CommitStrategy, PipelineConfig};

/// Environment variables with this prefix override file settings, e.g.
/// `CCA_FORK_REPO_ATTEMPTS=20` sets `fork-repo-attempts`
pub const ENV_PREFIX: &str = "CCA";

/// User configuration file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cca").join("config.toml"))
}

/// Where configuration is read from
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub file: Option<PathBuf>,
    /// Fail when `file` does not exist
    pub file_required: bool,
    /// Replaces the process environment; used by tests
    pub env: Option<config::Map<String, String>>,
}

impl ConfigSources {
    /// `--config` when given (must exist), else the optional user file
    pub fn discover(explicit: Option<&Path>) -> Self {
        match explicit {
            Some(path) => Self {
                file: Some(path.to_path_buf()),
                file_required: true,
                env: None,
            },
            None => Self {
                file: default_config_path(),
                file_required: false,
                env: None,
            },
        }
    }
}

/// Values given as command-line flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub branch_prefix: Option<String>,
    pub commit_strategy: Option<CommitStrategy>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(url) = &self.api_base_url {
            config.api_base_url = url.clone();
        }
        if let Some(prefix) = &self.branch_prefix {
            config.branch_prefix = prefix.clone();
        }
        if let Some(strategy) = self.commit_strategy {
            config.commit_strategy = strategy;
        }
    }
}

/// Resolve the pipeline configuration from every layer
pub fn load(sources: &ConfigSources, overrides: &ConfigOverrides) -> Result<PipelineConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = &sources.file {
        builder = builder.add_source(
            config::File::from(path.as_path())
                .format(config::FileFormat::Toml)
                .required(sources.file_required),
        );
    }
    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .convert_case(config::Case::Kebab)
            .try_parsing(true)
            .source(sources.env.clone()),
    );

    let built = builder.build().with_context(|| match &sources.file {
        Some(path) => format!("failed to read configuration from {}", path.display()),
        None => "failed to read configuration".to_string(),
    })?;
    let mut config: PipelineConfig = built
        .try_deserialize()
        .context("configuration contains an invalid value")?;

    overrides.apply(&mut config);
    config.validate()?;
    tracing::debug!(?config, "resolved configuration");
    Ok(config)
}
