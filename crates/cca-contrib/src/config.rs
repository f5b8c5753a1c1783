// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Pipeline configuration

use std::time::Duration;

use cca_forge_client::{ClientSettings, DEFAULT_API_BASE_URL, DEFAULT_API_VERSION};
use serde::{Deserialize, Serialize};

/// How the file committer writes the file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitStrategy {
    /// Single-call replace through the contents API
    #[default]
    Contents,
    /// blob → tree → commit → ref update
    GitData,
    /// Contents API, falling back to git data on a non-404 host error
    Auto,
}

/// Tunables for a pipeline run. Every field has a default, so partial TOML
/// files and environment overlays deserialize cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PipelineConfig {
    pub api_base_url: String,
    pub api_version: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Namespace for generated branch names
    pub branch_prefix: String,
    /// Polls for the fork repository to become visible
    pub fork_repo_attempts: u32,
    /// Polls for the fork's default branch once the repository is visible
    pub fork_branch_attempts: u32,
    pub fork_poll_interval_ms: u64,
    /// Contents API attempts when the host answers 404
    pub commit_attempts: u32,
    pub commit_retry_interval_ms: u64,
    pub commit_strategy: CommitStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            user_agent: concat!("cca/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 30,
            branch_prefix: "ci-cd-assistant".to_string(),
            fork_repo_attempts: 15,
            fork_branch_attempts: 10,
            fork_poll_interval_ms: 2000,
            commit_attempts: 3,
            commit_retry_interval_ms: 1500,
            commit_strategy: CommitStrategy::Contents,
        }
    }
}

impl PipelineConfig {
    pub fn fork_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fork_poll_interval_ms)
    }

    pub fn commit_retry_interval(&self) -> Duration {
        Duration::from_millis(self.commit_retry_interval_ms)
    }

    /// Settings for an HTTP-backed [`cca_forge_client::ForgeClient`]
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.api_base_url.clone(),
            api_version: self.api_version.clone(),
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Reject values that would make a loop never run or never end
    pub fn validate(&self) -> crate::Result<()> {
        let problems: Vec<&str> = [
            (self.fork_repo_attempts == 0, "fork-repo-attempts must be at least 1"),
            (self.fork_branch_attempts == 0, "fork-branch-attempts must be at least 1"),
            (self.commit_attempts == 0, "commit-attempts must be at least 1"),
            (self.branch_prefix.trim_matches('/').is_empty(), "branch-prefix must not be empty"),
            (self.api_base_url.is_empty(), "api-base-url must not be empty"),
        ]
        .into_iter()
        .filter_map(|(bad, message)| bad.then_some(message))
        .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(crate::PipelineError::InvalidInput(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_budgets() {
        let config = PipelineConfig::default();
        assert_eq!(config.fork_repo_attempts, 15);
        assert_eq!(config.fork_branch_attempts, 10);
        assert_eq!(config.commit_attempts, 3);
        assert_eq!(config.branch_prefix, "ci-cd-assistant");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_documents_keep_defaults() {
        let config: PipelineConfig =
            serde_json::from_value(serde_json::json!({"commit-strategy": "git-data", "fork-poll-interval-ms": 10}))
                .unwrap();
        assert_eq!(config.commit_strategy, CommitStrategy::GitData);
        assert_eq!(config.fork_poll_interval(), Duration::from_millis(10));
        assert_eq!(config.commit_attempts, 3);
    }

    #[test]
    fn zero_budgets_are_rejected() {
        let config = PipelineConfig {
            commit_attempts: 0,
            fork_repo_attempts: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("commit-attempts"));
        assert!(err.contains("fork-repo-attempts"));
    }
}
