// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Entry point used by callers that want a migration pull request opened

use std::fmt;
use std::path::{Component, Path};

use cca_forge_client::ForgeClient;
use cca_logging::redact;
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::model::{PipelineOutcome, RepositoryRef, Stage};
use crate::pipeline::ContributionPipeline;

pub const DEFAULT_WORKFLOW_PATH: &str = ".github/workflows/ci-cd-assistant.yml";

/// Everything needed to open one migration pull request
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRequest {
    pub repository: RepositoryRef,
    pub workflow_path: String,
    pub workflow_content: String,
    pub commit_message: String,
    pub pr_title: String,
    pub pr_body: String,
    pub auth_token: String,
}

impl fmt::Debug for MigrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationRequest")
            .field("repository", &self.repository)
            .field("workflow_path", &self.workflow_path)
            .field("workflow_content_len", &self.workflow_content.len())
            .field("commit_message", &self.commit_message)
            .field("pr_title", &self.pr_title)
            .field("auth_token", &redact(&self.auth_token))
            .finish()
    }
}

impl MigrationRequest {
    /// Check the request before any network call is made
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.repository.owner.trim().is_empty() || self.repository.name.trim().is_empty() {
            problems.push("repository owner and name are required".to_string());
        }
        if self.auth_token.trim().is_empty() {
            problems.push("an auth token is required".to_string());
        }
        if self.workflow_content.is_empty() {
            problems.push("workflow content is empty".to_string());
        }
        if self.pr_title.trim().is_empty() {
            problems.push("pull request title is required".to_string());
        }
        if self.commit_message.trim().is_empty() {
            problems.push("commit message is required".to_string());
        }
        if let Some(problem) = path_problem(&self.workflow_path) {
            problems.push(problem);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::InvalidInput(problems.join("; ")))
        }
    }
}

fn path_problem(path: &str) -> Option<String> {
    if path.trim().is_empty() {
        return Some("workflow path is required".to_string());
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Some(format!("workflow path {:?} must be relative to the repository root", path));
    }
    if Path::new(path)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Some(format!("workflow path {:?} must not leave the repository", path));
    }
    if path.ends_with('/') {
        return Some(format!("workflow path {:?} names a directory", path));
    }
    None
}

/// What the caller gets back, serialized as camelCase JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_fork: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl From<&PipelineOutcome> for MigrationResponse {
    fn from(outcome: &PipelineOutcome) -> Self {
        match outcome {
            PipelineOutcome::Success {
                pr_url,
                pr_number,
                used_fork,
                branch_name,
            } => Self {
                ok: true,
                pr_url: Some(pr_url.clone()),
                pr_number: Some(*pr_number),
                used_fork: Some(*used_fork),
                branch_name: Some(branch_name.clone()),
                error: None,
                stage: None,
                hint: None,
            },
            PipelineOutcome::Failure { stage, error } => Self {
                ok: false,
                pr_url: None,
                pr_number: None,
                used_fork: None,
                branch_name: None,
                error: Some(error.to_string()),
                stage: Some(*stage),
                hint: error.hint().map(str::to_string),
            },
        }
    }
}

impl From<PipelineOutcome> for MigrationResponse {
    fn from(outcome: PipelineOutcome) -> Self {
        Self::from(&outcome)
    }
}

/// Open a migration pull request with real-time delays and no cancellation
pub async fn run_migration_pr(
    client: ForgeClient,
    config: PipelineConfig,
    request: &MigrationRequest,
) -> MigrationResponse {
    ContributionPipeline::new(client, config).run(request).await.into()
}
