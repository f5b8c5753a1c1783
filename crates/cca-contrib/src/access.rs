// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Access Resolver
//!
//! Determines who the token belongs to and whether that identity can push to
//! the upstream repository. No retries: a repository that cannot be read ends
//! the run.

use cca_forge_client::types::{Repository, Viewer};
use cca_forge_client::{ForgeClient, paths};

use crate::error::{PipelineError, Result};
use crate::model::RepositoryRef;

/// What the resolver learned about the upstream repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryAccess {
    pub viewer: String,
    pub repository: Repository,
    pub can_push_direct: bool,
}

impl RepositoryAccess {
    pub fn default_branch(&self) -> &str {
        &self.repository.default_branch
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AccessResolver<'a> {
    client: &'a ForgeClient,
    token: &'a str,
}

impl<'a> AccessResolver<'a> {
    pub fn new(client: &'a ForgeClient, token: &'a str) -> Self {
        Self { client, token }
    }

    /// Login of the authenticated identity
    pub async fn viewer(&self) -> Result<String> {
        let response = self.client.get(&paths::user(), Some(self.token)).await?;
        if !response.is_success() {
            return Err(match PipelineError::from_response(&response) {
                PipelineError::UnknownHost { status, message } => PipelineError::AccessDenied {
                    message: format!("could not resolve the authenticated user ({}): {}", status, message),
                },
                other => other,
            });
        }
        Ok(response.json::<Viewer>()?.login)
    }

    /// Repository metadata plus the push-permission verdict
    pub async fn repository(&self, repo: &RepositoryRef) -> Result<Repository> {
        let response = self
            .client
            .get(&paths::repository(&repo.owner, &repo.name), Some(self.token))
            .await?;
        if response.is_not_found() {
            return Err(PipelineError::AccessDenied {
                message: format!("repository {} was not found or is not readable with this token", repo),
            });
        }
        if !response.is_success() {
            return Err(PipelineError::from_response(&response));
        }
        Ok(response.json::<Repository>()?)
    }

    /// Resolve viewer and push access for `repo`
    pub async fn resolve(&self, repo: &RepositoryRef) -> Result<RepositoryAccess> {
        let viewer = self.viewer().await?;
        let repository = self.repository(repo).await?;
        let can_push_direct = repository.can_push();
        tracing::info!(
            repository = %repo,
            viewer = %viewer,
            can_push_direct,
            default_branch = %repository.default_branch,
            "resolved repository access"
        );
        Ok(RepositoryAccess {
            viewer,
            repository,
            can_push_direct,
        })
    }
}
