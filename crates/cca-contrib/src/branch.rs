// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Branch Provisioner
//!
//! Creating a branch that already exists counts as success, so a rerun after
//! a partial failure picks up where the previous run stopped. The host
//! answers 422 for other validation failures too (an unknown base SHA, a
//! malformed ref name), so a 422 only counts as "exists" once the ref reads
//! back.

use cca_forge_client::types::{CreateRefRequest, GitRef};
use cca_forge_client::{ForgeClient, paths};

use crate::error::{PipelineError, Result};
use crate::model::{BranchRef, RepositoryRef};

/// How a provisioning call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchProvision {
    Created,
    /// The host answered 422 and the ref reads back
    AlreadyExists,
}

/// Commit SHA that `branch` points to, or `None` if the ref is not readable
pub async fn read_branch_sha(
    client: &ForgeClient,
    token: &str,
    repo: &RepositoryRef,
    branch: &str,
) -> Result<Option<String>> {
    let response = client
        .get(&paths::branch_ref(&repo.owner, &repo.name, branch), Some(token))
        .await?;
    if response.is_not_found() {
        return Ok(None);
    }
    if !response.is_success() {
        return Err(PipelineError::from_response(&response));
    }
    Ok(Some(response.json::<GitRef>()?.object.sha))
}

#[derive(Debug, Clone, Copy)]
pub struct BranchProvisioner<'a> {
    client: &'a ForgeClient,
    token: &'a str,
}

impl<'a> BranchProvisioner<'a> {
    pub fn new(client: &'a ForgeClient, token: &'a str) -> Self {
        Self { client, token }
    }

    /// Create `branch` at its base SHA in `target`
    pub async fn provision(&self, target: &RepositoryRef, branch: &BranchRef) -> Result<BranchProvision> {
        let request = CreateRefRequest {
            name: format!("refs/heads/{}", branch.name),
            sha: branch.base_sha.clone(),
        };
        let response = self
            .client
            .post(&paths::refs(&target.owner, &target.name), &request, Some(self.token))
            .await?;

        match response.status {
            status if (200..300).contains(&status) => {
                tracing::info!(repository = %target, branch = %branch.name, base = %branch.base_sha, "created branch");
                Ok(BranchProvision::Created)
            }
            422 => match read_branch_sha(self.client, self.token, target, &branch.name).await? {
                Some(head) => {
                    tracing::info!(
                        repository = %target,
                        branch = %branch.name,
                        head = %head,
                        detail = %response.detail(),
                        "branch already exists, reusing it"
                    );
                    Ok(BranchProvision::AlreadyExists)
                }
                None => {
                    tracing::warn!(
                        repository = %target,
                        branch = %branch.name,
                        detail = %response.detail(),
                        "branch creation rejected"
                    );
                    Err(PipelineError::from_response(&response))
                }
            },
            _ => Err(PipelineError::from_response(&response)),
        }
    }
}
