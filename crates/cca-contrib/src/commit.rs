// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! File Committer
//!
//! Two ways to land a single file on a branch:
//!
//! * the contents API: probe for an existing blob SHA, then `PUT` the new
//!   content (with that SHA when the file exists). A `404` from the `PUT` is
//!   retried a bounded number of times because a fresh fork's file tree lags
//!   behind its refs;
//! * the git-data transaction: blob, tree layered on the branch's current
//!   tree, commit, then a non-force ref update.
//!
//! Either way the branch ends up pointing at a commit whose tree holds the
//! file with the requested content.

use std::time::Duration;

use cca_forge_client::types::{
    ContentFile, CreateBlobRequest, CreateCommitRequest, CreateTreeRequest, GitCommit, GitRef,
    PutContentRequest, PutContentResponse, Sha, TreeEntry, UpdateRefRequest, encode_content,
};
use cca_forge_client::{ForgeClient, paths};
use tokio_util::sync::CancellationToken;

use crate::config::{CommitStrategy, PipelineConfig};
use crate::delay::{Delay, ensure_active, pause};
use crate::error::{PipelineError, Result};
use crate::model::{CommitResult, FileChange, RepositoryRef};

/// Files under this prefix need an extra token scope to write
pub const WORKFLOW_DIR: &str = ".github/workflows/";

pub fn is_workflow_path(path: &str) -> bool {
    path.trim_start_matches('/').starts_with(WORKFLOW_DIR)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPolicy {
    pub attempts: u32,
    pub interval: Duration,
    pub strategy: CommitStrategy,
}

impl From<&PipelineConfig> for CommitPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            attempts: config.commit_attempts,
            interval: config.commit_retry_interval(),
            strategy: config.commit_strategy,
        }
    }
}

pub struct FileCommitter<'a> {
    client: &'a ForgeClient,
    token: &'a str,
    delay: &'a dyn Delay,
    cancel: &'a CancellationToken,
    policy: CommitPolicy,
}

impl<'a> FileCommitter<'a> {
    pub fn new(
        client: &'a ForgeClient,
        token: &'a str,
        delay: &'a dyn Delay,
        cancel: &'a CancellationToken,
        policy: CommitPolicy,
    ) -> Self {
        Self {
            client,
            token,
            delay,
            cancel,
            policy,
        }
    }

    /// Write `change` into `target` using the configured strategy
    pub async fn commit(&self, target: &RepositoryRef, change: &FileChange) -> Result<CommitResult> {
        match self.policy.strategy {
            CommitStrategy::Contents => self.commit_contents(target, change).await,
            CommitStrategy::GitData => self.commit_git_data(target, change).await,
            CommitStrategy::Auto => match self.commit_contents(target, change).await {
                Err(PipelineError::UnknownHost { status, message }) if status != 404 => {
                    tracing::warn!(
                        repository = %target,
                        path = %change.path,
                        status,
                        error = %message,
                        "contents API write failed, retrying as a git-data transaction"
                    );
                    self.commit_git_data(target, change).await
                }
                other => other,
            },
        }
    }

    /// Blob SHA of the file at `change.path` on `change.branch`, if present
    pub async fn existing_sha(&self, target: &RepositoryRef, change: &FileChange) -> Result<Option<String>> {
        let path = paths::contents_at(&target.owner, &target.name, &change.path, &change.branch);
        let response = self.client.get(&path, Some(self.token)).await?;
        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(PipelineError::from_response_for_path(&response, Some(&change.path)));
        }
        // A directory listing comes back as an array and has no single SHA.
        match response.json::<ContentFile>() {
            Ok(file) => Ok(Some(file.sha)),
            Err(_) => Err(PipelineError::InvalidInput(format!(
                "{} is a directory on {}",
                change.path, change.branch
            ))),
        }
    }

    /// Single-call replace through the contents API
    pub async fn commit_contents(&self, target: &RepositoryRef, change: &FileChange) -> Result<CommitResult> {
        let put_path = paths::contents(&target.owner, &target.name, &change.path);
        let mut last_message = String::new();

        for attempt in 1..=self.policy.attempts {
            ensure_active(self.cancel, "committing the file")?;

            let sha = self.existing_sha(target, change).await?;
            let request = PutContentRequest {
                message: change.commit_message.clone(),
                content: encode_content(&change.content),
                branch: change.branch.clone(),
                sha: sha.clone(),
            };
            let response = self.client.put(&put_path, &request, Some(self.token)).await?;

            if response.is_success() {
                let written: PutContentResponse = response.json()?;
                tracing::info!(
                    repository = %target,
                    path = %change.path,
                    branch = %change.branch,
                    replaced = sha.is_some(),
                    attempt,
                    "committed file"
                );
                return Ok(CommitResult {
                    blob_sha: None,
                    commit_sha: Some(written.commit.sha),
                    content_sha: written.content.sha,
                });
            }
            if !response.is_not_found() {
                return Err(PipelineError::from_response_for_path(&response, Some(&change.path)));
            }

            last_message = response.detail();
            tracing::debug!(
                repository = %target,
                path = %change.path,
                attempt,
                attempts = self.policy.attempts,
                "contents write returned 404"
            );
            if attempt < self.policy.attempts {
                pause(self.delay, self.policy.interval, self.cancel, "waiting to retry the file commit").await?;
            }
        }

        tracing::error!(
            repository = %target,
            path = %change.path,
            attempts = self.policy.attempts,
            "file commit still returned 404 after all attempts"
        );
        Err(not_found_after_retries(&change.path, last_message))
    }

    /// blob → tree → commit → ref update
    pub async fn commit_git_data(&self, target: &RepositoryRef, change: &FileChange) -> Result<CommitResult> {
        let (owner, name) = (target.owner.as_str(), target.name.as_str());
        // Only a write can be refused for a missing scope. A 404 reading the
        // branch or its head commit means the ref is not there.
        let read_failed = |response: &cca_forge_client::ApiResponse| {
            PipelineError::from_response_for_path(response, Some(&change.path))
        };
        let write_failed = |response: &cca_forge_client::ApiResponse| {
            if response.is_not_found() && is_workflow_path(&change.path) {
                not_found_after_retries(&change.path, response.detail())
            } else {
                read_failed(response)
            }
        };

        ensure_active(self.cancel, "creating the file blob")?;
        let response = self
            .client
            .post(&paths::blobs(owner, name), &CreateBlobRequest::base64(&change.content), Some(self.token))
            .await?;
        if !response.is_success() {
            return Err(write_failed(&response));
        }
        let blob: Sha = response.json()?;

        ensure_active(self.cancel, "reading the branch head")?;
        let response = self
            .client
            .get(&paths::branch_ref(owner, name, &change.branch), Some(self.token))
            .await?;
        if !response.is_success() {
            return Err(read_failed(&response));
        }
        let head = response.json::<GitRef>()?.object.sha;

        let response = self.client.get(&paths::commit(owner, name, &head), Some(self.token)).await?;
        if !response.is_success() {
            return Err(read_failed(&response));
        }
        let base_tree = response.json::<GitCommit>()?.tree.sha;

        ensure_active(self.cancel, "creating the tree")?;
        let tree_request = CreateTreeRequest {
            base_tree,
            tree: vec![TreeEntry::file(change.path.trim_start_matches('/'), blob.sha.clone())],
        };
        let response = self
            .client
            .post(&paths::trees(owner, name), &tree_request, Some(self.token))
            .await?;
        if !response.is_success() {
            return Err(write_failed(&response));
        }
        let tree: Sha = response.json()?;

        let commit_request = CreateCommitRequest {
            message: change.commit_message.clone(),
            tree: tree.sha,
            parents: vec![head.clone()],
        };
        let response = self
            .client
            .post(&paths::commits(owner, name), &commit_request, Some(self.token))
            .await?;
        if !response.is_success() {
            return Err(write_failed(&response));
        }
        let commit: Sha = response.json()?;

        ensure_active(self.cancel, "updating the branch")?;
        let update = UpdateRefRequest {
            sha: commit.sha.clone(),
            force: false,
        };
        let response = self
            .client
            .patch(&paths::update_branch_ref(owner, name, &change.branch), &update, Some(self.token))
            .await?;
        if !response.is_success() {
            return Err(write_failed(&response));
        }

        tracing::info!(
            repository = %target,
            path = %change.path,
            branch = %change.branch,
            parent = %head,
            commit = %commit.sha,
            "committed file through git data"
        );
        Ok(CommitResult {
            content_sha: blob.sha.clone(),
            blob_sha: Some(blob.sha),
            commit_sha: Some(commit.sha),
        })
    }
}

/// A 404 that outlived the retries. On a workflow path the host is hiding a
/// missing token scope behind it.
fn not_found_after_retries(path: &str, message: String) -> PipelineError {
    if is_workflow_path(path) {
        PipelineError::PermissionScope {
            path: path.to_string(),
            message: if message.is_empty() {
                "Not Found".to_string()
            } else {
                message
            },
        }
    } else {
        PipelineError::UnknownHost { status: 404, message }
    }
}
