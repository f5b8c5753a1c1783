// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Pull Request Opener
//!
//! Opening a pull request is not idempotent, so this stage makes exactly one
//! call and never retries.

use cca_forge_client::types::{CreatePullRequest, PullRequest};
use cca_forge_client::{ForgeClient, paths};

use crate::error::{PipelineError, Result};
use crate::model::{AccessDecision, PullRequestResult, RepositoryRef};

/// Title, body and branches of the pull request to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub title: String,
    pub body: String,
    pub branch: String,
    pub base: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PullRequestOpener<'a> {
    client: &'a ForgeClient,
    token: &'a str,
}

impl<'a> PullRequestOpener<'a> {
    pub fn new(client: &'a ForgeClient, token: &'a str) -> Self {
        Self { client, token }
    }

    /// Open the pull request against `upstream`. The head is qualified with
    /// the fork owner when `decision` routed the run through a fork.
    pub async fn open(
        &self,
        upstream: &RepositoryRef,
        decision: &AccessDecision,
        draft: &PullRequestDraft,
    ) -> Result<PullRequestResult> {
        let request = CreatePullRequest {
            title: draft.title.clone(),
            body: draft.body.clone(),
            head: decision.head_ref(&draft.branch),
            base: draft.base.clone(),
        };
        tracing::debug!(repository = %upstream, head = %request.head, base = %request.base, "opening pull request");

        let response = self
            .client
            .post(&paths::pulls(&upstream.owner, &upstream.name), &request, Some(self.token))
            .await?;
        if !response.is_success() {
            let error = PipelineError::from_response(&response);
            tracing::error!(repository = %upstream, head = %request.head, error = %error, "pull request rejected");
            return Err(error);
        }

        let pr: PullRequest = response.json()?;
        tracing::info!(repository = %upstream, number = pr.number, url = %pr.html_url, "opened pull request");
        Ok(PullRequestResult {
            number: pr.number,
            html_url: pr.html_url,
            head_ref: request.head,
            base_ref: pr.base.name,
        })
    }
}
