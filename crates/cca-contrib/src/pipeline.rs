// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Pipeline Orchestrator

use std::sync::Arc;

use cca_forge_client::ForgeClient;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::access::AccessResolver;
use crate::branch::{BranchProvisioner, read_branch_sha};
use crate::commit::{CommitPolicy, FileCommitter};
use crate::config::PipelineConfig;
use crate::delay::{Delay, TokioDelay, ensure_active};
use crate::error::{AtStage, PipelineError, StageFailure};
use crate::fork::{ForkConvergenceManager, ForkPolicy};
use crate::model::{AccessDecision, BranchRef, FileChange, PipelineOutcome, Stage};
use crate::pull_request::{PullRequestDraft, PullRequestOpener};
use crate::request::MigrationRequest;

/// `{prefix}/migrate-{unix millis}`
pub fn branch_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}/migrate-{}", prefix.trim_matches('/'), now.timestamp_millis())
}

/// Runs access → fork → branch → commit → pull request for one request.
///
/// Holds no per-run state, so one pipeline can serve concurrent runs.
#[derive(Debug, Clone)]
pub struct ContributionPipeline {
    client: ForgeClient,
    config: PipelineConfig,
    delay: Arc<dyn Delay>,
    cancel: CancellationToken,
    fixed_time: Option<DateTime<Utc>>,
}

impl ContributionPipeline {
    pub fn new(client: ForgeClient, config: PipelineConfig) -> Self {
        Self {
            client,
            config,
            delay: Arc::new(TokioDelay),
            cancel: CancellationToken::new(),
            fixed_time: None,
        }
    }

    /// Replace the sleep used between polls and retries
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Pin the timestamp used in generated branch names
    pub fn with_fixed_time(mut self, now: DateTime<Utc>) -> Self {
        self.fixed_time = Some(now);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn client(&self) -> &ForgeClient {
        &self.client
    }

    /// Run the whole pipeline. Never panics on host behavior; every failure
    /// becomes [`PipelineOutcome::Failure`] naming the stage it stopped.
    pub async fn run(&self, request: &MigrationRequest) -> PipelineOutcome {
        match self.try_run(request).await {
            Ok(outcome) => outcome,
            Err(StageFailure { stage, error }) => {
                tracing::error!(
                    repository = %request.repository,
                    %stage,
                    error = %error,
                    "contribution pipeline failed"
                );
                PipelineOutcome::Failure { stage, error }
            }
        }
    }

    async fn try_run(&self, request: &MigrationRequest) -> Result<PipelineOutcome, StageFailure> {
        request.validate().at(Stage::Access)?;
        self.config.validate().at(Stage::Access)?;

        let token = request.auth_token.as_str();
        let upstream = &request.repository;
        let delay = self.delay.as_ref();

        tracing::info!(repository = %upstream, path = %request.workflow_path, "starting contribution pipeline");

        // access
        ensure_active(&self.cancel, "resolving access").at(Stage::Access)?;
        let access = AccessResolver::new(&self.client, token)
            .resolve(upstream)
            .await
            .at(Stage::Access)?;
        let base_branch = access.default_branch().to_string();

        // fork
        let decision = if access.can_push_direct {
            tracing::info!(repository = %upstream, "direct push allowed, no fork needed");
            AccessDecision::direct(upstream.clone())
        } else {
            let outcome = ForkConvergenceManager::new(
                &self.client,
                token,
                delay,
                &self.cancel,
                ForkPolicy::from(&self.config),
            )
            .ensure_fork(upstream, &access.viewer, &base_branch)
            .await
            .at(Stage::Fork)?;
            AccessDecision::via_fork(outcome.fork)
        };
        let target = decision.target();

        // branch
        ensure_active(&self.cancel, "provisioning the branch").at(Stage::Branch)?;
        let base_sha = read_branch_sha(&self.client, token, upstream, &base_branch)
            .await
            .at(Stage::Branch)?
            .ok_or_else(|| {
                PipelineError::UnknownHost {
                    status: 404,
                    message: format!("default branch {} of {} is not readable", base_branch, upstream),
                }
                .at(Stage::Branch)
            })?;
        let branch = BranchRef {
            name: branch_name(&self.config.branch_prefix, self.fixed_time.unwrap_or_else(Utc::now)),
            base_sha,
        };
        BranchProvisioner::new(&self.client, token)
            .provision(target, &branch)
            .await
            .at(Stage::Branch)?;

        // commit
        let change = FileChange::on_branch(
            &branch,
            request.workflow_path.trim_start_matches('/'),
            request.workflow_content.clone(),
            request.commit_message.clone(),
        );
        FileCommitter::new(&self.client, token, delay, &self.cancel, CommitPolicy::from(&self.config))
            .commit(target, &change)
            .await
            .at(Stage::Commit)?;

        // pr
        ensure_active(&self.cancel, "opening the pull request").at(Stage::Pr)?;
        let draft = PullRequestDraft {
            title: request.pr_title.clone(),
            body: request.pr_body.clone(),
            branch: branch.name.clone(),
            base: base_branch,
        };
        let pr = PullRequestOpener::new(&self.client, token)
            .open(upstream, &decision, &draft)
            .await
            .at(Stage::Pr)?;

        tracing::info!(
            repository = %upstream,
            pr = %pr.html_url,
            used_fork = decision.used_fork(),
            branch = %branch.name,
            "contribution pipeline finished"
        );
        Ok(PipelineOutcome::Success {
            pr_url: pr.html_url,
            pr_number: pr.number,
            used_fork: decision.used_fork(),
            branch_name: branch.name,
        })
    }
}
