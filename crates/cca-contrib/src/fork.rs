// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fork Convergence Manager
//!
//! A freshly requested fork is not immediately usable: the repository shows
//! up first, and its refs some time later. The manager walks an explicit
//! state machine:
//!
//! ```text
//! ABSENT ──request──▶ CREATING ──▶ CONVERGING(repo hidden) ──visible──▶ CONVERGING(repo visible) ──ref readable──▶ READY
//!                                        │ budget exhausted                      │ budget exhausted
//!                                        ▼                                       ▼
//!                                     FAILED                          READY (branch not yet visible)
//! ```
//!
//! An existing fork enters at CONVERGING with the repository already known
//! to be visible. Both polling loops use a fixed interval and their own
//! attempt budget. Running out of ref polls is tolerated because branch
//! creation is itself idempotent and can be retried; running out of
//! repository polls is fatal.

use std::time::Duration;

use cca_forge_client::types::Repository;
use cca_forge_client::{ForgeClient, paths};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::delay::{Delay, ensure_active, pause};
use crate::error::{PipelineError, Result};
use crate::model::RepositoryRef;

/// Attempt budgets and poll interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkPolicy {
    pub repo_attempts: u32,
    pub branch_attempts: u32,
    pub interval: Duration,
}

impl From<&PipelineConfig> for ForkPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            repo_attempts: config.fork_repo_attempts,
            branch_attempts: config.fork_branch_attempts,
            interval: config.fork_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForkState {
    Absent,
    Creating,
    Converging {
        fork: RepositoryRef,
        repo_visible: bool,
    },
    Ready {
        fork: RepositoryRef,
        branch_visible: bool,
    },
    Failed,
}

/// State names, for recording the path a run took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkPhase {
    Absent,
    Creating,
    Converging,
    Ready,
    Failed,
}

impl ForkState {
    pub fn phase(&self) -> ForkPhase {
        match self {
            ForkState::Absent => ForkPhase::Absent,
            ForkState::Creating => ForkPhase::Creating,
            ForkState::Converging { .. } => ForkPhase::Converging,
            ForkState::Ready { .. } => ForkPhase::Ready,
            ForkState::Failed => ForkPhase::Failed,
        }
    }
}

/// A fork that is ready to receive a branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkOutcome {
    pub fork: RepositoryRef,
    /// Whether this run requested the fork
    pub created: bool,
    /// False when the ref-poll budget ran out while the repository was visible
    pub branch_visible: bool,
    /// Phases visited, in order
    pub phases: Vec<ForkPhase>,
}

pub struct ForkConvergenceManager<'a> {
    client: &'a ForgeClient,
    token: &'a str,
    delay: &'a dyn Delay,
    cancel: &'a CancellationToken,
    policy: ForkPolicy,
}

impl<'a> ForkConvergenceManager<'a> {
    pub fn new(
        client: &'a ForgeClient,
        token: &'a str,
        delay: &'a dyn Delay,
        cancel: &'a CancellationToken,
        policy: ForkPolicy,
    ) -> Self {
        Self {
            client,
            token,
            delay,
            cancel,
            policy,
        }
    }

    /// Make sure `viewer` has a readable fork of `upstream` whose copy of
    /// `default_branch` can be read
    pub async fn ensure_fork(
        &self,
        upstream: &RepositoryRef,
        viewer: &str,
        default_branch: &str,
    ) -> Result<ForkOutcome> {
        let mut state = match self.find_existing(upstream, viewer).await? {
            Some(fork) => {
                tracing::info!(fork = %fork, "reusing existing fork");
                ForkState::Converging {
                    fork,
                    repo_visible: true,
                }
            }
            None => ForkState::Absent,
        };

        let mut phases = vec![state.phase()];
        let mut requested: Option<RepositoryRef> = None;

        loop {
            state = match state {
                ForkState::Absent => {
                    let fork = self.request_fork(upstream, viewer).await?;
                    requested = Some(fork);
                    ForkState::Creating
                }
                ForkState::Creating => match requested.clone() {
                    Some(fork) => ForkState::Converging {
                        fork,
                        repo_visible: false,
                    },
                    None => ForkState::Failed,
                },
                ForkState::Converging {
                    fork,
                    repo_visible: false,
                } => {
                    if self.await_repository(&fork).await? {
                        ForkState::Converging {
                            fork,
                            repo_visible: true,
                        }
                    } else {
                        phases.push(ForkPhase::Failed);
                        tracing::error!(fork = %fork, attempts = self.policy.repo_attempts, "fork never became visible");
                        return Err(PipelineError::ConvergenceTimeout {
                            fork: fork.full_name(),
                            attempts: self.policy.repo_attempts,
                        });
                    }
                }
                ForkState::Converging {
                    fork,
                    repo_visible: true,
                } => {
                    let branch_visible = self.await_branch(&fork, default_branch).await?;
                    if !branch_visible {
                        tracing::warn!(
                            fork = %fork,
                            branch = default_branch,
                            attempts = self.policy.branch_attempts,
                            "fork is visible but its default branch is not yet readable; continuing"
                        );
                    }
                    ForkState::Ready { fork, branch_visible }
                }
                ForkState::Ready { fork, branch_visible } => {
                    tracing::info!(fork = %fork, branch_visible, "fork ready");
                    return Ok(ForkOutcome {
                        fork,
                        created: requested.is_some(),
                        branch_visible,
                        phases,
                    });
                }
                ForkState::Failed => {
                    return Err(PipelineError::UnknownHost {
                        status: 0,
                        message: "fork request returned no repository".to_string(),
                    });
                }
            };
            if phases.last() != Some(&state.phase()) {
                phases.push(state.phase());
            }
        }
    }

    /// The viewer's fork of `upstream`, if one already exists under the
    /// upstream's name
    async fn find_existing(&self, upstream: &RepositoryRef, viewer: &str) -> Result<Option<RepositoryRef>> {
        ensure_active(self.cancel, "looking for an existing fork")?;
        let response = self
            .client
            .get(&paths::repository(viewer, &upstream.name), Some(self.token))
            .await?;
        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(PipelineError::from_response(&response));
        }
        let repository: Repository = response.json()?;
        if repository.is_fork_of(&upstream.full_name()) {
            Ok(Some(RepositoryRef::new(repository.owner.login, repository.name)))
        } else {
            tracing::info!(
                candidate = %repository.full_name,
                upstream = %upstream,
                "repository with the upstream's name is not a fork of it"
            );
            Ok(None)
        }
    }

    /// Ask the host to fork. 202 (accepted, asynchronous) and any other 2xx
    /// both mean creation has started.
    async fn request_fork(&self, upstream: &RepositoryRef, viewer: &str) -> Result<RepositoryRef> {
        ensure_active(self.cancel, "requesting a fork")?;
        let response = self
            .client
            .post(
                &paths::forks(&upstream.owner, &upstream.name),
                &serde_json::json!({}),
                Some(self.token),
            )
            .await?;
        if !response.is_success() {
            return Err(PipelineError::from_response(&response));
        }

        // The host may rename the fork on a name collision; trust its answer.
        let fork = match response.json::<Repository>() {
            Ok(repo) => RepositoryRef::new(repo.owner.login, repo.name),
            Err(_) => RepositoryRef::new(viewer, upstream.name.clone()),
        };
        tracing::info!(upstream = %upstream, fork = %fork, status = response.status, "fork creation initiated");
        Ok(fork)
    }

    /// Poll until the fork repository is readable. `false` when the budget
    /// runs out.
    async fn await_repository(&self, fork: &RepositoryRef) -> Result<bool> {
        let path = paths::repository(&fork.owner, &fork.name);
        for attempt in 1..=self.policy.repo_attempts {
            ensure_active(self.cancel, "waiting for the fork repository")?;
            let response = self.client.get(&path, Some(self.token)).await?;
            if response.is_success() {
                tracing::debug!(fork = %fork, attempt, "fork repository visible");
                return Ok(true);
            }
            if !response.is_not_found() {
                return Err(PipelineError::from_response(&response));
            }
            tracing::debug!(fork = %fork, attempt, "fork repository not visible yet");
            if attempt < self.policy.repo_attempts {
                pause(self.delay, self.policy.interval, self.cancel, "waiting for the fork repository").await?;
            }
        }
        Ok(false)
    }

    /// Poll until the fork's copy of `branch` is readable. `false` when the
    /// budget runs out.
    async fn await_branch(&self, fork: &RepositoryRef, branch: &str) -> Result<bool> {
        let path = paths::branch_ref(&fork.owner, &fork.name, branch);
        for attempt in 1..=self.policy.branch_attempts {
            ensure_active(self.cancel, "waiting for the fork's default branch")?;
            let response = self.client.get(&path, Some(self.token)).await?;
            if response.is_success() {
                tracing::debug!(fork = %fork, branch, attempt, "fork branch readable");
                return Ok(true);
            }
            if !response.is_not_found() {
                return Err(PipelineError::from_response(&response));
            }
            tracing::debug!(fork = %fork, branch, attempt, "fork branch not readable yet");
            if attempt < self.policy.branch_attempts {
                pause(self.delay, self.policy.interval, self.cancel, "waiting for the fork's default branch")
                    .await?;
            }
        }
        Ok(false)
    }
}
