// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Contribution pipeline
//!
//! Takes one desired file change (repository, path, content, commit message,
//! pull request text) and lands it as a pull request against a forge whose
//! API is eventually consistent, rate limited and not transactional.
//!
//! The stages run strictly in sequence, each one a request/response round
//! trip through [`cca_forge_client::ForgeClient`]:
//!
//! 1. [`access`] resolves the viewer and whether it can push directly
//! 2. [`fork`] creates or reuses a personal fork and waits for it to converge
//! 3. [`branch`] provisions the working branch (idempotent)
//! 4. [`commit`] writes the file with the contents API or a git-data transaction
//! 5. [`pull_request`] opens the pull request against the upstream
//!
//! [`pipeline::ContributionPipeline`] sequences them and folds any failure
//! into a [`model::PipelineOutcome`] naming the stage that failed. Retrying a
//! failed run is safe: existing forks, branches and files are reused.

pub mod access;
pub mod branch;
pub mod commit;
pub mod config;
pub mod delay;
pub mod error;
pub mod fork;
pub mod model;
pub mod pipeline;
pub mod pull_request;
pub mod request;

pub use config::{CommitStrategy, PipelineConfig};
pub use delay::{Delay, TokioDelay};
pub use error::{PipelineError, Result};
pub use model::*;
pub use pipeline::ContributionPipeline;
pub use request::{MigrationRequest, MigrationResponse, run_migration_pr};

pub use tokio_util::sync::CancellationToken;
