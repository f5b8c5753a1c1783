// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Values passed between pipeline stages
//!
//! Everything here lives for a single run; nothing is persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A repository on the forge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name`
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        match value.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner, name.trim_end_matches(".git")))
            }
            _ => Err(PipelineError::InvalidInput(format!(
                "expected repository as owner/name, got {:?}",
                value
            ))),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Where the run writes. Decided once per run, after fork resolution, and
/// never revisited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    target: RepositoryRef,
    used_fork: bool,
}

impl AccessDecision {
    /// Write straight into the upstream repository
    pub fn direct(upstream: RepositoryRef) -> Self {
        Self {
            target: upstream,
            used_fork: false,
        }
    }

    /// Write into the viewer's fork
    pub fn via_fork(fork: RepositoryRef) -> Self {
        Self {
            target: fork,
            used_fork: true,
        }
    }

    pub fn target(&self) -> &RepositoryRef {
        &self.target
    }

    pub fn used_fork(&self) -> bool {
        self.used_fork
    }

    /// The `head` value for a pull request from `branch`: owner-qualified
    /// when the branch lives in a fork, bare otherwise
    pub fn head_ref(&self, branch: &str) -> String {
        if self.used_fork {
            format!("{}:{}", self.target.owner, branch)
        } else {
            branch.to_string()
        }
    }
}

/// A branch name and the commit it starts from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub name: String,
    pub base_sha: String,
}

/// One file write. Only constructed from a provisioned [`BranchRef`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub content: String,
    pub branch: String,
    pub commit_message: String,
}

impl FileChange {
    pub fn on_branch(
        branch: &BranchRef,
        path: impl Into<String>,
        content: impl Into<String>,
        commit_message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            branch: branch.name.clone(),
            commit_message: commit_message.into(),
        }
    }
}

/// Provenance of a file write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    /// Set by the git-data strategy
    pub blob_sha: Option<String>,
    pub commit_sha: Option<String>,
    /// Blob SHA of the file as now stored on the branch
    pub content_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestResult {
    pub number: u64,
    pub html_url: String,
    pub head_ref: String,
    pub base_ref: String,
}

/// Pipeline stage, reported with every failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Access,
    Fork,
    Branch,
    Commit,
    Pr,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Access => "access",
            Stage::Fork => "fork",
            Stage::Branch => "branch",
            Stage::Commit => "commit",
            Stage::Pr => "pr",
        };
        f.write_str(name)
    }
}

/// Terminal result of a run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Success {
        pr_url: String,
        pr_number: u64,
        used_fork: bool,
        branch_name: String,
    },
    Failure {
        stage: Stage,
        error: PipelineError,
    },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success { .. })
    }

    /// Human-readable failure reason, if the run failed
    pub fn reason(&self) -> Option<String> {
        match self {
            PipelineOutcome::Success { .. } => None,
            PipelineOutcome::Failure { error, .. } => Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_owner_and_name() {
        assert_eq!(RepositoryRef::parse("acme/widgets").unwrap(), RepositoryRef::new("acme", "widgets"));
        assert_eq!(RepositoryRef::parse(" acme/widgets.git ").unwrap().name, "widgets");
        for bad in ["", "acme", "/widgets", "acme/", "a/b/c"] {
            assert!(RepositoryRef::parse(bad).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn head_ref_is_qualified_only_for_forks() {
        let branch = "ci-cd-assistant/migrate-1";
        let fork = AccessDecision::via_fork(RepositoryRef::new("octo", "widgets"));
        assert_eq!(fork.head_ref(branch), "octo:ci-cd-assistant/migrate-1");

        let direct = AccessDecision::direct(RepositoryRef::new("acme", "widgets"));
        assert_eq!(direct.head_ref(branch), branch);
        assert!(!direct.head_ref(branch).contains(':'));
    }

    #[test]
    fn file_change_targets_the_provisioned_branch() {
        let branch = BranchRef {
            name: "ci-cd-assistant/migrate-1".into(),
            base_sha: "abc123".into(),
        };
        let change = FileChange::on_branch(&branch, "a.yml", "x", "msg");
        assert_eq!(change.branch, branch.name);
    }

    #[test]
    fn stage_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Stage::Pr).unwrap(), "\"pr\"");
        assert_eq!(Stage::Commit.to_string(), "commit");
    }
}
