// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory forge for testing
//!
//! [`MockForge`] implements [`cca_forge_client::Transport`] and answers the
//! REST calls the contribution pipeline makes: repositories with push
//! permissions, forks that take a configurable number of reads to become
//! visible, refs, the contents API, git blobs/trees/commits and pull
//! requests. Every request is recorded, and [`ScriptedFailure`]s can be
//! queued to make specific calls fail. [`RecordingDelay`] and
//! [`ImmediateDelay`] stand in for real time in the pipeline's polling loops.

mod delay;
mod script;
mod state;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use cca_forge_client::{ApiRequest, ForgeClient, ForgeResult, RawResponse, Transport};
use percent_encoding::percent_decode_str;

pub use delay::{ImmediateDelay, RecordingDelay};
pub use script::{RecordedCall, ScriptedFailure};
pub use state::MockPullRequest;

use state::{ForgeState, RepoRecord, key};

/// Base URL to hand to [`ForgeClient::new`] together with a [`MockForge`]
pub const BASE_URL: &str = "https://forge.mock/api";

/// Shared handle to one simulated forge. Clones see the same state.
#[derive(Debug, Clone)]
pub struct MockForge {
    state: Arc<Mutex<ForgeState>>,
}

impl MockForge {
    /// A forge where `viewer` is the authenticated identity
    pub fn new(viewer: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(ForgeState::new(viewer))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ForgeState> {
        // A panicking test must not cascade into every other assertion.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A [`ForgeClient`] that talks to this forge
    pub fn client(&self) -> ForgeResult<ForgeClient> {
        ForgeClient::new(Arc::new(self.clone()), BASE_URL)
    }

    /// Add `owner/name` whose `default_branch` points at `head_sha`. The
    /// viewer can read it but not push to it.
    pub fn with_repository(self, owner: &str, name: &str, default_branch: &str, head_sha: &str) -> Self {
        {
            let mut state = self.lock();
            state.store_root_commit(head_sha);
            let mut branches = std::collections::BTreeMap::new();
            branches.insert(default_branch.to_string(), head_sha.to_string());
            state.repos.insert(
                key(owner, name),
                RepoRecord {
                    owner: owner.to_string(),
                    name: name.to_string(),
                    default_branch: default_branch.to_string(),
                    parent: None,
                    push: false,
                    hidden_reads: 0,
                    hidden_ref_reads: 0,
                    branches,
                },
            );
        }
        self
    }

    /// Grant the viewer push access to `full_name`
    pub fn with_push_access(self, full_name: &str) -> Self {
        if let Some(repo) = self.lock().repos.get_mut(&full_name.to_ascii_lowercase()) {
            repo.push = true;
        }
        self
    }

    /// Commit a file onto an existing branch
    pub fn with_file(self, full_name: &str, branch: &str, path: &str, content: &str) -> Self {
        self.lock().write_file(
            &full_name.to_ascii_lowercase(),
            branch,
            path,
            content.to_string(),
            "seed file",
        );
        self
    }

    /// An already converged fork of `upstream` owned by the viewer
    pub fn with_existing_fork(self, upstream: &str) -> Self {
        {
            let mut state = self.lock();
            let viewer = state.viewer.clone();
            if let Some(source) = state.repos.get(&upstream.to_ascii_lowercase()).cloned() {
                state.repos.insert(
                    key(&viewer, &source.name),
                    RepoRecord {
                        owner: viewer.clone(),
                        name: source.name.clone(),
                        default_branch: source.default_branch.clone(),
                        parent: Some(source.full_name()),
                        push: true,
                        hidden_reads: 0,
                        hidden_ref_reads: 0,
                        branches: source.branches.clone(),
                    },
                );
            }
        }
        self
    }

    /// A repository owned by the viewer that shares `name` with some
    /// upstream but is not a fork of it
    pub fn with_unrelated_viewer_repository(self, name: &str, head_sha: &str) -> Self {
        let viewer = self.lock().viewer.clone();
        self.with_repository(&viewer, name, "main", head_sha)
    }

    /// Forks created from now on answer 404 to their first `repo_reads`
    /// repository reads and, after that, to their first `ref_reads` ref reads
    pub fn with_fork_lag(self, repo_reads: u32, ref_reads: u32) -> Self {
        self.lock().fork_lag = (repo_reads, ref_reads);
        self
    }

    /// Writes under `.github/workflows/` answer 404, like a token without the
    /// workflow scope
    pub fn without_workflow_scope(self) -> Self {
        self.lock().workflow_scope = false;
        self
    }

    pub fn with_failure(self, failure: ScriptedFailure) -> Self {
        self.fail(failure);
        self
    }

    /// Queue a failure for matching requests
    pub fn fail(&self, failure: ScriptedFailure) {
        self.lock().failures.push(failure);
    }

    pub fn viewer(&self) -> String {
        self.lock().viewer.clone()
    }

    /// Every request received so far, oldest first
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Requests whose method matches and whose decoded path contains
    /// `path_fragment`
    pub fn count(&self, method: &str, path_fragment: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.matches(method, path_fragment))
            .count()
    }

    pub fn has_repository(&self, full_name: &str) -> bool {
        self.lock().repos.contains_key(&full_name.to_ascii_lowercase())
    }

    pub fn branch_sha(&self, full_name: &str, branch: &str) -> Option<String> {
        self.lock()
            .repos
            .get(&full_name.to_ascii_lowercase())
            .and_then(|r| r.branches.get(branch).cloned())
    }

    /// Content of `path` at the tip of `branch`
    pub fn file(&self, full_name: &str, branch: &str, path: &str) -> Option<String> {
        self.lock().file(&full_name.to_ascii_lowercase(), branch, path)
    }

    /// Parents of commit `sha`
    pub fn commit_parents(&self, sha: &str) -> Vec<String> {
        self.lock()
            .commits
            .get(sha)
            .map(|c| c.parents.clone())
            .unwrap_or_default()
    }

    pub fn pull_requests(&self) -> Vec<MockPullRequest> {
        self.lock().pulls.clone()
    }
}

/// Path of `url` relative to [`BASE_URL`], split and percent-decoded
fn decoded_segments(url: &url::Url) -> Vec<String> {
    let base_path = BASE_URL.split_once("//").map_or("", |(_, rest)| {
        rest.find('/').map_or("", |i| &rest[i..])
    });
    let path = url.path().strip_prefix(base_path).unwrap_or(url.path());
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
        .collect()
}

#[async_trait]
impl Transport for MockForge {
    async fn send(&self, request: ApiRequest) -> ForgeResult<RawResponse> {
        let method = request.method.as_str().to_ascii_uppercase();
        let segments = decoded_segments(&request.url);
        let path = format!("/{}", segments.join("/"));
        let query: HashMap<String, String> = request.url.query_pairs().into_owned().collect();

        let mut state = self.lock();
        state.calls.push(RecordedCall {
            method: method.clone(),
            path: path.clone(),
            query: request.url.query().map(str::to_string),
            body: request.body.clone(),
            authorization: request.header("authorization").map(str::to_string),
        });

        if let Some(failure) = state.take_failure(&method, &path) {
            tracing::debug!(%method, %path, "mock forge replaying scripted failure");
            return failure.reply();
        }
        if request.header("authorization").is_none() {
            return Ok(state::reply(401, serde_json::json!({ "message": "Requires authentication" })));
        }

        let response = state.route(&method, &segments, &query, request.body.as_ref());
        tracing::debug!(%method, %path, status = response.status, "mock forge answered");
        Ok(response)
    }
}
