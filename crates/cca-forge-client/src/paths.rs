// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Endpoint path builders
//!
//! Every user-supplied segment (owner, repository, branch, file path) is
//! percent-encoded; `/` separators inside branch names and file paths are kept.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters left as-is in a path segment (RFC 3986 unreserved)
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Encode a single path segment
pub fn segment(value: &str) -> String {
    utf8_percent_encode(value, SEGMENT).to_string()
}

/// Encode a slash-separated path, segment by segment
pub fn nested(value: &str) -> String {
    value
        .split('/')
        .filter(|part| !part.is_empty())
        .map(segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn repo_base(owner: &str, repo: &str) -> String {
    format!("/repos/{}/{}", segment(owner), segment(repo))
}

pub fn user() -> String {
    "/user".to_string()
}

pub fn repository(owner: &str, repo: &str) -> String {
    repo_base(owner, repo)
}

pub fn forks(owner: &str, repo: &str) -> String {
    format!("{}/forks", repo_base(owner, repo))
}

/// Single-ref read: `/git/ref/heads/{branch}`
pub fn branch_ref(owner: &str, repo: &str, branch: &str) -> String {
    format!("{}/git/ref/heads/{}", repo_base(owner, repo), nested(branch))
}

/// Ref collection, used to create refs
pub fn refs(owner: &str, repo: &str) -> String {
    format!("{}/git/refs", repo_base(owner, repo))
}

/// Ref update target: `/git/refs/heads/{branch}`
pub fn update_branch_ref(owner: &str, repo: &str, branch: &str) -> String {
    format!("{}/git/refs/heads/{}", repo_base(owner, repo), nested(branch))
}

pub fn contents(owner: &str, repo: &str, path: &str) -> String {
    format!("{}/contents/{}", repo_base(owner, repo), nested(path))
}

/// Contents read pinned to a branch
pub fn contents_at(owner: &str, repo: &str, path: &str, branch: &str) -> String {
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("ref", branch)
        .finish();
    format!("{}?{}", contents(owner, repo, path), query)
}

pub fn blobs(owner: &str, repo: &str) -> String {
    format!("{}/git/blobs", repo_base(owner, repo))
}

pub fn trees(owner: &str, repo: &str) -> String {
    format!("{}/git/trees", repo_base(owner, repo))
}

pub fn commits(owner: &str, repo: &str) -> String {
    format!("{}/git/commits", repo_base(owner, repo))
}

pub fn commit(owner: &str, repo: &str, sha: &str) -> String {
    format!("{}/git/commits/{}", repo_base(owner, repo), segment(sha))
}

pub fn pulls(owner: &str, repo: &str) -> String {
    format!("{}/pulls", repo_base(owner, repo))
}
