// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Wire types for the forge REST endpoints the pipeline uses
//!
//! Only the fields the pipeline reads are modeled; unknown fields are ignored.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, ForgeResult};

/// `GET /user`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub pull: bool,
}

/// Parent pointer carried by fork repositories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub full_name: String,
}

/// `GET /repos/{owner}/{repo}` and the fork-creation response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: Owner,
    pub default_branch: String,
    #[serde(default)]
    pub fork: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<RepositorySummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
}

impl Repository {
    /// Push permission as reported for the authenticated identity
    pub fn can_push(&self) -> bool {
        self.permissions.as_ref().is_some_and(|p| p.push || p.admin)
    }

    /// Whether this repository is a fork of `upstream_full_name`
    pub fn is_fork_of(&self, upstream_full_name: &str) -> bool {
        self.fork
            && self
                .parent
                .as_ref()
                .is_some_and(|p| p.full_name.eq_ignore_ascii_case(upstream_full_name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitObject {
    pub sha: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// `GET /git/ref/heads/{branch}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub name: String,
    pub object: GitObject,
}

/// `POST /git/refs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRefRequest {
    #[serde(rename = "ref")]
    pub name: String,
    pub sha: String,
}

/// `PATCH /git/refs/heads/{branch}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRefRequest {
    pub sha: String,
    pub force: bool,
}

/// Metadata of an existing file from the contents API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFile {
    pub sha: String,
    #[serde(default)]
    pub path: String,
}

/// `PUT /contents/{path}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutContentRequest {
    pub message: String,
    /// Base64-encoded file content
    pub content: String,
    pub branch: String,
    /// Blob SHA of the file being replaced; required when it exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sha {
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutContentResponse {
    pub content: ContentFile,
    pub commit: Sha,
}

/// `POST /git/blobs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBlobRequest {
    pub content: String,
    pub encoding: String,
}

impl CreateBlobRequest {
    pub fn base64(content: &str) -> Self {
        Self {
            content: encode_content(content),
            encoding: "base64".to_string(),
        }
    }
}

/// `GET /git/commits/{sha}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitCommit {
    pub sha: String,
    pub tree: Sha,
    #[serde(default)]
    pub parents: Vec<Sha>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

impl TreeEntry {
    /// Regular (non-executable) file entry pointing at a blob
    pub fn file(path: impl Into<String>, blob_sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: "100644".to_string(),
            kind: "blob".to_string(),
            sha: blob_sha.into(),
        }
    }
}

/// `POST /git/trees`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTreeRequest {
    pub base_tree: String,
    pub tree: Vec<TreeEntry>,
}

/// `POST /git/commits`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCommitRequest {
    pub message: String,
    pub tree: String,
    pub parents: Vec<String>,
}

/// `POST /pulls`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestBranch {
    #[serde(rename = "ref")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
    pub head: PullRequestBranch,
    pub base: PullRequestBranch,
}

/// Encode logical file text for the wire
pub fn encode_content(content: &str) -> String {
    STANDARD.encode(content.as_bytes())
}

/// Decode wire content back to text. The host wraps base64 at 60 columns,
/// so embedded newlines are ignored.
pub fn decode_content(encoded: &str) -> ForgeResult<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| ForgeError::UnexpectedResponse {
        status: 0,
        message: format!("invalid base64 content: {}", e),
    })?;
    String::from_utf8(bytes).map_err(|e| ForgeError::UnexpectedResponse {
        status: 0,
        message: format!("content is not UTF-8: {}", e),
    })
}
