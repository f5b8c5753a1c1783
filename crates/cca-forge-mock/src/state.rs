// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Simulated forge state and request routing

use std::collections::{BTreeMap, HashMap};

use cca_forge_client::RawResponse;
use cca_forge_client::types::{decode_content, encode_content};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::script::{RecordedCall, ScriptedFailure};

pub(crate) const WORKFLOW_DIR: &str = ".github/workflows/";

/// Path → blob SHA
pub(crate) type Tree = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub(crate) struct RepoRecord {
    pub owner: String,
    pub name: String,
    pub default_branch: String,
    /// Full name of the upstream when this is a fork
    pub parent: Option<String>,
    pub push: bool,
    /// Remaining repository reads that answer 404
    pub hidden_reads: u32,
    /// Remaining ref reads that answer 404 once the repository is visible
    pub hidden_ref_reads: u32,
    pub branches: BTreeMap<String, String>,
}

impl RepoRecord {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "full_name": self.full_name(),
            "owner": { "login": self.owner },
            "default_branch": self.default_branch,
            "fork": self.parent.is_some(),
            "parent": self.parent.as_ref().map(|p| json!({ "full_name": p })),
            "permissions": { "admin": false, "push": self.push, "pull": true },
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CommitRecord {
    pub tree: String,
    pub parents: Vec<String>,
}

/// A pull request the mock has accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPullRequest {
    pub number: u64,
    /// Full name of the repository the pull request was opened against
    pub repository: String,
    /// `head` exactly as the client sent it
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
    pub html_url: String,
}

#[derive(Debug)]
pub(crate) struct ForgeState {
    pub viewer: String,
    pub repos: HashMap<String, RepoRecord>,
    pub commits: HashMap<String, CommitRecord>,
    pub trees: HashMap<String, Tree>,
    pub blobs: HashMap<String, String>,
    pub pulls: Vec<MockPullRequest>,
    pub calls: Vec<RecordedCall>,
    pub failures: Vec<ScriptedFailure>,
    /// Hidden reads given to each newly requested fork: (repository, ref)
    pub fork_lag: (u32, u32),
    pub workflow_scope: bool,
    sequence: u64,
}

pub(crate) fn key(owner: &str, name: &str) -> String {
    format!("{}/{}", owner, name).to_ascii_lowercase()
}

pub(crate) fn reply(status: u16, body: Value) -> RawResponse {
    let mut response = RawResponse {
        status,
        text: body.to_string(),
        ..Default::default()
    };
    response
        .headers
        .insert("content-type".to_string(), "application/json; charset=utf-8".to_string());
    response
}

fn message(status: u16, text: &str) -> RawResponse {
    reply(status, json!({ "message": text }))
}

fn not_found() -> RawResponse {
    message(404, "Not Found")
}

fn validation_failed(errors: Value) -> RawResponse {
    reply(422, json!({ "message": "Validation Failed", "errors": errors }))
}

/// SHA-256 of a git-style object header plus payload, cut to git's 40 hex digits
fn digest(kind: &str, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{} {}\0", kind, payload.len()).as_bytes());
    hasher.update(payload.as_bytes());
    let mut sha = hex::encode(hasher.finalize());
    sha.truncate(40);
    sha
}

fn str_field<'a>(body: Option<&'a Value>, field: &str) -> Option<&'a str> {
    body.and_then(|b| b.get(field)).and_then(Value::as_str)
}

impl ForgeState {
    pub fn new(viewer: &str) -> Self {
        Self {
            viewer: viewer.to_string(),
            repos: HashMap::new(),
            commits: HashMap::new(),
            trees: HashMap::new(),
            blobs: HashMap::new(),
            pulls: Vec::new(),
            calls: Vec::new(),
            failures: Vec::new(),
            fork_lag: (0, 0),
            workflow_scope: true,
            sequence: 0,
        }
    }

    pub fn store_blob(&mut self, content: String) -> String {
        let sha = digest("blob", &content);
        self.blobs.insert(sha.clone(), content);
        sha
    }

    pub fn store_tree(&mut self, tree: Tree) -> String {
        let payload: String = tree.iter().map(|(path, sha)| format!("100644 {} {}\n", path, sha)).collect();
        let sha = digest("tree", &payload);
        self.trees.insert(sha.clone(), tree);
        sha
    }

    pub fn store_commit(&mut self, message: &str, tree: String, parents: Vec<String>) -> String {
        self.sequence += 1;
        let payload = format!("tree {}\nparents {}\nseq {}\n\n{}", tree, parents.join(" "), self.sequence, message);
        let sha = digest("commit", &payload);
        self.commits.insert(sha.clone(), CommitRecord { tree, parents });
        sha
    }

    /// Register a commit under a caller-chosen SHA with an empty tree
    pub fn store_root_commit(&mut self, sha: &str) {
        let tree = self.store_tree(Tree::new());
        self.commits.insert(
            sha.to_string(),
            CommitRecord {
                tree,
                parents: Vec::new(),
            },
        );
    }

    pub fn tree_at(&self, commit: &str) -> Tree {
        self.commits
            .get(commit)
            .and_then(|c| self.trees.get(&c.tree))
            .cloned()
            .unwrap_or_default()
    }

    /// Commit `path` = `content` on top of `branch`; returns (blob, commit)
    pub fn write_file(
        &mut self,
        repo_key: &str,
        branch: &str,
        path: &str,
        content: String,
        commit_message: &str,
    ) -> Option<(String, String)> {
        let head = self.repos.get(repo_key)?.branches.get(branch)?.clone();
        let mut tree = self.tree_at(&head);
        let blob = self.store_blob(content);
        tree.insert(path.to_string(), blob.clone());
        let tree_sha = self.store_tree(tree);
        let commit = self.store_commit(commit_message, tree_sha, vec![head]);
        self.repos
            .get_mut(repo_key)?
            .branches
            .insert(branch.to_string(), commit.clone());
        Some((blob, commit))
    }

    pub fn file(&self, repo_key: &str, branch: &str, path: &str) -> Option<String> {
        let head = self.repos.get(repo_key)?.branches.get(branch)?;
        let blob = self.tree_at(head).get(path)?.clone();
        self.blobs.get(&blob).cloned()
    }

    /// Repository the caller may currently see
    fn visible(&self, owner: &str, name: &str) -> Option<&RepoRecord> {
        self.repos.get(&key(owner, name)).filter(|r| r.hidden_reads == 0)
    }

    pub fn take_failure(&mut self, method: &str, path: &str) -> Option<ScriptedFailure> {
        let index = self.failures.iter().position(|f| f.matches(method, path))?;
        let spent = self.failures[index].consume();
        if spent {
            Some(self.failures.remove(index))
        } else {
            Some(self.failures[index].clone())
        }
    }

    pub fn route(
        &mut self,
        method: &str,
        segments: &[String],
        query: &HashMap<String, String>,
        body: Option<&Value>,
    ) -> RawResponse {
        let segs: Vec<&str> = segments.iter().map(String::as_str).collect();
        match (method, segs.as_slice()) {
            ("GET", ["user"]) => reply(200, json!({ "login": self.viewer })),
            ("GET", ["repos", owner, name]) => self.get_repository(owner, name),
            ("POST", ["repos", owner, name, "forks"]) => self.create_fork(owner, name),
            ("GET", ["repos", owner, name, "git", "ref", "heads", branch @ ..]) if !branch.is_empty() => {
                self.get_ref(owner, name, &branch.join("/"))
            }
            ("POST", ["repos", owner, name, "git", "refs"]) => self.create_ref(owner, name, body),
            ("PATCH", ["repos", owner, name, "git", "refs", "heads", branch @ ..]) if !branch.is_empty() => {
                self.update_ref(owner, name, &branch.join("/"), body)
            }
            ("GET", ["repos", owner, name, "contents", path @ ..]) => {
                self.get_contents(owner, name, &path.join("/"), query.get("ref").map(String::as_str))
            }
            ("PUT", ["repos", owner, name, "contents", path @ ..]) if !path.is_empty() => {
                self.put_contents(owner, name, &path.join("/"), body)
            }
            ("POST", ["repos", owner, name, "git", "blobs"]) => self.create_blob(owner, name, body),
            ("GET", ["repos", owner, name, "git", "commits", sha]) => self.get_commit(owner, name, sha),
            ("POST", ["repos", owner, name, "git", "trees"]) => self.create_tree(owner, name, body),
            ("POST", ["repos", owner, name, "git", "commits"]) => self.create_commit(owner, name, body),
            ("POST", ["repos", owner, name, "pulls"]) => self.create_pull(owner, name, body),
            _ => not_found(),
        }
    }

    fn get_repository(&mut self, owner: &str, name: &str) -> RawResponse {
        match self.repos.get_mut(&key(owner, name)) {
            Some(repo) if repo.hidden_reads > 0 => {
                repo.hidden_reads -= 1;
                not_found()
            }
            Some(repo) => reply(200, repo.to_json()),
            None => not_found(),
        }
    }

    fn create_fork(&mut self, owner: &str, name: &str) -> RawResponse {
        let Some(upstream) = self.visible(owner, name).cloned() else {
            return not_found();
        };
        let upstream_name = upstream.full_name();

        if let Some(existing) = self
            .repos
            .values()
            .find(|r| r.owner.eq_ignore_ascii_case(&self.viewer) && r.parent.as_deref() == Some(&upstream_name))
        {
            return reply(202, existing.to_json());
        }

        // Forks are renamed when the viewer already owns a repository with
        // the upstream's name.
        let mut fork_name = upstream.name.clone();
        let mut suffix = 1;
        while self.repos.contains_key(&key(&self.viewer, &fork_name)) {
            fork_name = format!("{}-{}", upstream.name, suffix);
            suffix += 1;
        }

        let fork = RepoRecord {
            owner: self.viewer.clone(),
            name: fork_name.clone(),
            default_branch: upstream.default_branch.clone(),
            parent: Some(upstream_name),
            push: true,
            hidden_reads: self.fork_lag.0,
            hidden_ref_reads: self.fork_lag.1,
            branches: upstream.branches.clone(),
        };
        let body = fork.to_json();
        tracing::debug!(fork = %fork.full_name(), "mock forge created fork");
        self.repos.insert(key(&self.viewer, &fork_name), fork);
        reply(202, body)
    }

    fn get_ref(&mut self, owner: &str, name: &str, branch: &str) -> RawResponse {
        let Some(repo) = self.repos.get_mut(&key(owner, name)).filter(|r| r.hidden_reads == 0) else {
            return not_found();
        };
        if repo.hidden_ref_reads > 0 {
            repo.hidden_ref_reads -= 1;
            return not_found();
        }
        match repo.branches.get(branch) {
            Some(sha) => reply(200, ref_json(branch, sha)),
            None => not_found(),
        }
    }

    fn create_ref(&mut self, owner: &str, name: &str, body: Option<&Value>) -> RawResponse {
        let repo_key = key(owner, name);
        if self.visible(owner, name).is_none() {
            return not_found();
        }
        let (Some(full_ref), Some(sha)) = (str_field(body, "ref"), str_field(body, "sha")) else {
            return validation_failed(json!([{ "message": "ref and sha are required" }]));
        };
        let Some(branch) = full_ref.strip_prefix("refs/heads/") else {
            return message(422, "Reference name must start with refs/heads/");
        };
        if !self.commits.contains_key(sha) {
            return message(422, "Object does not exist");
        }
        let Some(repo) = self.repos.get_mut(&repo_key) else {
            return not_found();
        };
        if repo.branches.contains_key(branch) {
            return message(422, "Reference already exists");
        }
        repo.branches.insert(branch.to_string(), sha.to_string());
        reply(201, ref_json(branch, sha))
    }

    fn update_ref(&mut self, owner: &str, name: &str, branch: &str, body: Option<&Value>) -> RawResponse {
        let Some(sha) = str_field(body, "sha").map(str::to_string) else {
            return validation_failed(json!([{ "message": "sha is required" }]));
        };
        let force = body.and_then(|b| b.get("force")).and_then(Value::as_bool).unwrap_or(false);
        let Some(current) = self.visible(owner, name).and_then(|r| r.branches.get(branch)).cloned() else {
            return message(422, "Reference does not exist");
        };
        let Some(commit) = self.commits.get(&sha) else {
            return message(422, "Object does not exist");
        };
        if !force && sha != current && !commit.parents.contains(&current) {
            return message(422, "Update is not a fast forward");
        }
        if let Some(repo) = self.repos.get_mut(&key(owner, name)) {
            repo.branches.insert(branch.to_string(), sha.clone());
        }
        reply(200, ref_json(branch, &sha))
    }

    fn get_contents(&self, owner: &str, name: &str, path: &str, branch: Option<&str>) -> RawResponse {
        let Some(repo) = self.visible(owner, name) else {
            return not_found();
        };
        let branch = branch.unwrap_or(&repo.default_branch);
        let Some(head) = repo.branches.get(branch) else {
            return message(404, &format!("No commit found for the ref {}", branch));
        };
        let tree = self.tree_at(head);
        if let Some(blob) = tree.get(path) {
            let content = self.blobs.get(blob).cloned().unwrap_or_default();
            return reply(
                200,
                json!({
                    "type": "file",
                    "name": path.rsplit('/').next().unwrap_or(path),
                    "path": path,
                    "sha": blob,
                    "encoding": "base64",
                    "content": encode_content(&content),
                }),
            );
        }
        let prefix = format!("{}/", path);
        let listing: Vec<Value> = tree
            .iter()
            .filter(|(p, _)| path.is_empty() || p.starts_with(&prefix))
            .map(|(p, sha)| json!({ "type": "file", "path": p, "sha": sha }))
            .collect();
        if listing.is_empty() {
            not_found()
        } else {
            reply(200, Value::Array(listing))
        }
    }

    fn put_contents(&mut self, owner: &str, name: &str, path: &str, body: Option<&Value>) -> RawResponse {
        let repo_key = key(owner, name);
        let Some(repo) = self.visible(owner, name) else {
            return not_found();
        };
        if path.starts_with(WORKFLOW_DIR) && !self.workflow_scope {
            return not_found();
        }
        let (Some(commit_message), Some(encoded)) = (str_field(body, "message"), str_field(body, "content")) else {
            return validation_failed(json!([{ "message": "message and content are required" }]));
        };
        let branch = str_field(body, "branch").unwrap_or(&repo.default_branch).to_string();
        let Some(head) = repo.branches.get(&branch).cloned() else {
            return message(404, &format!("Branch {} not found", branch));
        };
        let Ok(content) = decode_content(encoded) else {
            return validation_failed(json!([{ "message": "content is not valid Base64" }]));
        };

        let existing = self.tree_at(&head).get(path).cloned();
        match (existing.as_deref(), str_field(body, "sha")) {
            (Some(_), None) => {
                return message(422, "Invalid request.\n\n\"sha\" wasn't supplied.");
            }
            (Some(current), Some(given)) if current != given => {
                return message(409, &format!("{} does not match {}", path, given));
            }
            _ => {}
        }

        let commit_message = commit_message.to_string();
        let Some((blob, commit)) = self.write_file(&repo_key, &branch, path, content, &commit_message) else {
            return not_found();
        };
        let status = if existing.is_some() { 200 } else { 201 };
        reply(
            status,
            json!({
                "content": { "path": path, "sha": blob },
                "commit": { "sha": commit, "message": commit_message },
            }),
        )
    }

    fn create_blob(&mut self, owner: &str, name: &str, body: Option<&Value>) -> RawResponse {
        if self.visible(owner, name).is_none() {
            return not_found();
        }
        let Some(raw) = str_field(body, "content") else {
            return validation_failed(json!([{ "message": "content is required" }]));
        };
        let content = match str_field(body, "encoding").unwrap_or("utf-8") {
            "base64" => match decode_content(raw) {
                Ok(content) => content,
                Err(_) => return validation_failed(json!([{ "message": "content is not valid Base64" }])),
            },
            _ => raw.to_string(),
        };
        let sha = self.store_blob(content);
        reply(201, json!({ "sha": sha }))
    }

    fn get_commit(&self, owner: &str, name: &str, sha: &str) -> RawResponse {
        if self.visible(owner, name).is_none() {
            return not_found();
        }
        match self.commits.get(sha) {
            Some(commit) => reply(200, commit_json(sha, commit)),
            None => not_found(),
        }
    }

    fn create_tree(&mut self, owner: &str, name: &str, body: Option<&Value>) -> RawResponse {
        if self.visible(owner, name).is_none() {
            return not_found();
        }
        let mut tree = match str_field(body, "base_tree") {
            Some(base) => match self.trees.get(base) {
                Some(tree) => tree.clone(),
                None => return message(422, "base_tree is not a valid tree"),
            },
            None => Tree::new(),
        };
        let entries = body
            .and_then(|b| b.get("tree"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for entry in entries {
            let (Some(path), Some(sha)) = (
                entry.get("path").and_then(Value::as_str),
                entry.get("sha").and_then(Value::as_str),
            ) else {
                return validation_failed(json!([{ "message": "tree entries need path and sha" }]));
            };
            if path.starts_with(WORKFLOW_DIR) && !self.workflow_scope {
                return not_found();
            }
            if !self.blobs.contains_key(sha) {
                return message(422, "tree.sha is not a valid blob");
            }
            tree.insert(path.to_string(), sha.to_string());
        }
        let sha = self.store_tree(tree);
        reply(201, json!({ "sha": sha }))
    }

    fn create_commit(&mut self, owner: &str, name: &str, body: Option<&Value>) -> RawResponse {
        if self.visible(owner, name).is_none() {
            return not_found();
        }
        let (Some(commit_message), Some(tree)) = (str_field(body, "message"), str_field(body, "tree")) else {
            return validation_failed(json!([{ "message": "message and tree are required" }]));
        };
        if !self.trees.contains_key(tree) {
            return message(422, "Tree SHA does not exist");
        }
        let parents: Vec<String> = body
            .and_then(|b| b.get("parents"))
            .and_then(Value::as_array)
            .map(|p| p.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        if let Some(missing) = parents.iter().find(|p| !self.commits.contains_key(*p)) {
            return message(422, &format!("Parent SHA {} does not exist", missing));
        }
        let (commit_message, tree) = (commit_message.to_string(), tree.to_string());
        let sha = self.store_commit(&commit_message, tree, parents);
        let record = self.commits.get(&sha).cloned();
        match record {
            Some(commit) => reply(201, commit_json(&sha, &commit)),
            None => message(500, "commit vanished"),
        }
    }

    fn create_pull(&mut self, owner: &str, name: &str, body: Option<&Value>) -> RawResponse {
        let Some(base_repo) = self.visible(owner, name).cloned() else {
            return not_found();
        };
        let (Some(head), Some(base)) = (str_field(body, "head"), str_field(body, "base")) else {
            return validation_failed(json!([{ "resource": "PullRequest", "code": "missing_field" }]));
        };

        let (head_owner, head_branch) = head.split_once(':').unwrap_or((base_repo.owner.as_str(), head));
        let upstream_name = base_repo.full_name();
        let head_repo = if head_owner.eq_ignore_ascii_case(&base_repo.owner) {
            Some(&base_repo)
        } else {
            self.repos.values().find(|r| {
                r.owner.eq_ignore_ascii_case(head_owner)
                    && r.parent.as_deref().is_some_and(|p| p.eq_ignore_ascii_case(&upstream_name))
            })
        };
        if !head_repo.is_some_and(|r| r.branches.contains_key(head_branch)) {
            return validation_failed(
                json!([{ "resource": "PullRequest", "field": "head", "code": "invalid" }]),
            );
        }
        if !base_repo.branches.contains_key(base) {
            return validation_failed(
                json!([{ "resource": "PullRequest", "field": "base", "code": "invalid" }]),
            );
        }

        let qualified = format!("{}:{}", head_owner, head_branch);
        let duplicate = self.pulls.iter().any(|pr| {
            pr.repository.eq_ignore_ascii_case(&upstream_name)
                && pr.base == base
                && (pr.head == head
                    || pr.head == qualified
                    || (pr.head == head_branch && head_owner.eq_ignore_ascii_case(&base_repo.owner)))
        });
        if duplicate {
            return validation_failed(json!([{
                "resource": "PullRequest",
                "code": "custom",
                "message": format!("A pull request already exists for {}.", qualified),
            }]));
        }

        let number = self.pulls.len() as u64 + 1;
        let pr = MockPullRequest {
            number,
            repository: upstream_name,
            head: head.to_string(),
            base: base.to_string(),
            title: str_field(body, "title").unwrap_or_default().to_string(),
            body: str_field(body, "body").unwrap_or_default().to_string(),
            html_url: format!("https://forge.mock/{}/{}/pull/{}", base_repo.owner, base_repo.name, number),
        };
        let response = json!({
            "number": pr.number,
            "html_url": pr.html_url,
            "head": { "ref": head_branch, "label": qualified },
            "base": { "ref": pr.base },
        });
        self.pulls.push(pr);
        reply(201, response)
    }
}

fn ref_json(branch: &str, sha: &str) -> Value {
    json!({
        "ref": format!("refs/heads/{}", branch),
        "object": { "sha": sha, "type": "commit" },
    })
}

fn commit_json(sha: &str, commit: &CommitRecord) -> Value {
    json!({
        "sha": sha,
        "tree": { "sha": commit.tree },
        "parents": commit.parents.iter().map(|p| json!({ "sha": p })).collect::<Vec<_>>(),
    })
}
