// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::time::Duration;

use cca_contrib::CancellationToken;
use cca_contrib::delay::pause;
use cca_forge_client::types::{GitRef, PutContentRequest, PutContentResponse, Repository, encode_content};
use cca_forge_client::{ForgeError, paths};
use cca_forge_mock::{MockForge, RecordingDelay, ScriptedFailure};
use cca_test_utils::logged_tokio_test;
use serde_json::json;

const TOKEN: Option<&str> = Some("ghp_test");

fn forge() -> MockForge {
    MockForge::new("octo").with_repository("acme", "widgets", "main", "abc123")
}

#[logged_tokio_test]
async fn new_forks_stay_hidden_for_the_configured_reads() {
    let forge = forge().with_fork_lag(2, 1);
    let client = forge.client().unwrap();

    let created = client.post(&paths::forks("acme", "widgets"), &json!({}), TOKEN).await.unwrap();
    assert_eq!(created.status, 202);
    let fork: Repository = created.json().unwrap();
    assert!(fork.is_fork_of("acme/widgets"));

    let repo_path = paths::repository("octo", "widgets");
    let ref_path = paths::branch_ref("octo", "widgets", "main");
    assert_eq!(client.get(&repo_path, TOKEN).await.unwrap().status, 404);
    assert_eq!(client.get(&repo_path, TOKEN).await.unwrap().status, 404);
    assert_eq!(client.get(&repo_path, TOKEN).await.unwrap().status, 200);
    assert_eq!(client.get(&ref_path, TOKEN).await.unwrap().status, 404);

    let head: GitRef = client.get(&ref_path, TOKEN).await.unwrap().json().unwrap();
    logger.log(&format!("fork head {}", head.object.sha)).unwrap();
    assert_eq!(head.object.sha, "abc123");
}

#[logged_tokio_test]
async fn creating_an_existing_ref_is_rejected_with_422() {
    let forge = forge();
    let client = forge.client().unwrap();
    let body = json!({ "ref": "refs/heads/feature/x", "sha": "abc123" });

    let first = client.post(&paths::refs("acme", "widgets"), &body, TOKEN).await.unwrap();
    let second = client.post(&paths::refs("acme", "widgets"), &body, TOKEN).await.unwrap();
    assert_eq!(first.status, 201);
    assert_eq!(second.status, 422);
    assert_eq!(forge.branch_sha("acme/widgets", "feature/x").as_deref(), Some("abc123"));
}

#[logged_tokio_test]
async fn overwriting_a_file_requires_its_sha() {
    let forge = forge().with_file("acme/widgets", "main", "ci.yml", "old");
    let client = forge.client().unwrap();
    let path = paths::contents("acme", "widgets", "ci.yml");

    let mut request = PutContentRequest {
        message: "update".into(),
        content: encode_content("new"),
        branch: "main".into(),
        sha: None,
    };
    assert_eq!(client.put(&path, &request, TOKEN).await.unwrap().status, 422);

    request.sha = Some("0000".into());
    assert_eq!(client.put(&path, &request, TOKEN).await.unwrap().status, 409);

    let existing: serde_json::Value = client
        .get(&paths::contents_at("acme", "widgets", "ci.yml", "main"), TOKEN)
        .await
        .unwrap()
        .json()
        .unwrap();
    request.sha = existing["sha"].as_str().map(str::to_string);
    let written: PutContentResponse = client.put(&path, &request, TOKEN).await.unwrap().json().unwrap();

    assert_eq!(forge.file("acme/widgets", "main", "ci.yml").as_deref(), Some("new"));
    assert_eq!(forge.branch_sha("acme/widgets", "main"), Some(written.commit.sha));
}

#[logged_tokio_test]
async fn scripted_failures_fire_the_requested_number_of_times() {
    let forge = forge().with_failure(ScriptedFailure::status("GET", "/user", 503).times(2));
    let client = forge.client().unwrap();

    assert_eq!(client.get(&paths::user(), TOKEN).await.unwrap().status, 503);
    assert_eq!(client.get(&paths::user(), TOKEN).await.unwrap().status, 503);
    assert_eq!(client.get(&paths::user(), TOKEN).await.unwrap().status, 200);
    assert_eq!(forge.count("GET", "/user"), 3);
}

#[logged_tokio_test]
async fn transport_failures_surface_as_errors() {
    let forge = forge().with_failure(ScriptedFailure::transport("GET", "/repos/acme/widgets"));
    let client = forge.client().unwrap();

    let err = client.get(&paths::repository("acme", "widgets"), TOKEN).await.unwrap_err();
    assert!(matches!(err, ForgeError::Transport(_)));
}

#[logged_tokio_test]
async fn encoded_paths_are_decoded_before_routing() {
    let forge = forge();
    let client = forge.client().unwrap();
    let body = json!({ "ref": "refs/heads/ci cd/migrate", "sha": "abc123" });
    client.post(&paths::refs("acme", "widgets"), &body, TOKEN).await.unwrap();

    let response = client
        .get(&paths::branch_ref("acme", "widgets", "ci cd/migrate"), TOKEN)
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(forge.count("GET", "/git/ref/heads/ci cd/migrate"), 1);
}

#[logged_tokio_test]
async fn requests_without_credentials_are_refused() {
    let forge = forge();
    let client = forge.client().unwrap();
    assert_eq!(client.get(&paths::user(), None).await.unwrap().status, 401);
}

#[logged_tokio_test]
async fn recording_delay_remembers_each_pause() {
    let delay = RecordingDelay::new();
    let cancel = CancellationToken::new();
    pause(&delay, Duration::from_millis(5), &cancel, "testing").await.unwrap();
    pause(&delay, Duration::from_millis(7), &cancel, "testing").await.unwrap();
    assert_eq!(delay.sleeps(), vec![Duration::from_millis(5), Duration::from_millis(7)]);

    cancel.cancel();
    assert!(pause(&delay, Duration::from_secs(60), &cancel, "testing").await.is_err());
    assert_eq!(delay.count(), 2);
}
