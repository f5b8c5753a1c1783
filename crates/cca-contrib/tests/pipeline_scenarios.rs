// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end runs of the contribution pipeline against the in-memory forge

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cca_contrib::{
    CancellationToken, CommitStrategy, ContributionPipeline, Delay, MigrationRequest,
    MigrationResponse, PipelineConfig, PipelineError, PipelineOutcome, RepositoryRef, Stage,
    run_migration_pr,
};
use cca_forge_mock::{MockForge, RecordingDelay, ScriptedFailure};
use cca_test_utils::logged_tokio_test;
use chrono::{DateTime, TimeZone, Utc};

const WORKFLOW_PATH: &str = ".github/workflows/ci-cd-assistant.yml";
const WORKFLOW: &str = "name: CI\non: [push]\njobs: {}\n";

fn now() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
}

fn expected_branch() -> String {
    "ci-cd-assistant/migrate-1700000000000".to_string()
}

fn request() -> MigrationRequest {
    MigrationRequest {
        repository: RepositoryRef::new("acme", "widgets"),
        workflow_path: WORKFLOW_PATH.to_string(),
        workflow_content: WORKFLOW.to_string(),
        commit_message: "Add CI/CD workflow".to_string(),
        pr_title: "Migrate to GitHub Actions".to_string(),
        pr_body: "Generated migration of the existing pipeline.".to_string(),
        auth_token: "ghp_testtoken".to_string(),
    }
}

fn upstream() -> MockForge {
    MockForge::new("octo").with_repository("acme", "widgets", "main", "abc123")
}

fn pipeline(forge: &MockForge, config: PipelineConfig, delay: &Arc<RecordingDelay>) -> ContributionPipeline {
    ContributionPipeline::new(forge.client().unwrap(), config)
        .with_delay(delay.clone())
        .with_fixed_time(now())
}

fn expect_failure(outcome: PipelineOutcome) -> (Stage, PipelineError) {
    match outcome {
        PipelineOutcome::Failure { stage, error } => (stage, error),
        other => panic!("expected a failure, got {:?}", other),
    }
}

#[logged_tokio_test]
async fn forks_when_the_viewer_cannot_push() {
    let forge = upstream().with_fork_lag(2, 1);
    let delay = Arc::new(RecordingDelay::new());

    let outcome = pipeline(&forge, PipelineConfig::default(), &delay).run(&request()).await;
    logger.log(&format!("outcome: {:?}", outcome)).unwrap();

    let PipelineOutcome::Success {
        used_fork,
        branch_name,
        pr_url,
        pr_number,
    } = outcome
    else {
        panic!("pipeline failed: {:?}", outcome);
    };
    assert!(used_fork);
    assert_eq!(branch_name, expected_branch());
    assert_eq!(pr_number, 1);
    assert_eq!(pr_url, "https://forge.mock/acme/widgets/pull/1");

    assert_eq!(forge.count("POST", "/repos/acme/widgets/forks"), 1);
    // two hidden repository reads and one hidden ref read, each followed by a pause
    assert_eq!(delay.count(), 3);

    let head = forge.branch_sha("octo/widgets", &branch_name).unwrap();
    assert_eq!(forge.commit_parents(&head), vec!["abc123".to_string()]);
    assert_eq!(forge.file("octo/widgets", &branch_name, WORKFLOW_PATH).as_deref(), Some(WORKFLOW));

    let put = forge
        .calls()
        .into_iter()
        .find(|c| c.matches("PUT", "/contents/"))
        .unwrap();
    assert!(put.body.unwrap().get("sha").is_none());

    let prs = forge.pull_requests();
    assert_eq!(prs.len(), 1);
    assert_eq!(prs[0].repository, "acme/widgets");
    assert_eq!(prs[0].head, format!("octo:{}", branch_name));
    assert_eq!(prs[0].base, "main");
}

#[logged_tokio_test]
async fn pushes_directly_when_allowed() {
    let forge = upstream().with_push_access("acme/widgets");
    let delay = Arc::new(RecordingDelay::new());

    let outcome = pipeline(&forge, PipelineConfig::default(), &delay).run(&request()).await;
    let PipelineOutcome::Success { used_fork, branch_name, .. } = outcome else {
        panic!("pipeline failed: {:?}", outcome);
    };

    assert!(!used_fork);
    assert_eq!(forge.count("POST", "/forks"), 0);
    assert_eq!(forge.count("GET", "/repos/octo/"), 0);
    assert_eq!(delay.count(), 0);
    assert_eq!(forge.file("acme/widgets", &branch_name, WORKFLOW_PATH).as_deref(), Some(WORKFLOW));

    let prs = forge.pull_requests();
    assert_eq!(prs[0].head, branch_name);
    assert!(!prs[0].head.contains(':'));
}

#[logged_tokio_test]
async fn reuses_an_existing_fork() {
    let forge = upstream().with_existing_fork("acme/widgets");
    let delay = Arc::new(RecordingDelay::new());

    let outcome = pipeline(&forge, PipelineConfig::default(), &delay).run(&request()).await;
    assert!(outcome.is_success(), "{:?}", outcome);
    assert_eq!(forge.count("POST", "/forks"), 0);
    assert_eq!(forge.count("GET", "/repos/octo/widgets/git/ref/heads/main"), 1);
}

#[logged_tokio_test]
async fn a_same_named_repository_that_is_not_a_fork_is_left_alone() {
    let forge = upstream().with_unrelated_viewer_repository("widgets", "fff000");
    let delay = Arc::new(RecordingDelay::new());

    let outcome = pipeline(&forge, PipelineConfig::default(), &delay).run(&request()).await;
    assert!(outcome.is_success(), "{:?}", outcome);
    assert_eq!(forge.count("POST", "/forks"), 1);
    assert!(forge.has_repository("octo/widgets-1"));
    assert!(forge.file("octo/widgets", &expected_branch(), WORKFLOW_PATH).is_none());
    assert_eq!(forge.pull_requests()[0].head, format!("octo:{}", expected_branch()));
}

#[logged_tokio_test]
async fn rerunning_after_a_pr_failure_reuses_fork_branch_and_file() {
    let forge = upstream().with_failure(ScriptedFailure::status("POST", "/pulls", 502));
    let delay = Arc::new(RecordingDelay::new());
    let pipeline = pipeline(&forge, PipelineConfig::default(), &delay);

    let (stage, error) = expect_failure(pipeline.run(&request()).await);
    assert_eq!(stage, Stage::Pr);
    assert!(matches!(error, PipelineError::UnknownHost { status: 502, .. }));
    assert_eq!(forge.count("POST", "/pulls"), 1);

    let mut second = request();
    second.workflow_content = "name: CI v2\n".to_string();
    let outcome = pipeline.run(&second).await;
    assert!(outcome.is_success(), "{:?}", outcome);

    assert_eq!(forge.count("POST", "/forks"), 1);
    assert_eq!(forge.count("POST", "/pulls"), 2);
    let second_put = forge
        .calls()
        .into_iter()
        .filter(|c| c.matches("PUT", "/contents/"))
        .last()
        .unwrap();
    assert!(second_put.body.unwrap().get("sha").is_some());
    assert_eq!(
        forge.file("octo/widgets", &expected_branch(), WORKFLOW_PATH).as_deref(),
        Some("name: CI v2\n")
    );
}

#[logged_tokio_test]
async fn a_duplicate_pull_request_fails_without_retrying() {
    let forge = upstream().with_push_access("acme/widgets");
    let delay = Arc::new(RecordingDelay::new());
    let pipeline = pipeline(&forge, PipelineConfig::default(), &delay);

    assert!(pipeline.run(&request()).await.is_success());
    let (stage, error) = expect_failure(pipeline.run(&request()).await);

    assert_eq!(stage, Stage::Pr);
    assert!(matches!(error, PipelineError::UnknownHost { status: 422, .. }));
    assert_eq!(forge.count("POST", "/pulls"), 2);
    assert_eq!(forge.pull_requests().len(), 1);
}

#[logged_tokio_test]
async fn missing_workflow_scope_is_reported_as_a_permission_problem() {
    let forge = upstream().with_push_access("acme/widgets").without_workflow_scope();
    let delay = Arc::new(RecordingDelay::new());

    let (stage, error) =
        expect_failure(pipeline(&forge, PipelineConfig::default(), &delay).run(&request()).await);

    assert_eq!(stage, Stage::Commit);
    assert!(matches!(error, PipelineError::PermissionScope { ref path, .. } if path == WORKFLOW_PATH));
    assert!(error.hint().unwrap().contains("workflow"));
    assert_eq!(forge.count("PUT", "/contents/"), 3);
    assert_eq!(delay.sleeps(), vec![Duration::from_millis(1500); 2]);
    assert!(forge.pull_requests().is_empty());
}

#[logged_tokio_test]
async fn rate_limiting_stops_the_run_at_the_current_stage() {
    let forge = upstream().with_failure(
        ScriptedFailure::status("GET", "/user", 403)
            .with_message("API rate limit exceeded for user ID 1.")
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-reset", "1700003600"),
    );
    let delay = Arc::new(RecordingDelay::new());

    let (stage, error) =
        expect_failure(pipeline(&forge, PipelineConfig::default(), &delay).run(&request()).await);

    assert_eq!(stage, Stage::Access);
    match error {
        PipelineError::RateLimited { reset_at, .. } => {
            assert_eq!(reset_at, Utc.timestamp_opt(1_700_003_600, 0).single());
        }
        other => panic!("expected rate limiting, got {:?}", other),
    }
    assert_eq!(forge.calls().len(), 1);
}

#[logged_tokio_test]
async fn an_unreadable_repository_is_denied_at_access() {
    let forge = MockForge::new("octo");
    let delay = Arc::new(RecordingDelay::new());

    let (stage, error) =
        expect_failure(pipeline(&forge, PipelineConfig::default(), &delay).run(&request()).await);
    assert_eq!(stage, Stage::Access);
    assert!(matches!(error, PipelineError::AccessDenied { .. }));
}

#[logged_tokio_test]
async fn a_fork_that_never_appears_times_out() {
    let forge = upstream().with_fork_lag(u32::MAX, 0);
    let delay = Arc::new(RecordingDelay::new());

    let (stage, error) =
        expect_failure(pipeline(&forge, PipelineConfig::default(), &delay).run(&request()).await);

    assert_eq!(stage, Stage::Fork);
    assert_eq!(
        error,
        PipelineError::ConvergenceTimeout {
            fork: "octo/widgets".to_string(),
            attempts: 15
        }
    );
    // one lookup before the fork request, then fifteen visibility polls
    assert_eq!(forge.count("GET", "/repos/octo/widgets"), 16);
    assert_eq!(delay.count(), 14);
    assert_eq!(forge.count("POST", "/git/refs"), 0);
}

#[logged_tokio_test]
async fn a_fork_whose_branch_lags_still_gets_its_pull_request() {
    let forge = upstream().with_fork_lag(0, u32::MAX);
    let delay = Arc::new(RecordingDelay::new());

    let outcome = pipeline(&forge, PipelineConfig::default(), &delay).run(&request()).await;

    assert!(outcome.is_success(), "{:?}", outcome);
    assert_eq!(forge.count("GET", "/repos/octo/widgets/git/ref/heads/main"), 10);
    assert_eq!(delay.count(), 9);
}

#[logged_tokio_test]
async fn transport_errors_are_not_mistaken_for_host_answers() {
    let forge = upstream().with_failure(ScriptedFailure::transport("POST", "/git/refs"));
    let delay = Arc::new(RecordingDelay::new());

    let (stage, error) =
        expect_failure(pipeline(&forge, PipelineConfig::default(), &delay).run(&request()).await);
    assert_eq!(stage, Stage::Branch);
    assert!(matches!(error, PipelineError::Transport(_)));
}

#[logged_tokio_test]
async fn invalid_requests_make_no_calls() {
    let forge = upstream();
    let delay = Arc::new(RecordingDelay::new());
    let mut bad = request();
    bad.workflow_path = "../outside.yml".to_string();

    let (stage, error) = expect_failure(pipeline(&forge, PipelineConfig::default(), &delay).run(&bad).await);
    assert_eq!(stage, Stage::Access);
    assert!(matches!(error, PipelineError::InvalidInput(_)));
    assert!(forge.calls().is_empty());
}

#[logged_tokio_test]
async fn invalid_configuration_fails_at_the_first_stage() {
    let forge = upstream();
    let delay = Arc::new(RecordingDelay::new());
    let config = PipelineConfig {
        commit_attempts: 0,
        ..Default::default()
    };

    let (stage, error) = expect_failure(pipeline(&forge, config, &delay).run(&request()).await);
    assert_eq!(stage, Stage::Access);
    assert!(matches!(&error, PipelineError::InvalidInput(message) if message.contains("commit-attempts")));
    assert!(forge.calls().is_empty());
}

#[logged_tokio_test]
async fn git_data_strategy_layers_the_file_onto_the_existing_tree() {
    let forge = upstream()
        .with_push_access("acme/widgets")
        .with_file("acme/widgets", "main", "README.md", "# widgets\n");
    let delay = Arc::new(RecordingDelay::new());
    let config = PipelineConfig {
        commit_strategy: CommitStrategy::GitData,
        ..Default::default()
    };

    let outcome = pipeline(&forge, config, &delay).run(&request()).await;
    let PipelineOutcome::Success { branch_name, .. } = outcome else {
        panic!("pipeline failed: {:?}", outcome);
    };

    assert_eq!(forge.count("PUT", "/contents/"), 0);
    assert_eq!(forge.count("POST", "/git/blobs"), 1);
    assert_eq!(forge.count("PATCH", "/git/refs/heads/"), 1);
    assert_eq!(forge.file("acme/widgets", &branch_name, WORKFLOW_PATH).as_deref(), Some(WORKFLOW));
    assert_eq!(forge.file("acme/widgets", &branch_name, "README.md").as_deref(), Some("# widgets\n"));
}

#[logged_tokio_test]
async fn auto_strategy_falls_back_after_a_conflict() {
    let forge = upstream()
        .with_push_access("acme/widgets")
        .with_failure(ScriptedFailure::status("PUT", "/contents/", 409));
    let delay = Arc::new(RecordingDelay::new());
    let config = PipelineConfig {
        commit_strategy: CommitStrategy::Auto,
        ..Default::default()
    };

    let outcome = pipeline(&forge, config, &delay).run(&request()).await;
    let PipelineOutcome::Success { branch_name, .. } = outcome else {
        panic!("pipeline failed: {:?}", outcome);
    };
    assert_eq!(forge.count("PUT", "/contents/"), 1);
    assert_eq!(forge.count("POST", "/git/commits"), 1);
    assert_eq!(forge.file("acme/widgets", &branch_name, WORKFLOW_PATH).as_deref(), Some(WORKFLOW));
}

#[logged_tokio_test]
async fn auto_strategy_does_not_fall_back_on_scope_errors() {
    let forge = upstream().with_push_access("acme/widgets").without_workflow_scope();
    let delay = Arc::new(RecordingDelay::new());
    let config = PipelineConfig {
        commit_strategy: CommitStrategy::Auto,
        ..Default::default()
    };

    let (stage, error) = expect_failure(pipeline(&forge, config, &delay).run(&request()).await);
    assert_eq!(stage, Stage::Commit);
    assert!(matches!(error, PipelineError::PermissionScope { .. }));
    assert_eq!(forge.count("POST", "/git/blobs"), 0);
}

/// Cancels the run the first time the pipeline wants to wait
#[derive(Debug)]
struct CancelOnSleep(CancellationToken);

#[async_trait]
impl Delay for CancelOnSleep {
    async fn sleep(&self, _duration: Duration) {
        self.0.cancel();
        std::future::pending::<()>().await;
    }
}

#[logged_tokio_test]
async fn cancellation_interrupts_fork_polling() {
    let forge = upstream().with_fork_lag(5, 0);
    let cancel = CancellationToken::new();
    let pipeline = ContributionPipeline::new(forge.client().unwrap(), PipelineConfig::default())
        .with_delay(Arc::new(CancelOnSleep(cancel.clone())))
        .with_cancellation(cancel);

    let (stage, error) = expect_failure(pipeline.run(&request()).await);
    assert_eq!(stage, Stage::Fork);
    assert!(matches!(error, PipelineError::Cancelled { .. }));
    assert_eq!(forge.count("GET", "/repos/octo/widgets"), 2);
}

#[logged_tokio_test]
async fn run_migration_pr_reports_camel_case_json() {
    let forge = upstream().with_push_access("acme/widgets");

    let response = run_migration_pr(forge.client().unwrap(), PipelineConfig::default(), &request()).await;
    assert!(response.ok);
    assert_eq!(response.used_fork, Some(false));

    let json = serde_json::to_value(&response).unwrap();
    logger.log_json("response", &json).unwrap();
    assert!(json["prUrl"].as_str().unwrap().ends_with("/pull/1"));
    assert!(json["branchName"].as_str().unwrap().starts_with("ci-cd-assistant/migrate-"));

    let failed: MigrationResponse = PipelineOutcome::Failure {
        stage: Stage::Fork,
        error: PipelineError::ConvergenceTimeout {
            fork: "octo/widgets".into(),
            attempts: 15,
        },
    }
    .into();
    assert!(!failed.ok);
    assert_eq!(failed.stage, Some(Stage::Fork));
    assert!(failed.error.unwrap().contains("taking too long"));
}
