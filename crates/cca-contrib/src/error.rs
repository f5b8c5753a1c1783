// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error taxonomy for the contribution pipeline

use cca_forge_client::{ApiResponse, FailureKind, ForgeError};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::Stage;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Why a stage failed.
///
/// "Already exists" answers from the host are not errors; the stages that
/// tolerate them report them as success.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// No response was received
    #[error("Could not reach the forge: {0}")]
    Transport(String),

    /// Repository unreadable or token lacks access
    #[error("Access denied: {message}")]
    AccessDenied { message: String },

    #[error(
        "Fork {fork} did not become readable after {attempts} attempts; fork creation is taking too long"
    )]
    ConvergenceTimeout { fork: String, attempts: u32 },

    /// A write to a protected path was refused, usually reported by the host
    /// as 404 rather than 403
    #[error("Token is not allowed to write {path}: {message}")]
    PermissionScope { path: String, message: String },

    #[error("Rate limited by the forge: {message}")]
    RateLimited {
        message: String,
        reset_at: Option<DateTime<Utc>>,
    },

    #[error("Forge returned {status}: {message}")]
    UnknownHost { status: u16, message: String },

    #[error("Cancelled while {during}")]
    Cancelled { during: String },

    #[error("Invalid request: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    /// Classify a failed response with no path context
    pub fn from_response(response: &ApiResponse) -> Self {
        Self::from_response_for_path(response, None)
    }

    /// Classify a failed response for a write touching `path`
    pub fn from_response_for_path(response: &ApiResponse, path: Option<&str>) -> Self {
        let message = response.detail();
        match response.failure_kind() {
            Some(FailureKind::AccessDenied) => PipelineError::AccessDenied { message },
            Some(FailureKind::RateLimited { reset_at }) => {
                PipelineError::RateLimited { message, reset_at }
            }
            Some(FailureKind::WorkflowScope) => PipelineError::PermissionScope {
                path: path.unwrap_or("a workflow file").to_string(),
                message,
            },
            _ => PipelineError::UnknownHost {
                status: response.status,
                message,
            },
        }
    }

    /// Categorized remediation shown next to the failure
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            PipelineError::Transport(_) => Some("Check your network connection and try again."),
            PipelineError::AccessDenied { .. } => Some(
                "Check that the token is valid, not expired, and can read the repository.",
            ),
            PipelineError::ConvergenceTimeout { .. } => Some(
                "The fork is still being created. Wait a minute and retry; the existing fork will be reused.",
            ),
            PipelineError::PermissionScope { .. } => Some(
                "Add the `workflow` scope to your token (or grant Workflows: write to a fine-grained token) and retry.",
            ),
            PipelineError::RateLimited { .. } => {
                Some("The API rate limit is exhausted. Wait for it to reset and retry.")
            }
            PipelineError::UnknownHost { status: 422, .. } => Some(
                "The forge rejected the request as invalid. A pull request for this branch may already exist.",
            ),
            PipelineError::UnknownHost { status, .. } if *status >= 500 => {
                Some("The forge is having trouble. Retry later; completed steps will be reused.")
            }
            PipelineError::UnknownHost { .. } => None,
            PipelineError::Cancelled { .. } => None,
            PipelineError::InvalidInput(_) => None,
        }
    }

    /// Pair the error with the stage it happened in
    pub fn at(self, stage: Stage) -> StageFailure {
        StageFailure { stage, error: self }
    }
}

impl From<ForgeError> for PipelineError {
    fn from(err: ForgeError) -> Self {
        match err {
            ForgeError::Transport(message) | ForgeError::ClientSetup(message) => {
                PipelineError::Transport(message)
            }
            ForgeError::InvalidUrl(e) => PipelineError::InvalidInput(e.to_string()),
            ForgeError::Json(e) => PipelineError::UnknownHost {
                status: 0,
                message: format!("unreadable response body: {}", e),
            },
            ForgeError::UnexpectedResponse { status, message } => {
                PipelineError::UnknownHost { status, message }
            }
        }
    }
}

/// A [`PipelineError`] tagged with the stage it stopped
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: PipelineError,
}

/// Attach a stage to any error convertible into [`PipelineError`]
pub trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageFailure>;
}

impl<T, E: Into<PipelineError>> AtStage<T> for std::result::Result<T, E> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageFailure> {
        self.map_err(|e| Into::<PipelineError>::into(e).at(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cca_forge_client::RawResponse;

    fn response(status: u16, body: &str, headers: &[(&str, &str)]) -> ApiResponse {
        ApiResponse::from(RawResponse {
            status,
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            text: body.to_string(),
        })
    }

    #[test]
    fn classifies_host_failures() {
        assert!(matches!(
            PipelineError::from_response(&response(401, r#"{"message":"Bad credentials"}"#, &[])),
            PipelineError::AccessDenied { .. }
        ));
        assert!(matches!(
            PipelineError::from_response(&response(403, "{}", &[("x-ratelimit-remaining", "0")])),
            PipelineError::RateLimited { .. }
        ));
        assert_eq!(
            PipelineError::from_response(&response(500, r#"{"message":"boom"}"#, &[])),
            PipelineError::UnknownHost {
                status: 500,
                message: "boom".into()
            }
        );
    }

    #[test]
    fn workflow_scope_keeps_the_path() {
        let r = response(403, r#"{"message":"refusing to update workflow without workflow scope"}"#, &[]);
        match PipelineError::from_response_for_path(&r, Some(".github/workflows/ci.yml")) {
            PipelineError::PermissionScope { path, .. } => assert_eq!(path, ".github/workflows/ci.yml"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn transport_errors_stay_distinct() {
        let err: PipelineError = ForgeError::Transport("reset".into()).into();
        assert_eq!(err, PipelineError::Transport("reset".into()));
    }

    #[test]
    fn scope_errors_carry_a_remediation_hint() {
        let err = PipelineError::PermissionScope {
            path: ".github/workflows/ci.yml".into(),
            message: "Not Found".into(),
        };
        assert!(err.hint().unwrap().contains("workflow"));
        assert!(PipelineError::InvalidInput("x".into()).hint().is_none());
    }

    #[test]
    fn at_stage_tags_results() {
        let result: std::result::Result<(), ForgeError> = Err(ForgeError::Transport("x".into()));
        let failure = result.at(Stage::Fork).unwrap_err();
        assert_eq!(failure.stage, Stage::Fork);
    }
}
