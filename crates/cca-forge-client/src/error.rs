// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the forge client

use thiserror::Error;

/// Result type alias for forge client operations
pub type ForgeResult<T> = std::result::Result<T, ForgeError>;

/// Errors raised before a usable HTTP response exists.
///
/// Non-2xx statuses are *not* errors at this layer; they come back as an
/// [`crate::ApiResponse`].
#[derive(Debug, Error)]
pub enum ForgeError {
    /// No response was received (DNS, TLS, connection reset, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected response ({status}): {message}")]
    UnexpectedResponse { status: u16, message: String },

    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),
}

impl ForgeError {
    /// Whether the error means the request never produced a response.
    pub fn is_transport(&self) -> bool {
        matches!(self, ForgeError::Transport(_))
    }
}

impl From<reqwest::Error> for ForgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            ForgeError::ClientSetup(err.to_string())
        } else {
            ForgeError::Transport(err.to_string())
        }
    }
}
