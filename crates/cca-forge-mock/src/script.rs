// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Scripted failures and the call log

use cca_forge_client::{ForgeError, RawResponse};
use serde_json::{Value, json};

/// One request as the mock received it, with the path already decoded
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub body: Option<Value>,
    pub authorization: Option<String>,
}

impl RecordedCall {
    pub fn matches(&self, method: &str, path_fragment: &str) -> bool {
        self.method.eq_ignore_ascii_case(method) && self.path.contains(path_fragment)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FailureReply {
    Status {
        status: u16,
        body: Value,
        headers: Vec<(String, String)>,
    },
    Transport(String),
}

/// A canned answer that takes precedence over the simulated forge for
/// matching requests
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedFailure {
    method: String,
    path_fragment: String,
    reply: FailureReply,
    /// `None` means every matching request fails
    remaining: Option<u32>,
}

impl ScriptedFailure {
    /// Answer the next matching request with `status`
    pub fn status(method: &str, path_fragment: &str, status: u16) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path_fragment: path_fragment.to_string(),
            reply: FailureReply::Status {
                status,
                body: json!({ "message": default_message(status) }),
                headers: Vec::new(),
            },
            remaining: Some(1),
        }
    }

    /// Drop the next matching request without an answer
    pub fn transport(method: &str, path_fragment: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path_fragment: path_fragment.to_string(),
            reply: FailureReply::Transport("connection reset by peer".to_string()),
            remaining: Some(1),
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        if let FailureReply::Status { body, .. } = &mut self.reply {
            *body = json!({ "message": message });
        }
        self
    }

    pub fn with_body(mut self, value: Value) -> Self {
        if let FailureReply::Status { body, .. } = &mut self.reply {
            *body = value;
        }
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let FailureReply::Status { headers, .. } = &mut self.reply {
            headers.push((name.to_ascii_lowercase(), value.to_string()));
        }
        self
    }

    pub fn times(mut self, count: u32) -> Self {
        self.remaining = Some(count);
        self
    }

    pub fn always(mut self) -> Self {
        self.remaining = None;
        self
    }

    pub(crate) fn matches(&self, method: &str, path: &str) -> bool {
        self.method.eq_ignore_ascii_case(method) && path.contains(&self.path_fragment)
    }

    /// Use up one firing. Returns whether the rule is spent.
    pub(crate) fn consume(&mut self) -> bool {
        match &mut self.remaining {
            Some(n) => {
                *n = n.saturating_sub(1);
                *n == 0
            }
            None => false,
        }
    }

    pub(crate) fn reply(&self) -> Result<RawResponse, ForgeError> {
        match &self.reply {
            FailureReply::Status { status, body, headers } => {
                let mut response = crate::state::reply(*status, body.clone());
                response.headers.extend(headers.iter().cloned());
                Ok(response)
            }
            FailureReply::Transport(message) => Err(ForgeError::Transport(message.clone())),
        }
    }
}

fn default_message(status: u16) -> &'static str {
    match status {
        401 => "Bad credentials",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Validation Failed",
        429 => "API rate limit exceeded",
        500 => "Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Error",
    }
}
