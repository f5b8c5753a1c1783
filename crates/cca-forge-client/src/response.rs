// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Parsed API responses and status classification

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;

use crate::error::{ForgeError, ForgeResult};
use crate::transport::RawResponse;

/// Response of a forge API call, whatever its status
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Body parsed as JSON, when it was JSON
    pub body: Option<serde_json::Value>,
    pub raw_text: String,
    /// Header names in lowercase
    pub headers: BTreeMap<String, String>,
}

/// Shared interpretation of a non-2xx status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// 401, or a 403 that is neither rate limiting nor a scope problem
    AccessDenied,
    /// 429, or 403 with an exhausted rate-limit budget
    RateLimited { reset_at: Option<DateTime<Utc>> },
    /// 403 naming the `workflow` scope
    WorkflowScope,
    NotFound,
    /// 409 or 422
    Conflict,
    Other,
}

impl From<RawResponse> for ApiResponse {
    fn from(raw: RawResponse) -> Self {
        let body = if raw.text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&raw.text).ok()
        };
        Self {
            status: raw.status,
            body,
            raw_text: raw.text,
            headers: raw.headers,
        }
    }
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Deserialize the body into `T`
    pub fn json<T: DeserializeOwned>(&self) -> ForgeResult<T> {
        match &self.body {
            Some(body) => Ok(serde_json::from_value(body.clone())?),
            None => Err(ForgeError::UnexpectedResponse {
                status: self.status,
                message: format!("expected a JSON body, got {:?}", truncate(&self.raw_text)),
            }),
        }
    }

    /// The host's `message` field, or the raw body text when there is none
    pub fn message(&self) -> String {
        self.body
            .as_ref()
            .and_then(|body| body.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| truncate(&self.raw_text))
    }

    /// All human-readable text the host returned: `message` plus any
    /// `errors[].message` entries
    pub fn detail(&self) -> String {
        let mut parts = vec![self.message()];
        if let Some(errors) = self.body.as_ref().and_then(|b| b.get("errors")).and_then(|e| e.as_array()) {
            parts.extend(
                errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                    .map(str::to_string),
            );
        }
        parts.retain(|p| !p.is_empty());
        parts.join("; ")
    }

    /// When the rate-limit budget resets, from `x-ratelimit-reset` (epoch
    /// seconds) or `retry-after` (seconds from now)
    pub fn rate_limit_reset(&self) -> Option<DateTime<Utc>> {
        if let Some(epoch) = self.header("x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok()) {
            return Utc.timestamp_opt(epoch, 0).single();
        }
        self.header("retry-after")
            .and_then(|v| v.parse::<i64>().ok())
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
    }

    /// Classify a failed response. Returns `None` for 2xx.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        if self.is_success() {
            return None;
        }
        let kind = match self.status {
            401 => FailureKind::AccessDenied,
            429 => FailureKind::RateLimited {
                reset_at: self.rate_limit_reset(),
            },
            403 if self.header("x-ratelimit-remaining") == Some("0")
                || self.message().to_ascii_lowercase().contains("rate limit") =>
            {
                FailureKind::RateLimited {
                    reset_at: self.rate_limit_reset(),
                }
            }
            403 if mentions_workflow_scope(&self.detail()) => FailureKind::WorkflowScope,
            403 => FailureKind::AccessDenied,
            404 => FailureKind::NotFound,
            409 | 422 => FailureKind::Conflict,
            _ => FailureKind::Other,
        };
        Some(kind)
    }
}

fn mentions_workflow_scope(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    text.contains("workflow") && (text.contains("scope") || text.contains("permission"))
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 300;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let head: String = text.chars().take(LIMIT).collect();
        format!("{}…", head)
    }
}
