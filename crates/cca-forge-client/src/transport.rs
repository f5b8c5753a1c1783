// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Wire transport abstraction
//!
//! [`Transport`] is the seam between request construction and the network.
//! [`HttpTransport`] sends requests with `reqwest`; tests substitute an
//! in-memory forge.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method};
use url::Url;

use crate::error::{ForgeError, ForgeResult};

/// A fully built request, ready to be sent
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    /// Header name/value pairs, names in lowercase
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Value of the first header named `name` (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status, headers and body text of a received response
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    /// Header names in lowercase
    pub headers: BTreeMap<String, String>,
    pub text: String,
}

/// Sends one request and returns whatever the server answered.
///
/// Implementations must return `Ok` for every response the server produced,
/// whatever its status, and reserve `Err(ForgeError::Transport)` for requests
/// that never got an answer.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(&self, request: ApiRequest) -> ForgeResult<RawResponse>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: HttpClient,
}

impl HttpTransport {
    /// Build a transport with the given user agent and per-request timeout
    pub fn new(user_agent: &str, timeout: Duration) -> ForgeResult<Self> {
        let http_client = HttpClient::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| ForgeError::ClientSetup(e.to_string()))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> ForgeResult<RawResponse> {
        let mut builder = self.http_client.request(request.method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let text = response.text().await?;

        Ok(RawResponse {
            status,
            headers,
            text,
        })
    }
}
