// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Main forge client implementation

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use url::Url;

use crate::auth::AuthSchemeTable;
use crate::error::ForgeResult;
use crate::response::ApiResponse;
use crate::transport::{ApiRequest, HttpTransport, Transport};

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_API_VERSION: &str = "2022-11-28";
pub const ACCEPT_HEADER: &str = "application/vnd.github+json";

/// Connection settings for [`ForgeClient::http`]
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_version: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            user_agent: concat!("cca/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Stateless request/response wrapper over the forge REST API.
///
/// Cloning is cheap; clones share the transport.
#[derive(Debug, Clone)]
pub struct ForgeClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    api_version: String,
    auth: AuthSchemeTable,
}

impl ForgeClient {
    /// Create a client over an arbitrary transport
    pub fn new(transport: Arc<dyn Transport>, base_url: &str) -> ForgeResult<Self> {
        // Reject malformed base URLs up front rather than on the first call.
        Url::parse(base_url)?;
        Ok(Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            auth: AuthSchemeTable::default(),
        })
    }

    /// Create a client that talks HTTP through `reqwest`
    pub fn http(settings: &ClientSettings) -> ForgeResult<Self> {
        let transport = HttpTransport::new(&settings.user_agent, settings.timeout)?;
        Ok(Self::new(Arc::new(transport), &settings.base_url)?.with_api_version(&settings.api_version))
    }

    pub fn with_auth_schemes(mut self, auth: AuthSchemeTable) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_api_version(mut self, api_version: &str) -> Self {
        self.api_version = api_version.to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_schemes(&self) -> &AuthSchemeTable {
        &self.auth
    }

    /// Issue one request.
    ///
    /// `path` is an already-encoded path (see [`crate::paths`]) appended to the
    /// base URL. Returns `Ok` for every HTTP status; only transport-level
    /// failures are `Err`.
    pub async fn call<B: Serialize + ?Sized>(
        &self,
        path: &str,
        method: Method,
        body: Option<&B>,
        token: Option<&str>,
    ) -> ForgeResult<ApiResponse> {
        let url = Url::parse(&format!("{}{}", self.base_url, path))?;

        let mut headers = vec![
            ("accept".to_string(), ACCEPT_HEADER.to_string()),
            ("x-github-api-version".to_string(), self.api_version.clone()),
        ];
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            headers.push(("authorization".to_string(), self.auth.authorization(token)));
        }

        let body = body.map(serde_json::to_value).transpose()?;
        let request = ApiRequest {
            method: method.clone(),
            url,
            headers,
            body,
        };

        let raw = self.transport.send(request).await.map_err(|err| {
            tracing::debug!(%method, path, error = %err, "forge request failed without response");
            err
        })?;
        let response = ApiResponse::from(raw);
        tracing::debug!(%method, path, status = response.status, "forge request completed");
        Ok(response)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> ForgeResult<ApiResponse> {
        self.call(path, Method::GET, None::<&()>, token).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> ForgeResult<ApiResponse> {
        self.call(path, Method::POST, Some(body), token).await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> ForgeResult<ApiResponse> {
        self.call(path, Method::PUT, Some(body), token).await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
    ) -> ForgeResult<ApiResponse> {
        self.call(path, Method::PATCH, Some(body), token).await
    }
}
