// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cca_forge_client::{
    ApiRequest, AuthScheme, AuthSchemeTable, ForgeClient, ForgeError, ForgeResult, Method,
    RawResponse, Transport, paths,
};
use cca_test_utils::logged_tokio_test;

/// Records every request and answers with a fixed response
#[derive(Debug, Default)]
struct RecordingTransport {
    requests: Mutex<Vec<ApiRequest>>,
    status: u16,
    body: String,
    offline: bool,
}

impl RecordingTransport {
    fn answering(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            status,
            body: body.to_string(),
            ..Default::default()
        })
    }

    fn last(&self) -> ApiRequest {
        self.requests.lock().unwrap().last().cloned().expect("no request recorded")
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: ApiRequest) -> ForgeResult<RawResponse> {
        self.requests.lock().unwrap().push(request);
        if self.offline {
            return Err(ForgeError::Transport("connection refused".to_string()));
        }
        Ok(RawResponse {
            status: self.status,
            headers: Default::default(),
            text: self.body.clone(),
        })
    }
}

#[logged_tokio_test]
async fn every_request_declares_versioned_accept_header() {
    let transport = RecordingTransport::answering(200, r#"{"login":"octo"}"#);
    let client = ForgeClient::new(transport.clone(), "https://api.example.test/").unwrap();

    let response = client.get(&paths::user(), Some("ghp_abc")).await.unwrap();
    assert_eq!(response.status, 200);

    let request = transport.last();
    logger.log(&format!("request headers: {:?}", request.headers)).unwrap();
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.url.as_str(), "https://api.example.test/user");
    assert_eq!(request.header("accept"), Some("application/vnd.github+json"));
    assert_eq!(request.header("x-github-api-version"), Some("2022-11-28"));
    assert_eq!(request.header("authorization"), Some("token ghp_abc"));
}

#[logged_tokio_test]
async fn authorization_scheme_follows_the_table() {
    let transport = RecordingTransport::answering(200, "{}");
    let client = ForgeClient::new(transport.clone(), "https://api.example.test")
        .unwrap()
        .with_auth_schemes(AuthSchemeTable::default().with_prefix("corp_", AuthScheme::Token));

    client.get("/user", Some("github_pat_123")).await.unwrap();
    assert_eq!(transport.last().header("authorization"), Some("Bearer github_pat_123"));

    client.get("/user", Some("corp_123")).await.unwrap();
    assert_eq!(transport.last().header("authorization"), Some("token corp_123"));

    client.get("/user", None).await.unwrap();
    assert_eq!(transport.last().header("authorization"), None);
}

#[logged_tokio_test]
async fn non_success_status_is_not_an_error() {
    let transport = RecordingTransport::answering(422, r#"{"message":"Reference already exists"}"#);
    let client = ForgeClient::new(transport.clone(), "https://api.example.test").unwrap();

    let body = serde_json::json!({"ref": "refs/heads/x", "sha": "abc"});
    let response = client.post(&paths::refs("acme", "widgets"), &body, Some("t")).await.unwrap();

    assert_eq!(response.status, 422);
    assert_eq!(response.message(), "Reference already exists");
    assert_eq!(transport.last().body, Some(body));
}

#[logged_tokio_test]
async fn missing_response_surfaces_as_transport_error() {
    let transport = Arc::new(RecordingTransport {
        offline: true,
        ..Default::default()
    });
    let client = ForgeClient::new(transport, "https://api.example.test").unwrap();

    let err = client.get("/user", Some("t")).await.unwrap_err();
    assert!(err.is_transport(), "{:?}", err);
}

#[logged_tokio_test]
async fn base_path_prefix_is_preserved() {
    let transport = RecordingTransport::answering(200, "{}");
    let client = ForgeClient::new(transport.clone(), "https://ghe.example.test/api/v3").unwrap();

    client.get(&paths::repository("acme", "widgets"), None).await.unwrap();
    assert_eq!(
        transport.last().url.as_str(),
        "https://ghe.example.test/api/v3/repos/acme/widgets"
    );
}

#[test]
fn malformed_base_url_is_rejected() {
    let transport = RecordingTransport::answering(200, "{}");
    assert!(matches!(
        ForgeClient::new(transport, "not a url"),
        Err(ForgeError::InvalidUrl(_))
    ));
}
