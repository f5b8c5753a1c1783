// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! REST client for the code-hosting forge
//!
//! This crate is the single request/response wrapper the contribution
//! pipeline uses to talk to the forge. It owns the concerns that are the same
//! for every endpoint:
//!
//! - choosing the `Authorization` scheme from the token prefix ([`AuthSchemeTable`])
//! - the versioned `Accept` header and API-version header
//! - JSON (de)serialization and base64 transport encoding of file content
//! - telling transport failures apart from HTTP-level failures
//!
//! [`ForgeClient::call`] never fails on a non-2xx status. Callers receive an
//! [`ApiResponse`] and decide what the status means for their stage;
//! [`ApiResponse::failure_kind`] offers the shared classification.

pub mod auth;
pub mod client;
pub mod error;
pub mod paths;
pub mod response;
pub mod transport;
pub mod types;

pub use auth::*;
pub use client::*;
pub use error::*;
pub use response::*;
pub use transport::*;

pub use reqwest::Method;
