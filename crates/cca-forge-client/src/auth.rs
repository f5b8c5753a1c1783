// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Authorization scheme selection

use serde::{Deserialize, Serialize};

/// Scheme used in the `Authorization` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// `Authorization: token <value>`, used by classic personal access tokens
    Token,
    /// `Authorization: Bearer <value>`
    Bearer,
}

impl AuthScheme {
    /// Render the full header value for a token
    pub fn header_value(self, token: &str) -> String {
        match self {
            AuthScheme::Token => format!("token {}", token),
            AuthScheme::Bearer => format!("Bearer {}", token),
        }
    }
}

/// Token prefixes issued for classic tokens (personal, OAuth, user-to-server,
/// server-to-server and refresh tokens).
pub const CLASSIC_TOKEN_PREFIXES: &[&str] = &["ghp_", "gho_", "ghu_", "ghs_", "ghr_"];

/// Prefix-to-scheme table.
///
/// The first matching prefix wins; tokens matching no entry use the fallback
/// scheme. Entries registered through [`AuthSchemeTable::with_prefix`] are
/// consulted before the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSchemeTable {
    entries: Vec<(String, AuthScheme)>,
    fallback: AuthScheme,
}

impl Default for AuthSchemeTable {
    fn default() -> Self {
        Self {
            entries: CLASSIC_TOKEN_PREFIXES
                .iter()
                .map(|prefix| (prefix.to_string(), AuthScheme::Token))
                .collect(),
            fallback: AuthScheme::Bearer,
        }
    }
}

impl AuthSchemeTable {
    /// A table with no prefixes; every token uses `fallback`
    pub fn empty(fallback: AuthScheme) -> Self {
        Self {
            entries: Vec::new(),
            fallback,
        }
    }

    /// Register a prefix, taking precedence over existing entries
    pub fn with_prefix(mut self, prefix: impl Into<String>, scheme: AuthScheme) -> Self {
        self.entries.insert(0, (prefix.into(), scheme));
        self
    }

    /// Change the scheme used when no prefix matches
    pub fn with_fallback(mut self, scheme: AuthScheme) -> Self {
        self.fallback = scheme;
        self
    }

    /// Scheme selected for `token`
    pub fn scheme_for(&self, token: &str) -> AuthScheme {
        self.entries
            .iter()
            .find(|(prefix, _)| token.starts_with(prefix.as_str()))
            .map(|(_, scheme)| *scheme)
            .unwrap_or(self.fallback)
    }

    /// Full `Authorization` header value for `token`
    pub fn authorization(&self, token: &str) -> String {
        self.scheme_for(token).header_value(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_prefixes_use_token_scheme() {
        let table = AuthSchemeTable::default();
        for prefix in CLASSIC_TOKEN_PREFIXES {
            let token = format!("{}abc", prefix);
            assert_eq!(table.scheme_for(&token), AuthScheme::Token, "{}", token);
        }
        assert_eq!(table.authorization("ghp_123"), "token ghp_123");
    }

    #[test]
    fn other_tokens_use_bearer() {
        let table = AuthSchemeTable::default();
        assert_eq!(table.scheme_for("github_pat_11AAA"), AuthScheme::Bearer);
        assert_eq!(table.authorization("eyJhbGci"), "Bearer eyJhbGci");
    }

    #[test]
    fn registered_prefix_overrides_defaults() {
        let table = AuthSchemeTable::default().with_prefix("ghp_legacy_", AuthScheme::Bearer);
        assert_eq!(table.scheme_for("ghp_legacy_x"), AuthScheme::Bearer);
        assert_eq!(table.scheme_for("ghp_x"), AuthScheme::Token);
    }

    #[test]
    fn empty_table_uses_fallback() {
        let table = AuthSchemeTable::empty(AuthScheme::Token);
        assert_eq!(table.scheme_for("ghp_x"), AuthScheme::Token);
        assert_eq!(table.with_fallback(AuthScheme::Bearer).scheme_for("x"), AuthScheme::Bearer);
    }
}
