//! Introspection Types
//!
//! Types for token introspection (RFC 7662), revocation hints (RFC 7009), and
//! OIDC userinfo claims.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Token type hint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// Token introspection response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is active.
    pub active: bool,
    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Client that requested the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Resource owner username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Token type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Expiration timestamp (Unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued-at timestamp (Unix seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Subject identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Additional claims.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl IntrospectionResponse {
    /// Check if token is active.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Get remaining lifetime in seconds.
    pub fn remaining_lifetime(&self) -> Option<i64> {
        self.exp.map(|exp| {
            let now = chrono::Utc::now().timestamp();
            if exp > now {
                exp - now
            } else {
                0
            }
        })
    }

    /// Get scopes as vector.
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_ref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default()
    }
}

/// Identity claims returned by the userinfo endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserClaims(serde_json::Map<String, serde_json::Value>);

impl UserClaims {
    /// Subject identifier.
    pub fn subject(&self) -> Option<&str> {
        self.string_claim("sub")
    }

    /// Email address.
    pub fn email(&self) -> Option<&str> {
        self.string_claim("email")
    }

    /// Display name.
    pub fn name(&self) -> Option<&str> {
        self.string_claim("name")
    }

    /// Preferred username.
    pub fn preferred_username(&self) -> Option<&str> {
        self.string_claim("preferred_username")
    }

    /// Raw claim by name.
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// All claims.
    pub fn claims(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }

    fn string_claim(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_str())
    }
}
