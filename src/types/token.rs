//! Token Types
//!
//! Token endpoint responses and the immutable token set held by the session.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{OAuth2Error, ProtocolError};

/// Token response from authorization server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type (usually "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expires in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// ID token (OIDC).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// One granted credential bundle.
///
/// A `TokenSet` only exists with a non-empty access token; construct it through
/// [`TokenSet::from_response`]. It is never mutated in place: a refresh produces
/// a new value that replaces the old one wholesale.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    access_token: String,
    token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
    issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl TokenSet {
    /// Build a token set from a successful grant response.
    pub fn from_response(response: &TokenResponse) -> Result<Self, OAuth2Error> {
        if response.access_token.is_empty() {
            return Err(OAuth2Error::Protocol(ProtocolError::MissingField {
                field: "access_token".to_string(),
            }));
        }

        let now = Utc::now();
        // An expiry too large to represent is treated as unknown.
        let expires_at = response
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime));

        let scopes = response
            .scope
            .as_ref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        Ok(Self {
            access_token: response.access_token.clone(),
            token_type: response.token_type.clone(),
            refresh_token: response.refresh_token.clone().filter(|t| !t.is_empty()),
            id_token: response.id_token.clone().filter(|t| !t.is_empty()),
            scopes,
            issued_at: now,
            expires_at,
        })
    }

    /// Carry forward credentials a refresh response left out.
    ///
    /// A previously known refresh token is never dropped silently; the same
    /// applies to the ID token, which providers commonly omit on refresh.
    pub fn with_fallback(mut self, previous: &TokenSet) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.refresh_token.clone();
        }
        if self.id_token.is_none() {
            self.id_token = previous.id_token.clone();
        }
        if self.scopes.is_empty() {
            self.scopes = previous.scopes.clone();
        }
        self
    }

    /// Access token value.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Token type.
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Refresh token, if the grant issued one.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// ID token, if the grant issued one.
    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    /// Granted scopes.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// When the grant was received.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Access token expiry, when the provider reported one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether this token set represents an authenticated session.
    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Check if has refresh token.
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Check if the access token is expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| exp <= Utc::now())
            .unwrap_or(false)
    }

    /// Check if the access token expires within `threshold_secs`.
    pub fn is_expiring_soon(&self, threshold_secs: i64) -> bool {
        let Some(exp) = self.expires_at else {
            return false;
        };
        match Duration::try_seconds(threshold_secs)
            .and_then(|threshold| Utc::now().checked_add_signed(threshold))
        {
            Some(horizon) => exp <= horizon,
            // Horizon past the representable range: every known expiry is inside it.
            None => threshold_secs > 0,
        }
    }

    /// Get remaining lifetime in seconds.
    pub fn remaining_lifetime(&self) -> Option<i64> {
        self.expires_at.map(|exp| {
            let now = Utc::now();
            if exp > now {
                (exp - now).num_seconds()
            } else {
                0
            }
        })
    }

    /// Format as Authorization header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("scopes", &self.scopes)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
