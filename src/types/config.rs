//! Configuration Types
//!
//! Session configuration and provider endpoint types. Built and validated once
//! by [`crate::builders::SessionConfigBuilder`], read-only afterwards.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Session manager configuration.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Provider endpoints.
    pub provider: ProviderConfig,
    /// Client credentials.
    pub credentials: ClientCredentials,
    /// Redirect URI registered for this native client.
    pub redirect_uri: Url,
    /// Redirect URI the provider returns to after browser sign-out.
    pub logout_redirect_uri: Option<Url>,
    /// Scopes requested on login.
    pub default_scopes: Vec<String>,
    /// Extra parameters appended to the authorization request.
    pub additional_parameters: HashMap<String, String>,
    /// HTTP timeout.
    pub timeout: Duration,
    /// Refresh tokens this many seconds before expiry.
    pub refresh_threshold_secs: u64,
    /// What the session store does when a persist fails.
    pub persist_failure_policy: PersistFailurePolicy,
}

impl SessionConfig {
    /// Scopes joined for the `scope` request parameter.
    pub fn scope_param(&self) -> Option<String> {
        if self.default_scopes.is_empty() {
            None
        } else {
            Some(self.default_scopes.join(" "))
        }
    }
}

/// Provider endpoint configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Authorization endpoint URL.
    pub authorization_endpoint: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// Token revocation endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    /// Token introspection endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,
    /// OIDC userinfo endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    /// OIDC end-session endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
    /// Issuer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl ProviderConfig {
    /// Endpoints under the issuer's default authorization server layout.
    pub fn from_issuer(issuer: &str) -> Self {
        let base = issuer.trim_end_matches('/');
        Self {
            authorization_endpoint: format!("{}/v1/authorize", base),
            token_endpoint: format!("{}/v1/token", base),
            revocation_endpoint: Some(format!("{}/v1/revoke", base)),
            introspection_endpoint: Some(format!("{}/v1/introspect", base)),
            userinfo_endpoint: Some(format!("{}/v1/userinfo", base)),
            end_session_endpoint: Some(format!("{}/v1/logout", base)),
            issuer: Some(base.to_string()),
        }
    }
}

/// Client credentials for OAuth2 authentication.
#[derive(Clone)]
pub struct ClientCredentials {
    /// Client identifier.
    pub client_id: String,
    /// Client secret (for confidential clients).
    pub client_secret: Option<SecretString>,
    /// Client authentication method.
    pub auth_method: ClientAuthMethod,
}

impl Default for ClientCredentials {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            auth_method: ClientAuthMethod::None,
        }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_method", &self.auth_method)
            .finish()
    }
}

/// Client authentication method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// client_id and client_secret in request body.
    ClientSecretPost,
    /// HTTP Basic Authentication header.
    ClientSecretBasic,
    /// No client authentication (public native client).
    #[default]
    None,
}

/// Grant type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantType {
    #[serde(rename = "authorization_code")]
    AuthorizationCode,
    #[serde(rename = "password")]
    Password,
    #[serde(rename = "refresh_token")]
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::Password => "password",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// Behaviour of [`crate::session::SessionStore::set`] when the backend write fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistFailurePolicy {
    /// Keep the new value in memory and surface the error.
    #[default]
    KeepInMemory,
    /// Restore the previous in-memory value and surface the error.
    Rollback,
}

/// OIDC Discovery document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OIDCDiscoveryDocument {
    /// Issuer identifier.
    pub issuer: String,
    /// Authorization endpoint URL.
    pub authorization_endpoint: String,
    /// Token endpoint URL.
    pub token_endpoint: String,
    /// Userinfo endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    /// JWKS URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    /// Supported scopes.
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    /// Supported grant types.
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
    /// Revocation endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    /// Introspection endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,
    /// End-session endpoint (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
}

impl OIDCDiscoveryDocument {
    /// Convert to provider config.
    pub fn to_provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            authorization_endpoint: self.authorization_endpoint.clone(),
            token_endpoint: self.token_endpoint.clone(),
            revocation_endpoint: self.revocation_endpoint.clone(),
            introspection_endpoint: self.introspection_endpoint.clone(),
            userinfo_endpoint: self.userinfo_endpoint.clone(),
            end_session_endpoint: self.end_session_endpoint.clone(),
            issuer: Some(self.issuer.clone()),
        }
    }
}

/// Default configuration values.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REFRESH_THRESHOLD_SECS: u64 = 300;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_type_as_str() {
        assert_eq!(GrantType::AuthorizationCode.as_str(), "authorization_code");
        assert_eq!(GrantType::Password.as_str(), "password");
        assert_eq!(GrantType::RefreshToken.as_str(), "refresh_token");
    }

    #[test]
    fn test_provider_config_from_issuer() {
        let provider = ProviderConfig::from_issuer("https://dev.example.com/oauth2/default/");
        assert_eq!(
            provider.token_endpoint,
            "https://dev.example.com/oauth2/default/v1/token"
        );
        assert_eq!(
            provider.end_session_endpoint.as_deref(),
            Some("https://dev.example.com/oauth2/default/v1/logout")
        );
        assert_eq!(
            provider.issuer.as_deref(),
            Some("https://dev.example.com/oauth2/default")
        );
    }

    #[test]
    fn test_discovery_to_provider_config() {
        let json = r#"{
            "issuer": "https://example.com",
            "authorization_endpoint": "https://example.com/authorize",
            "token_endpoint": "https://example.com/token",
            "end_session_endpoint": "https://example.com/logout"
        }"#;
        let doc: OIDCDiscoveryDocument = serde_json::from_str(json).unwrap();

        let config = doc.to_provider_config();
        assert_eq!(config.authorization_endpoint, "https://example.com/authorize");
        assert_eq!(config.token_endpoint, "https://example.com/token");
        assert_eq!(config.end_session_endpoint.as_deref(), Some("https://example.com/logout"));
        assert!(config.revocation_endpoint.is_none());
        assert_eq!(config.issuer, Some("https://example.com".to_string()));
    }
}
