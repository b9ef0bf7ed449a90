//! Configuration Builder
//!
//! Fluent builder and TOML loading for [`SessionConfig`].

use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{ConfigurationError, OAuth2Error};
use crate::types::{
    ClientAuthMethod, ClientCredentials, PersistFailurePolicy, ProviderConfig, SessionConfig,
    DEFAULT_REFRESH_THRESHOLD_SECS, DEFAULT_TIMEOUT_SECS,
};

/// Session configuration builder.
#[derive(Default)]
pub struct SessionConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    auth_method: Option<ClientAuthMethod>,
    issuer: Option<String>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    revocation_endpoint: Option<String>,
    introspection_endpoint: Option<String>,
    userinfo_endpoint: Option<String>,
    end_session_endpoint: Option<String>,
    redirect_uri: Option<String>,
    logout_redirect_uri: Option<String>,
    default_scopes: Vec<String>,
    additional_parameters: HashMap<String, String>,
    timeout: Option<Duration>,
    refresh_threshold_secs: Option<u64>,
    persist_failure_policy: PersistFailurePolicy,
    // Endpoints came from discovery; don't fill gaps from the issuer layout.
    discovered: bool,
}

impl SessionConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load builder settings from a TOML document.
    ///
    /// ```toml
    /// issuer = "https://dev-123.okta.com/oauth2/default"
    /// client_id = "0oa1example"
    /// redirect_uri = "com.example.app:/callback"
    /// logout_redirect_uri = "com.example.app:/logout"
    /// scopes = "openid profile offline_access"
    ///
    /// [additional_parameters]
    /// prompt = "login"
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self, OAuth2Error> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| {
            OAuth2Error::Configuration(ConfigurationError::InvalidConfig {
                message: format!("Failed to parse config: {}", e),
            })
        })?;
        Ok(file.into_builder())
    }

    /// Load builder settings from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OAuth2Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OAuth2Error::Configuration(ConfigurationError::InvalidConfig {
                message: format!("Failed to read config file {}: {}", path.display(), e),
            })
        })?;
        Self::from_toml_str(&content)
    }

    /// Set client ID.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set client secret.
    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(SecretString::new(client_secret.into()));
        self
    }

    /// Set client authentication method.
    pub fn auth_method(mut self, method: ClientAuthMethod) -> Self {
        self.auth_method = Some(method);
        self
    }

    /// Set issuer. Endpoints not set explicitly default to the issuer's layout.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set authorization endpoint.
    pub fn authorization_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.authorization_endpoint = Some(endpoint.into());
        self
    }

    /// Set token endpoint.
    pub fn token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = Some(endpoint.into());
        self
    }

    /// Set revocation endpoint.
    pub fn revocation_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.revocation_endpoint = Some(endpoint.into());
        self
    }

    /// Set introspection endpoint.
    pub fn introspection_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.introspection_endpoint = Some(endpoint.into());
        self
    }

    /// Set userinfo endpoint.
    pub fn userinfo_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.userinfo_endpoint = Some(endpoint.into());
        self
    }

    /// Set end-session endpoint.
    pub fn end_session_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.end_session_endpoint = Some(endpoint.into());
        self
    }

    /// Set redirect URI.
    pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Set post-logout redirect URI.
    pub fn logout_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.logout_redirect_uri = Some(uri.into());
        self
    }

    /// Set default scopes.
    pub fn scopes<S: Into<String>>(mut self, scopes: impl IntoIterator<Item = S>) -> Self {
        self.default_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Add a default scope.
    pub fn add_scope(mut self, scope: impl Into<String>) -> Self {
        self.default_scopes.push(scope.into());
        self
    }

    /// Add an authorization request parameter.
    pub fn additional_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_parameters.insert(key.into(), value.into());
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Refresh this many seconds before expiry.
    pub fn refresh_threshold_secs(mut self, secs: u64) -> Self {
        self.refresh_threshold_secs = Some(secs);
        self
    }

    /// Set behaviour on persistence failure.
    pub fn persist_failure_policy(mut self, policy: PersistFailurePolicy) -> Self {
        self.persist_failure_policy = policy;
        self
    }

    /// Configure endpoints from provider config (e.g., from discovery).
    pub fn from_provider_config(mut self, provider: ProviderConfig) -> Self {
        self.authorization_endpoint = Some(provider.authorization_endpoint);
        self.token_endpoint = Some(provider.token_endpoint);
        self.revocation_endpoint = provider.revocation_endpoint;
        self.introspection_endpoint = provider.introspection_endpoint;
        self.userinfo_endpoint = provider.userinfo_endpoint;
        self.end_session_endpoint = provider.end_session_endpoint;
        self.issuer = provider.issuer.or(self.issuer);
        self.discovered = true;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<SessionConfig, OAuth2Error> {
        let client_id = self
            .client_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| missing("client_id"))?;

        let redirect_uri = parse_uri(self.redirect_uri.as_deref().ok_or_else(|| missing("redirect_uri"))?)?;
        let logout_redirect_uri = self
            .logout_redirect_uri
            .as_deref()
            .map(parse_uri)
            .transpose()?;

        let defaults = match (&self.issuer, self.discovered) {
            (Some(issuer), false) => ProviderConfig::from_issuer(issuer),
            (issuer, _) => ProviderConfig {
                issuer: issuer.clone(),
                ..Default::default()
            },
        };

        let provider = ProviderConfig {
            authorization_endpoint: self
                .authorization_endpoint
                .or(Some(defaults.authorization_endpoint).filter(|e| !e.is_empty()))
                .ok_or_else(|| missing("authorization_endpoint"))?,
            token_endpoint: self
                .token_endpoint
                .or(Some(defaults.token_endpoint).filter(|e| !e.is_empty()))
                .ok_or_else(|| missing("token_endpoint"))?,
            revocation_endpoint: self.revocation_endpoint.or(defaults.revocation_endpoint),
            introspection_endpoint: self
                .introspection_endpoint
                .or(defaults.introspection_endpoint),
            userinfo_endpoint: self.userinfo_endpoint.or(defaults.userinfo_endpoint),
            end_session_endpoint: self.end_session_endpoint.or(defaults.end_session_endpoint),
            issuer: defaults.issuer,
        };
        validate_endpoints(&provider)?;

        let auth_method = self.auth_method.unwrap_or(ClientAuthMethod::None);
        if auth_method != ClientAuthMethod::None && self.client_secret.is_none() {
            return Err(missing("client_secret"));
        }

        Ok(SessionConfig {
            provider,
            credentials: ClientCredentials {
                client_id,
                client_secret: self.client_secret,
                auth_method,
            },
            redirect_uri,
            logout_redirect_uri,
            default_scopes: self.default_scopes,
            additional_parameters: self.additional_parameters,
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            refresh_threshold_secs: self
                .refresh_threshold_secs
                .unwrap_or(DEFAULT_REFRESH_THRESHOLD_SECS),
            persist_failure_policy: self.persist_failure_policy,
        })
    }
}

/// Create a new session configuration builder.
pub fn session_config() -> SessionConfigBuilder {
    SessionConfigBuilder::new()
}

fn missing(field: &str) -> OAuth2Error {
    OAuth2Error::Configuration(ConfigurationError::MissingField {
        field: field.to_string(),
    })
}

fn parse_uri(value: &str) -> Result<Url, OAuth2Error> {
    Url::parse(value).map_err(|_| {
        OAuth2Error::Configuration(ConfigurationError::InvalidEndpoint {
            url: value.to_string(),
        })
    })
}

fn validate_endpoints(provider: &ProviderConfig) -> Result<(), OAuth2Error> {
    let optional = [
        &provider.revocation_endpoint,
        &provider.introspection_endpoint,
        &provider.userinfo_endpoint,
        &provider.end_session_endpoint,
    ];
    std::iter::once(provider.authorization_endpoint.as_str())
        .chain(std::iter::once(provider.token_endpoint.as_str()))
        .chain(optional.into_iter().filter_map(|e| e.as_deref()))
        .try_for_each(|endpoint| parse_uri(endpoint).map(|_| ()))
}

/// Scopes as a space-separated string or a list.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScopeList {
    Joined(String),
    List(Vec<String>),
}

impl ScopeList {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Joined(s) => s.split_whitespace().map(String::from).collect(),
            Self::List(list) => list,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    client_id: Option<String>,
    client_secret: Option<String>,
    auth_method: Option<ClientAuthMethod>,
    issuer: Option<String>,
    redirect_uri: Option<String>,
    logout_redirect_uri: Option<String>,
    scopes: Option<ScopeList>,
    #[serde(default)]
    additional_parameters: HashMap<String, String>,
    timeout_secs: Option<u64>,
    refresh_threshold_secs: Option<u64>,
    persist_failure_policy: Option<PersistFailurePolicy>,
    #[serde(default)]
    endpoints: EndpointsSection,
}

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EndpointsSection {
    authorization: Option<String>,
    token: Option<String>,
    revocation: Option<String>,
    introspection: Option<String>,
    userinfo: Option<String>,
    end_session: Option<String>,
}

impl ConfigFile {
    fn into_builder(self) -> SessionConfigBuilder {
        SessionConfigBuilder {
            client_id: self.client_id,
            client_secret: self.client_secret.map(SecretString::new),
            auth_method: self.auth_method,
            issuer: self.issuer,
            authorization_endpoint: self.endpoints.authorization,
            token_endpoint: self.endpoints.token,
            revocation_endpoint: self.endpoints.revocation,
            introspection_endpoint: self.endpoints.introspection,
            userinfo_endpoint: self.endpoints.userinfo,
            end_session_endpoint: self.endpoints.end_session,
            redirect_uri: self.redirect_uri,
            logout_redirect_uri: self.logout_redirect_uri,
            default_scopes: self.scopes.map(ScopeList::into_vec).unwrap_or_default(),
            additional_parameters: self.additional_parameters,
            timeout: self.timeout_secs.map(Duration::from_secs),
            refresh_threshold_secs: self.refresh_threshold_secs,
            persist_failure_policy: self.persist_failure_policy.unwrap_or_default(),
            discovered: false,
        }
    }
}
