//! Token Introspection
//!
//! RFC 7662 introspection and OIDC userinfo requests.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{parse_json_response, FormRequest, HttpMethod, HttpRequest, HttpTransport};
use crate::error::{ConfigurationError, OAuth2Error};
use crate::types::{IntrospectionResponse, SessionConfig, TokenTypeHint, UserClaims};

/// Sends introspection and userinfo requests for a given token.
pub struct TokenIntrospector {
    config: Arc<SessionConfig>,
    transport: Arc<dyn HttpTransport>,
}

impl TokenIntrospector {
    pub fn new(config: Arc<SessionConfig>, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    /// Introspect `token` at the provider.
    pub async fn introspect(
        &self,
        token: &str,
        hint: Option<TokenTypeHint>,
    ) -> Result<IntrospectionResponse, OAuth2Error> {
        let endpoint = endpoint(
            &self.config.provider.introspection_endpoint,
            "introspection_endpoint",
        )?;

        let request = FormRequest::new(endpoint)
            .param("token", token)
            .param_opt("token_type_hint", hint.map(|h| h.as_str()))
            .timeout(self.config.timeout)
            .build(&self.config.credentials);

        let response = self.transport.send(request).await?;
        let introspection: IntrospectionResponse = parse_json_response(&response)?;

        tracing::debug!(active = introspection.active, "token introspected");
        Ok(introspection)
    }

    /// Fetch identity claims with a bearer access token.
    pub async fn user_info(&self, access_token: &str) -> Result<UserClaims, OAuth2Error> {
        let endpoint = endpoint(&self.config.provider.userinfo_endpoint, "userinfo_endpoint")?;

        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), format!("Bearer {}", access_token));
        headers.insert("accept".to_string(), "application/json".to_string());

        let request = HttpRequest {
            method: HttpMethod::Get,
            url: endpoint.to_string(),
            headers,
            body: None,
            timeout: Some(self.config.timeout),
        };

        let response = self.transport.send(request).await?;
        parse_json_response(&response)
    }
}

fn endpoint<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, OAuth2Error> {
    value.as_deref().ok_or_else(|| {
        OAuth2Error::Configuration(ConfigurationError::EndpointNotConfigured {
            endpoint: name.to_string(),
        })
    })
}
