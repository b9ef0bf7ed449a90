//! Form Requests
//!
//! Url-encoded POST bodies and client authentication shared by the token,
//! revocation and introspection endpoints.

use base64::Engine;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

use crate::core::transport::{HttpMethod, HttpRequest, HttpResponse};
use crate::error::{create_error_from_response, OAuth2Error, ProtocolError};
use crate::types::{ClientAuthMethod, ClientCredentials};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Builder for an authenticated form POST.
pub struct FormRequest {
    url: String,
    params: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl FormRequest {
    /// Start a form POST to `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
            timeout: None,
        }
    }

    /// Append a parameter.
    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }

    /// Append a parameter when present.
    pub fn param_opt(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Finish the request, authenticating the client per its configured method.
    ///
    /// Public clients send `client_id` in the body; `client_secret_post` adds the
    /// secret next to it; `client_secret_basic` form-encodes both into the
    /// Authorization header.
    pub fn build(mut self, credentials: &ClientCredentials) -> HttpRequest {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), FORM_CONTENT_TYPE.to_string());
        headers.insert("accept".to_string(), "application/json".to_string());

        match (credentials.auth_method, &credentials.client_secret) {
            (ClientAuthMethod::ClientSecretBasic, Some(secret)) => {
                let pair = format!(
                    "{}:{}",
                    form_encode(&credentials.client_id),
                    form_encode(secret.expose_secret())
                );
                let encoded = base64::engine::general_purpose::STANDARD.encode(pair);
                headers.insert("authorization".to_string(), format!("Basic {}", encoded));
            }
            (ClientAuthMethod::ClientSecretPost, Some(secret)) => {
                self.params
                    .push(("client_id".to_string(), credentials.client_id.clone()));
                self.params.push((
                    "client_secret".to_string(),
                    secret.expose_secret().to_string(),
                ));
            }
            _ => {
                self.params
                    .push(("client_id".to_string(), credentials.client_id.clone()));
            }
        }

        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish();

        HttpRequest {
            method: HttpMethod::Post,
            url: self.url,
            headers,
            body: Some(body),
            timeout: self.timeout,
        }
    }
}

/// Decode a JSON success body, mapping any non-2xx status to a provider error.
pub fn parse_json_response<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, OAuth2Error> {
    if !response.is_success() {
        return Err(create_error_from_response(response.status, &response.body));
    }

    serde_json::from_str(&response.body).map_err(|e| {
        OAuth2Error::Protocol(ProtocolError::InvalidJson {
            message: e.to_string(),
        })
    })
}

fn form_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use secrecy::SecretString;

    fn credentials(method: ClientAuthMethod, secret: Option<&str>) -> ClientCredentials {
        ClientCredentials {
            client_id: "client-1".to_string(),
            client_secret: secret.map(|s| SecretString::new(s.to_string())),
            auth_method: method,
        }
    }

    #[test]
    fn test_public_client_sends_client_id() {
        let request = FormRequest::new("https://example.com/token")
            .param("grant_type", "refresh_token")
            .param("refresh_token", "R 1&x")
            .build(&credentials(ClientAuthMethod::None, None));

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.form_value("client_id").as_deref(), Some("client-1"));
        assert_eq!(request.form_value("refresh_token").as_deref(), Some("R 1&x"));
        assert!(request.form_value("client_secret").is_none());
        assert!(!request.headers.contains_key("authorization"));
    }

    #[test]
    fn test_secret_post() {
        let request = FormRequest::new("https://example.com/token")
            .build(&credentials(ClientAuthMethod::ClientSecretPost, Some("s3cret")));
        assert_eq!(request.form_value("client_secret").as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_secret_basic() {
        let request = FormRequest::new("https://example.com/token")
            .param_opt("scope", None::<String>)
            .build(&credentials(ClientAuthMethod::ClientSecretBasic, Some("s3cret")));

        let expected = base64::engine::general_purpose::STANDARD.encode("client-1:s3cret");
        assert_eq!(
            request.headers.get("authorization"),
            Some(&format!("Basic {}", expected))
        );
        assert!(request.form_value("client_id").is_none());
        assert!(request.form_value("scope").is_none());
    }

    #[test]
    fn test_secret_basic_encodes_reserved_characters() {
        let creds = ClientCredentials {
            client_id: "app:1".to_string(),
            client_secret: Some(SecretString::new("p@ss:wörd +%".to_string())),
            auth_method: ClientAuthMethod::ClientSecretBasic,
        };
        let request = FormRequest::new("https://example.com/token").build(&creds);

        let header = request.headers.get("authorization").unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(header.trim_start_matches("Basic "))
            .unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            "app%3A1:p%40ss%3Aw%C3%B6rd+%2B%25"
        );
    }

    #[test]
    fn test_parse_json_response_maps_provider_error() {
        let response = HttpResponse::new(
            400,
            r#"{"error":"invalid_grant","error_description":"The refresh token is invalid"}"#,
        );
        let err = parse_json_response::<serde_json::Value>(&response).unwrap_err();
        assert!(matches!(
            err,
            OAuth2Error::Provider(ProviderError::InvalidGrant { .. })
        ));
    }

    #[test]
    fn test_parse_json_response_invalid_json() {
        let response = HttpResponse::new(200, "not json");
        let err = parse_json_response::<serde_json::Value>(&response).unwrap_err();
        assert!(matches!(
            err,
            OAuth2Error::Protocol(ProtocolError::InvalidJson { .. })
        ));
    }
}
