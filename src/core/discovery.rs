//! OIDC Discovery
//!
//! Resolves provider endpoints from `/.well-known/openid-configuration`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::transport::{HttpMethod, HttpRequest, HttpTransport};
use crate::error::{ConfigurationError, OAuth2Error, ProtocolError};
use crate::types::{OIDCDiscoveryDocument, ProviderConfig};

struct DiscoveryCacheEntry {
    document: OIDCDiscoveryDocument,
    expires_at: Instant,
}

/// Discovery client interface (for dependency injection).
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Fetch discovery document for issuer.
    async fn fetch(&self, issuer: &str) -> Result<OIDCDiscoveryDocument, OAuth2Error>;

    /// Get provider config from discovery.
    async fn get_provider_config(&self, issuer: &str) -> Result<ProviderConfig, OAuth2Error> {
        Ok(self.fetch(issuer).await?.to_provider_config())
    }

    /// Clear cache for issuer, or all issuers.
    fn clear_cache(&self, issuer: Option<&str>);
}

/// Default discovery client implementation.
pub struct DefaultDiscoveryClient {
    transport: Arc<dyn HttpTransport>,
    cache: Mutex<HashMap<String, DiscoveryCacheEntry>>,
    cache_ttl: Duration,
}

impl DefaultDiscoveryClient {
    /// Create new discovery client with a one hour cache.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_cache_ttl(transport, Duration::from_secs(3600))
    }

    /// Create discovery client with custom cache TTL.
    pub fn with_cache_ttl(transport: Arc<dyn HttpTransport>, cache_ttl: Duration) -> Self {
        Self {
            transport,
            cache: Mutex::new(HashMap::new()),
            cache_ttl,
        }
    }

    fn normalize_issuer(issuer: &str) -> String {
        issuer.trim_end_matches('/').to_string()
    }

    fn get_from_cache(&self, issuer: &str) -> Option<OIDCDiscoveryDocument> {
        let key = Self::normalize_issuer(issuer);
        let mut cache = self.cache.lock();

        match cache.get(&key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.document.clone()),
            Some(_) => {
                cache.remove(&key);
                None
            }
            None => None,
        }
    }

    fn set_cache(&self, issuer: &str, document: OIDCDiscoveryDocument) {
        self.cache.lock().insert(
            Self::normalize_issuer(issuer),
            DiscoveryCacheEntry {
                document,
                expires_at: Instant::now() + self.cache_ttl,
            },
        );
    }
}

#[async_trait]
impl DiscoveryClient for DefaultDiscoveryClient {
    async fn fetch(&self, issuer: &str) -> Result<OIDCDiscoveryDocument, OAuth2Error> {
        if let Some(cached) = self.get_from_cache(issuer) {
            return Ok(cached);
        }

        let normalized_issuer = Self::normalize_issuer(issuer);
        let discovery_url = format!("{}/.well-known/openid-configuration", normalized_issuer);
        tracing::debug!(issuer = %normalized_issuer, "fetching discovery document");

        let request = HttpRequest {
            method: HttpMethod::Get,
            url: discovery_url,
            headers: [("accept".to_string(), "application/json".to_string())]
                .into_iter()
                .collect(),
            body: None,
            timeout: None,
        };

        let response = self.transport.send(request).await?;

        if response.status != 200 {
            return Err(OAuth2Error::Configuration(ConfigurationError::DiscoveryFailed {
                message: format!("Discovery request failed with status {}", response.status),
            }));
        }

        let document: OIDCDiscoveryDocument =
            serde_json::from_str(&response.body).map_err(|e| {
                OAuth2Error::Protocol(ProtocolError::InvalidJson {
                    message: e.to_string(),
                })
            })?;

        if document.authorization_endpoint.is_empty() || document.token_endpoint.is_empty() {
            return Err(OAuth2Error::Configuration(ConfigurationError::DiscoveryFailed {
                message: "Discovery document missing required endpoints".to_string(),
            }));
        }

        let response_issuer = Self::normalize_issuer(&document.issuer);
        if response_issuer != normalized_issuer {
            return Err(OAuth2Error::Configuration(ConfigurationError::DiscoveryFailed {
                message: format!(
                    "Issuer mismatch: expected {}, got {}",
                    normalized_issuer, response_issuer
                ),
            }));
        }

        self.set_cache(issuer, document.clone());
        Ok(document)
    }

    fn clear_cache(&self, issuer: Option<&str>) {
        let mut cache = self.cache.lock();
        match issuer {
            Some(i) => {
                cache.remove(&Self::normalize_issuer(i));
            }
            None => cache.clear(),
        }
    }
}

/// Mock discovery client for testing.
#[derive(Default)]
pub struct MockDiscoveryClient {
    documents: Mutex<HashMap<String, OIDCDiscoveryDocument>>,
    fetch_history: Mutex<Vec<String>>,
}

impl MockDiscoveryClient {
    /// Create new mock discovery client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set discovery document for issuer.
    pub fn set_document(&self, issuer: &str, document: OIDCDiscoveryDocument) -> &Self {
        self.documents.lock().insert(issuer.to_string(), document);
        self
    }

    /// Get fetch history.
    pub fn get_fetch_history(&self) -> Vec<String> {
        self.fetch_history.lock().clone()
    }
}

#[async_trait]
impl DiscoveryClient for MockDiscoveryClient {
    async fn fetch(&self, issuer: &str) -> Result<OIDCDiscoveryDocument, OAuth2Error> {
        self.fetch_history.lock().push(issuer.to_string());

        self.documents.lock().get(issuer).cloned().ok_or_else(|| {
            OAuth2Error::Configuration(ConfigurationError::DiscoveryFailed {
                message: format!("No mock document for issuer: {}", issuer),
            })
        })
    }

    fn clear_cache(&self, _issuer: Option<&str>) {}
}

/// Create mock discovery document for testing.
pub fn create_mock_discovery_document(issuer: &str) -> OIDCDiscoveryDocument {
    OIDCDiscoveryDocument {
        issuer: issuer.to_string(),
        authorization_endpoint: format!("{}/v1/authorize", issuer),
        token_endpoint: format!("{}/v1/token", issuer),
        userinfo_endpoint: Some(format!("{}/v1/userinfo", issuer)),
        jwks_uri: Some(format!("{}/v1/keys", issuer)),
        scopes_supported: vec!["openid".to_string(), "profile".to_string(), "offline_access".to_string()],
        grant_types_supported: vec![
            "authorization_code".to_string(),
            "password".to_string(),
            "refresh_token".to_string(),
        ],
        revocation_endpoint: Some(format!("{}/v1/revoke", issuer)),
        introspection_endpoint: Some(format!("{}/v1/introspect", issuer)),
        end_session_endpoint: Some(format!("{}/v1/logout", issuer)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::MockHttpTransport;

    const ISSUER: &str = "https://dev.example.com/oauth2/default";

    #[tokio::test]
    async fn test_fetch_caches_document() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(
            200,
            serde_json::to_value(create_mock_discovery_document(ISSUER)).unwrap(),
        );
        let client = DefaultDiscoveryClient::new(transport.clone());

        let first = client.fetch(ISSUER).await.unwrap();
        let second = client.fetch(&format!("{}/", ISSUER)).await.unwrap();

        assert_eq!(first.token_endpoint, second.token_endpoint);
        assert_eq!(transport.request_count(), 1);
        assert_eq!(
            transport.get_last_request().unwrap().url,
            format!("{}/.well-known/openid-configuration", ISSUER)
        );
    }

    #[tokio::test]
    async fn test_issuer_mismatch_rejected() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_json_response(
            200,
            serde_json::to_value(create_mock_discovery_document("https://evil.example.com"))
                .unwrap(),
        );
        let client = DefaultDiscoveryClient::new(transport);

        let err = client.fetch(ISSUER).await.unwrap_err();
        assert!(matches!(
            err,
            OAuth2Error::Configuration(ConfigurationError::DiscoveryFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_clear_cache_refetches() {
        let transport = Arc::new(MockHttpTransport::new());
        let body = serde_json::to_value(create_mock_discovery_document(ISSUER)).unwrap();
        transport
            .queue_json_response(200, body.clone())
            .queue_json_response(200, body);
        let client = DefaultDiscoveryClient::new(transport.clone());

        client.fetch(ISSUER).await.unwrap();
        client.clear_cache(Some(ISSUER));
        client.fetch(ISSUER).await.unwrap();
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_discovery_provider_config() {
        let client = MockDiscoveryClient::new();
        client.set_document(ISSUER, create_mock_discovery_document(ISSUER));

        let config = client.get_provider_config(ISSUER).await.unwrap();
        assert_eq!(config.token_endpoint, format!("{}/v1/token", ISSUER));
        assert_eq!(client.get_fetch_history(), vec![ISSUER.to_string()]);
        assert!(client.fetch("https://unknown.example.com").await.is_err());
    }
}
