//! Token Refresh
//!
//! Exchanges the session's refresh token for a new token set. At most one
//! refresh request is in flight per session: concurrent callers join the
//! running round and all receive its result.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::{parse_json_response, FormRequest, HttpTransport};
use crate::error::{NetworkError, OAuth2Error, TokenError};
use crate::session::SessionStore;
use crate::types::{GrantType, SessionConfig, TokenResponse, TokenSet};

type RefreshRound = Shared<BoxFuture<'static, Result<TokenSet, OAuth2Error>>>;

struct RefreshClient {
    config: Arc<SessionConfig>,
    transport: Arc<dyn HttpTransport>,
    store: Arc<SessionStore>,
}

impl RefreshClient {
    async fn run(&self) -> Result<TokenSet, OAuth2Error> {
        let current = self
            .store
            .get()
            .await
            .ok_or(OAuth2Error::Token(TokenError::NoRefreshToken))?;
        let refresh_token = current
            .refresh_token()
            .ok_or(OAuth2Error::Token(TokenError::NoRefreshToken))?;

        tracing::info!("refreshing access token");

        let request = FormRequest::new(&self.config.provider.token_endpoint)
            .param("grant_type", GrantType::RefreshToken.as_str())
            .param("refresh_token", refresh_token)
            .timeout(self.config.timeout)
            .build(&self.config.credentials);

        let response = self.transport.send(request).await?;
        let token_response: TokenResponse = parse_json_response(&response)?;
        let next = TokenSet::from_response(&token_response)?.with_fallback(&current);

        if !self
            .store
            .compare_and_set(Some(&current), Some(next.clone()))
            .await?
        {
            tracing::warn!("session changed during refresh, discarding result");
            return Err(OAuth2Error::Token(TokenError::SessionChanged));
        }

        tracing::info!(
            expires_in = ?next.remaining_lifetime(),
            rotated = next.refresh_token() != current.refresh_token(),
            "access token refreshed"
        );
        Ok(next)
    }
}

/// Single-flight refresh of the session's token set.
pub struct RefreshCoordinator {
    client: Arc<RefreshClient>,
    in_flight: Arc<Mutex<Option<(u64, RefreshRound)>>>,
    rounds: AtomicU64,
}

impl RefreshCoordinator {
    /// Create a coordinator refreshing the token set held by `store`.
    pub fn new(
        config: Arc<SessionConfig>,
        transport: Arc<dyn HttpTransport>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            client: Arc::new(RefreshClient {
                config,
                transport,
                store,
            }),
            in_flight: Arc::new(Mutex::new(None)),
            rounds: AtomicU64::new(0),
        }
    }

    /// Refresh the token set.
    ///
    /// Fails with [`TokenError::NoRefreshToken`] before any network call when
    /// the session has no token set or no refresh token. On failure the stale
    /// token set stays in place. A call made while a refresh is running joins
    /// it instead of issuing a second request.
    pub async fn refresh(&self) -> Result<TokenSet, OAuth2Error> {
        let round = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.as_ref() {
                Some((id, round)) => {
                    tracing::debug!(round = id, "joining in-flight refresh");
                    round.clone()
                }
                None => {
                    let id = self.rounds.fetch_add(1, Ordering::Relaxed);
                    let round = self.start_round(id);
                    *in_flight = Some((id, round.clone()));
                    round
                }
            }
        };

        round.await
    }

    /// Whether a refresh round is running.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    // The round runs as its own task so it completes even if every caller
    // drops, and it clears the slot itself once done.
    fn start_round(&self, id: u64) -> RefreshRound {
        let client = self.client.clone();
        let in_flight = self.in_flight.clone();

        let handle = tokio::spawn(async move {
            let result = client.run().await;
            let mut slot = in_flight.lock();
            if matches!(slot.as_ref(), Some((current, _)) if *current == id) {
                *slot = None;
            }
            result
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(OAuth2Error::Network(NetworkError::TaskFailed {
                    message: e.to_string(),
                }))
            })
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MockHttpTransport;
    use crate::error::{ErrorKind, ProviderError};
    use crate::token::InMemoryPersistence;
    use crate::types::{ClientCredentials, PersistFailurePolicy, ProviderConfig};
    use std::collections::HashMap;
    use std::time::Duration;
    use url::Url;

    fn config() -> Arc<SessionConfig> {
        Arc::new(SessionConfig {
            provider: ProviderConfig::from_issuer("https://dev.example.com/oauth2/default"),
            credentials: ClientCredentials {
                client_id: "client-1".to_string(),
                ..Default::default()
            },
            redirect_uri: Url::parse("com.example.app:/callback").unwrap(),
            logout_redirect_uri: None,
            default_scopes: vec!["openid".to_string(), "offline_access".to_string()],
            additional_parameters: HashMap::new(),
            timeout: Duration::from_secs(5),
            refresh_threshold_secs: 300,
            persist_failure_policy: PersistFailurePolicy::KeepInMemory,
        })
    }

    fn tokens(access: &str, refresh: Option<&str>) -> TokenSet {
        TokenSet::from_response(&TokenResponse {
            access_token: access.to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            refresh_token: refresh.map(String::from),
            scope: Some("openid offline_access".to_string()),
            id_token: Some("id-1".to_string()),
            extra: HashMap::new(),
        })
        .unwrap()
    }

    async fn setup(
        initial: Option<TokenSet>,
    ) -> (RefreshCoordinator, Arc<MockHttpTransport>, Arc<SessionStore>) {
        let transport = Arc::new(MockHttpTransport::new());
        let store = Arc::new(SessionStore::new(
            Arc::new(InMemoryPersistence::new()),
            PersistFailurePolicy::KeepInMemory,
        ));
        if initial.is_some() {
            store.set(initial).await.unwrap();
        }
        let coordinator = RefreshCoordinator::new(config(), transport.clone(), store.clone());
        (coordinator, transport, store)
    }

    #[tokio::test]
    async fn test_refresh_without_tokens_fails_fast() {
        let (coordinator, transport, _) = setup(None).await;
        let err = coordinator.refresh().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoRefreshToken);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails_fast() {
        let (coordinator, transport, _) = setup(Some(tokens("A1", None))).await;
        let err = coordinator.refresh().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoRefreshToken);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_omitted() {
        let (coordinator, transport, store) = setup(Some(tokens("A1", Some("R1")))).await;
        transport.queue_json_response(
            200,
            serde_json::json!({"access_token": "A2", "token_type": "Bearer", "expires_in": 3600}),
        );

        let next = coordinator.refresh().await.unwrap();
        assert_eq!(next.access_token(), "A2");
        assert_eq!(next.refresh_token(), Some("R1"));
        assert_eq!(next.id_token(), Some("id-1"));
        assert_eq!(store.current().await, Some(next));

        let request = transport.get_last_request().unwrap();
        assert_eq!(request.url, "https://dev.example.com/oauth2/default/v1/token");
        assert_eq!(request.form_value("grant_type").as_deref(), Some("refresh_token"));
        assert_eq!(request.form_value("refresh_token").as_deref(), Some("R1"));
        assert_eq!(request.form_value("client_id").as_deref(), Some("client-1"));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_refresh_failure_leaves_session() {
        let original = tokens("A1", Some("R1"));
        let (coordinator, transport, store) = setup(Some(original.clone())).await;
        transport.queue_json_response(400, serde_json::json!({"error": "invalid_grant"}));

        let err = coordinator.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            OAuth2Error::Provider(ProviderError::InvalidGrant { .. })
        ));
        assert!(err.needs_reauth());
        assert_eq!(store.current().await, Some(original));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_coalesces() {
        let (coordinator, transport, _) = setup(Some(tokens("A1", Some("R1")))).await;
        transport
            .set_delay(Duration::from_millis(50))
            .queue_json_response(
                200,
                serde_json::json!({"access_token": "A2", "refresh_token": "R2"}),
            );

        let (first, second) = tokio::join!(coordinator.refresh(), coordinator.refresh());
        assert_eq!(first.unwrap().access_token(), "A2");
        assert_eq!(second.unwrap().access_token(), "A2");
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_discarded_when_session_replaced() {
        let (coordinator, transport, store) = setup(Some(tokens("A1", Some("R1")))).await;
        transport
            .set_delay(Duration::from_millis(50))
            .queue_json_response(200, serde_json::json!({"access_token": "A2"}));

        let replacement = tokens("B1", Some("S1"));
        let (result, _) = tokio::join!(coordinator.refresh(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.set(Some(replacement.clone())).await.unwrap();
        });

        assert_eq!(result.unwrap_err().kind(), ErrorKind::SessionChanged);
        assert_eq!(store.current().await, Some(replacement));
    }
}
