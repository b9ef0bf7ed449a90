//! Authorization Flow Controller
//!
//! Drives interactive authorization-code login, resource-owner password login
//! and browser sign-out. Interactive flows go through the external user agent
//! and wait in the [`PendingSlot`] until their redirect is resumed or they are
//! cancelled.

use secrecy::{ExposeSecret, SecretString};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use url::Url;

use crate::core::{parse_json_response, FormRequest, HttpTransport, PkceGenerator, UserAgentLauncher};
use crate::error::{
    map_authorization_error, AuthorizationError, ConfigurationError, OAuth2Error,
};
use crate::flows::pending::{
    FlowState, PendingAuthorizationSession, PendingGuard, PendingSlot, RedirectOutcome,
};
use crate::session::SessionStore;
use crate::types::{
    AuthorizationRequest, CallbackParams, CodeExchangeRequest, FlowKind, GrantType,
    PasswordGrantRequest, PkceMethod, SessionConfig, TokenResponse, TokenSet,
};

/// Controls the session's authorization flows.
pub struct AuthorizationFlowController {
    config: Arc<SessionConfig>,
    transport: Arc<dyn HttpTransport>,
    launcher: Arc<dyn UserAgentLauncher>,
    pkce: Arc<dyn PkceGenerator>,
    store: Arc<SessionStore>,
    pending: Arc<PendingSlot>,
    flow_ids: AtomicU64,
}

impl AuthorizationFlowController {
    pub fn new(
        config: Arc<SessionConfig>,
        transport: Arc<dyn HttpTransport>,
        launcher: Arc<dyn UserAgentLauncher>,
        pkce: Arc<dyn PkceGenerator>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            config,
            transport,
            launcher,
            pkce,
            store,
            pending: Arc::new(PendingSlot::new()),
            flow_ids: AtomicU64::new(1),
        }
    }

    /// Weak handle to the pending slot, for the resume dispatcher.
    pub fn pending_slot(&self) -> Weak<PendingSlot> {
        Arc::downgrade(&self.pending)
    }

    /// State of the most recent external user-agent flow.
    pub fn state(&self) -> FlowState {
        self.pending.state()
    }

    /// Whether an external user-agent flow awaits its redirect.
    pub fn is_pending(&self) -> bool {
        self.pending.is_pending()
    }

    /// Log in through the external user agent.
    ///
    /// Fails with `FlowAlreadyInProgress` while another flow is pending and
    /// leaves that flow untouched. Dropping the returned future releases the
    /// pending slot.
    pub async fn login_interactive(&self) -> Result<TokenSet, OAuth2Error> {
        let pkce = self.pkce.generate(PkceMethod::S256);
        let state = self.pkce.generate_state();

        let mut url = parse_endpoint(&self.config.provider.authorization_endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.credentials.client_id)
                .append_pair("redirect_uri", self.config.redirect_uri.as_str())
                .append_pair("state", &state)
                .append_pair("code_challenge", &pkce.code_challenge)
                .append_pair("code_challenge_method", pkce.code_challenge_method.as_str());
            if let Some(scope) = self.config.scope_param() {
                query.append_pair("scope", &scope);
            }
            let mut extra: Vec<_> = self.config.additional_parameters.iter().collect();
            extra.sort();
            for (key, value) in extra {
                query.append_pair(key, value);
            }
        }

        let request = AuthorizationRequest {
            kind: FlowKind::Login,
            url,
            redirect_uri: self.config.redirect_uri.clone(),
            state,
        };

        let (guard, params, code_verifier) = self
            .run_external(request, Some(pkce.code_verifier))
            .await?;
        let id = guard.id();

        let result = self.complete_login(params, code_verifier).await;
        match &result {
            Ok(_) => {
                self.pending.finish(id, FlowState::Completed);
                tracing::info!(flow_id = id, "interactive login completed");
            }
            Err(e) => {
                self.pending.finish(id, FlowState::Failed);
                tracing::warn!(flow_id = id, error = %e, "interactive login failed");
            }
        }
        result
    }

    /// Log in with the resource-owner password grant.
    ///
    /// Talks to the token endpoint directly and never enters
    /// [`FlowState::AwaitingRedirect`].
    pub async fn login_with_credentials(
        &self,
        username: &str,
        password: SecretString,
    ) -> Result<TokenSet, OAuth2Error> {
        let grant = PasswordGrantRequest {
            username: username.to_string(),
            password,
        };
        tracing::info!("password login started");

        let request = FormRequest::new(&self.config.provider.token_endpoint)
            .param("grant_type", GrantType::Password.as_str())
            .param("username", grant.username.as_str())
            .param("password", grant.password.expose_secret().as_str())
            .param_opt("scope", self.config.scope_param())
            .timeout(self.config.timeout)
            .build(&self.config.credentials);

        let tokens = self.request_tokens(request).await?;
        tracing::info!("password login completed");
        Ok(tokens)
    }

    /// Cancel the pending flow. Returns `false` when nothing was pending.
    pub fn cancel(&self) -> bool {
        match self.pending.take() {
            Some(session) => {
                tracing::info!(flow = session.kind().as_str(), "pending flow cancelled");
                session.cancel();
                true
            }
            None => false,
        }
    }

    /// End the provider's browser session for `id_token`.
    ///
    /// Uses the same pending-flow machinery as interactive login. Local tokens
    /// are not touched.
    pub async fn sign_out_from_browser(&self, id_token: &str) -> Result<(), OAuth2Error> {
        let endpoint = self
            .config
            .provider
            .end_session_endpoint
            .as_deref()
            .ok_or_else(|| {
                OAuth2Error::Configuration(ConfigurationError::EndpointNotConfigured {
                    endpoint: "end_session_endpoint".to_string(),
                })
            })?;
        let redirect_uri = self.config.logout_redirect_uri.clone().ok_or_else(|| {
            OAuth2Error::Configuration(ConfigurationError::MissingField {
                field: "logout_redirect_uri".to_string(),
            })
        })?;

        let state = self.pkce.generate_state();
        let mut url = parse_endpoint(endpoint)?;
        url.query_pairs_mut()
            .append_pair("id_token_hint", id_token)
            .append_pair("post_logout_redirect_uri", redirect_uri.as_str())
            .append_pair("state", &state);

        let request = AuthorizationRequest {
            kind: FlowKind::EndSession,
            url,
            redirect_uri,
            state,
        };

        let (guard, params, _) = self.run_external(request, None).await?;
        let id = guard.id();

        if let Some(error) = params.error_response() {
            self.pending.finish(id, FlowState::Failed);
            tracing::warn!(flow_id = id, error = %error.error, "browser sign-out failed");
            return Err(OAuth2Error::Authorization(map_authorization_error(&error)));
        }

        self.pending.finish(id, FlowState::Completed);
        tracing::info!(flow_id = id, "browser sign-out completed");
        Ok(())
    }

    /// Install a pending session, present it, and wait for its redirect.
    ///
    /// The returned guard marks the flow cancelled if the caller is dropped
    /// before it records a terminal state.
    async fn run_external(
        &self,
        request: AuthorizationRequest,
        code_verifier: Option<String>,
    ) -> Result<(PendingGuard<'_>, CallbackParams, Option<String>), OAuth2Error> {
        let id = self.flow_ids.fetch_add(1, Ordering::Relaxed);
        let (session, completion) = PendingAuthorizationSession::new(
            id,
            request.kind,
            request.redirect_uri.clone(),
            request.state.clone(),
            code_verifier,
        );

        if let Err(e) = self.pending.install(session) {
            tracing::warn!(flow = request.kind.as_str(), "flow already in progress");
            return Err(e);
        }
        let guard = PendingGuard::new(&self.pending, id);

        tracing::info!(flow_id = id, flow = request.kind.as_str(), "presenting user agent");

        if let Err(e) = self.launcher.present(&request).await {
            self.pending.take_if(id);
            self.pending.finish(id, FlowState::Failed);
            tracing::warn!(flow_id = id, error = %e, "user agent failed to launch");
            return Err(e);
        }

        match completion.await {
            Ok(RedirectOutcome::Redirect {
                params,
                code_verifier,
            }) => {
                tracing::debug!(flow_id = id, "redirect received");
                Ok((guard, params, code_verifier))
            }
            Ok(RedirectOutcome::Cancelled) | Err(_) => {
                self.pending.finish(id, FlowState::Cancelled);
                tracing::info!(flow_id = id, "flow cancelled");
                Err(OAuth2Error::Authorization(AuthorizationError::UserCancelled))
            }
        }
    }

    async fn complete_login(
        &self,
        params: CallbackParams,
        code_verifier: Option<String>,
    ) -> Result<TokenSet, OAuth2Error> {
        if let Some(error) = params.error_response() {
            return Err(OAuth2Error::Authorization(map_authorization_error(&error)));
        }

        let code = params.code.ok_or_else(|| {
            OAuth2Error::Authorization(AuthorizationError::InvalidRedirect {
                message: "redirect carried neither a code nor an error".to_string(),
            })
        })?;

        let exchange = CodeExchangeRequest {
            code,
            redirect_uri: self.config.redirect_uri.to_string(),
            code_verifier,
        };

        let request = FormRequest::new(&self.config.provider.token_endpoint)
            .param("grant_type", GrantType::AuthorizationCode.as_str())
            .param("code", exchange.code)
            .param("redirect_uri", exchange.redirect_uri)
            .param_opt("code_verifier", exchange.code_verifier)
            .timeout(self.config.timeout)
            .build(&self.config.credentials);

        self.request_tokens(request).await
    }

    async fn request_tokens(
        &self,
        request: crate::core::HttpRequest,
    ) -> Result<TokenSet, OAuth2Error> {
        let response = self.transport.send(request).await?;
        let token_response: TokenResponse = parse_json_response(&response)?;
        let tokens = TokenSet::from_response(&token_response)?;
        self.store.set(Some(tokens.clone())).await?;
        Ok(tokens)
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, OAuth2Error> {
    Url::parse(endpoint).map_err(|_| {
        OAuth2Error::Configuration(ConfigurationError::InvalidEndpoint {
            url: endpoint.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MockHttpTransport, MockPkceGenerator, MockUserAgentLauncher};
    use crate::error::ErrorKind;
    use crate::token::MockPersistence;
    use crate::types::{ClientCredentials, PersistFailurePolicy, ProviderConfig};
    use std::collections::HashMap;
    use std::time::Duration;

    struct Fixture {
        controller: Arc<AuthorizationFlowController>,
        transport: Arc<MockHttpTransport>,
        launcher: Arc<MockUserAgentLauncher>,
        store: Arc<SessionStore>,
    }

    fn fixture() -> Fixture {
        let config = Arc::new(SessionConfig {
            provider: ProviderConfig::from_issuer("https://dev.example.com"),
            credentials: ClientCredentials {
                client_id: "client-1".to_string(),
                ..Default::default()
            },
            redirect_uri: Url::parse("com.example.app:/callback").unwrap(),
            logout_redirect_uri: Some(Url::parse("com.example.app:/logout").unwrap()),
            default_scopes: vec!["openid".to_string(), "offline_access".to_string()],
            additional_parameters: [("prompt".to_string(), "login".to_string())]
                .into_iter()
                .collect(),
            timeout: Duration::from_secs(5),
            refresh_threshold_secs: 300,
            persist_failure_policy: PersistFailurePolicy::KeepInMemory,
        });
        let transport = Arc::new(MockHttpTransport::new());
        let launcher = Arc::new(MockUserAgentLauncher::new());
        let store = Arc::new(SessionStore::new(
            Arc::new(MockPersistence::new()),
            PersistFailurePolicy::KeepInMemory,
        ));
        let controller = Arc::new(AuthorizationFlowController::new(
            config,
            transport.clone(),
            launcher.clone(),
            Arc::new(MockPkceGenerator::new()),
            store.clone(),
        ));
        Fixture {
            controller,
            transport,
            launcher,
            store,
        }
    }

    fn deliver(slot: &Weak<PendingSlot>, url: &str) -> bool {
        let url = Url::parse(url).unwrap();
        match slot.upgrade().and_then(|s| s.take_matching(&url)) {
            Some(session) => {
                session.complete(&url);
                true
            }
            None => false,
        }
    }

    #[tokio::test]
    async fn test_interactive_login_success() {
        let f = fixture();
        f.transport.queue_json_response(
            200,
            serde_json::json!({"access_token": "A1", "refresh_token": "R1", "expires_in": 3600}),
        );

        let login = tokio::spawn({
            let controller = f.controller.clone();
            async move { controller.login_interactive().await }
        });

        let request = f.launcher.wait_for_request(0).await;
        assert_eq!(f.controller.state(), FlowState::AwaitingRedirect);
        let query: HashMap<_, _> = request.url.query_pairs().into_owned().collect();
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["client_id"], "client-1");
        assert_eq!(query["scope"], "openid offline_access");
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["prompt"], "login");

        let slot = f.controller.pending_slot();
        assert!(deliver(
            &slot,
            &format!("com.example.app:/callback?code=c1&state={}", request.state)
        ));

        let tokens = login.await.unwrap().unwrap();
        assert_eq!(tokens.access_token(), "A1");
        assert_eq!(f.store.current().await, Some(tokens));
        assert_eq!(f.controller.state(), FlowState::Completed);

        let exchange = f.transport.get_last_request().unwrap();
        assert_eq!(exchange.form_value("grant_type").as_deref(), Some("authorization_code"));
        assert_eq!(exchange.form_value("code").as_deref(), Some("c1"));
        assert!(exchange.form_value("code_verifier").is_some());
    }

    #[tokio::test]
    async fn test_second_login_rejected_while_pending() {
        let f = fixture();
        let first = tokio::spawn({
            let controller = f.controller.clone();
            async move { controller.login_interactive().await }
        });
        f.launcher.wait_for_request(0).await;

        let err = f.controller.login_interactive().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FlowAlreadyInProgress);
        assert!(f.controller.is_pending());
        assert_eq!(f.launcher.get_presented().len(), 1);

        assert!(f.controller.cancel());
        assert_eq!(
            first.await.unwrap().unwrap_err().kind(),
            ErrorKind::UserCancelled
        );
        assert_eq!(f.controller.state(), FlowState::Cancelled);
        assert!(!f.controller.cancel());
    }

    #[tokio::test]
    async fn test_redirect_error_fails_flow() {
        let f = fixture();
        let login = tokio::spawn({
            let controller = f.controller.clone();
            async move { controller.login_interactive().await }
        });
        let request = f.launcher.wait_for_request(0).await;

        deliver(
            &f.controller.pending_slot(),
            &format!("com.example.app:/callback?error=access_denied&state={}", request.state),
        );

        let err = login.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            OAuth2Error::Authorization(AuthorizationError::AccessDenied { .. })
        ));
        assert_eq!(f.controller.state(), FlowState::Failed);
        assert_eq!(f.transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_redirect_without_code_is_invalid() {
        let f = fixture();
        let login = tokio::spawn({
            let controller = f.controller.clone();
            async move { controller.login_interactive().await }
        });
        let request = f.launcher.wait_for_request(0).await;

        deliver(
            &f.controller.pending_slot(),
            &format!("com.example.app:/callback?state={}", request.state),
        );

        let err = login.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRedirect);
        assert_eq!(f.controller.state(), FlowState::Failed);
    }

    #[tokio::test]
    async fn test_launch_failure_frees_slot() {
        let f = fixture();
        f.launcher
            .fail_next(OAuth2Error::Authorization(AuthorizationError::LaunchFailed {
                message: "no browser".to_string(),
            }));

        assert!(f.controller.login_interactive().await.is_err());
        assert!(!f.controller.is_pending());
        assert_eq!(f.controller.state(), FlowState::Failed);
    }

    #[tokio::test]
    async fn test_password_login() {
        let f = fixture();
        f.transport
            .queue_json_response(200, serde_json::json!({"access_token": "A1"}));

        let tokens = f
            .controller
            .login_with_credentials("jane", SecretString::new("hunter2".to_string()))
            .await
            .unwrap();
        assert_eq!(tokens.access_token(), "A1");
        assert_eq!(f.controller.state(), FlowState::Idle);
        assert!(f.launcher.get_presented().is_empty());

        let request = f.transport.get_last_request().unwrap();
        assert_eq!(request.form_value("grant_type").as_deref(), Some("password"));
        assert_eq!(request.form_value("username").as_deref(), Some("jane"));
        assert_eq!(request.form_value("password").as_deref(), Some("hunter2"));
        assert_eq!(request.form_value("scope").as_deref(), Some("openid offline_access"));
    }

    #[tokio::test]
    async fn test_browser_sign_out() {
        let f = fixture();
        let sign_out = tokio::spawn({
            let controller = f.controller.clone();
            async move { controller.sign_out_from_browser("id-1").await }
        });
        let request = f.launcher.wait_for_request(0).await;
        assert_eq!(request.kind, FlowKind::EndSession);
        let query: HashMap<_, _> = request.url.query_pairs().into_owned().collect();
        assert_eq!(query["id_token_hint"], "id-1");
        assert_eq!(query["post_logout_redirect_uri"], "com.example.app:/logout");

        assert!(!deliver(
            &f.controller.pending_slot(),
            &format!("com.example.app:/callback?state={}", request.state)
        ));
        assert!(deliver(
            &f.controller.pending_slot(),
            &format!("com.example.app:/logout?state={}", request.state)
        ));

        sign_out.await.unwrap().unwrap();
        assert_eq!(f.controller.state(), FlowState::Completed);
    }
}
