//! Auth Session
//!
//! The session context an application constructs once and shares. It wires
//! the store, flow controller, coordinators and query facade to one set of
//! collaborators.

use secrecy::SecretString;
use std::sync::Arc;

use crate::core::{
    DefaultPkceGenerator, HttpTransport, PkceGenerator, ReqwestHttpTransport, UserAgentLauncher,
    DEFAULT_MAX_RESPONSE_SIZE,
};
use crate::error::{ConfigurationError, OAuth2Error, TokenError};
use crate::flows::{AuthorizationFlowController, FlowState};
use crate::session::{ResumeDispatcher, SessionQueryFacade, SessionStore};
use crate::token::{
    InMemoryPersistence, PersistenceBackend, RefreshCoordinator, RevocationCoordinator,
    TokenIntrospector,
};
use crate::types::{IntrospectionResponse, SessionConfig, TokenSet, TokenTypeHint, UserClaims};

/// One authenticated session.
///
/// # Example
///
/// ```rust,ignore
/// use oauth2_session::{session_config, AuthSession, FilePersistence};
///
/// let config = session_config()
///     .issuer("https://dev-123.okta.com/oauth2/default")
///     .client_id("0oa1example")
///     .redirect_uri("com.example.app:/callback")
///     .scopes(vec!["openid", "profile", "offline_access"])
///     .build()?;
///
/// let session = AuthSession::builder(config)
///     .user_agent(launcher)
///     .persistence(Arc::new(FilePersistence::new(&data_dir)))
///     .build()?;
///
/// // Hand `session.resume_dispatcher()` to the URL-scheme handler, then:
/// let tokens = session.login_interactive().await?;
/// ```
pub struct AuthSession {
    config: Arc<SessionConfig>,
    store: Arc<SessionStore>,
    flows: AuthorizationFlowController,
    refresher: RefreshCoordinator,
    revoker: RevocationCoordinator,
    queries: SessionQueryFacade,
    dispatcher: ResumeDispatcher,
}

impl AuthSession {
    /// Start building a session over `config`.
    pub fn builder(config: SessionConfig) -> AuthSessionBuilder {
        AuthSessionBuilder::new(config)
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Log in through the external user agent.
    pub async fn login_interactive(&self) -> Result<TokenSet, OAuth2Error> {
        self.flows.login_interactive().await
    }

    /// Log in with username and password.
    pub async fn login_with_credentials(
        &self,
        username: &str,
        password: SecretString,
    ) -> Result<TokenSet, OAuth2Error> {
        self.flows.login_with_credentials(username, password).await
    }

    /// Cancel the pending interactive flow, if any.
    pub fn cancel_login(&self) -> bool {
        self.flows.cancel()
    }

    /// Deliver a redirect URL to the pending flow.
    pub fn resume(&self, url: &str) -> bool {
        self.dispatcher.resume(url)
    }

    /// Dispatcher for URL handlers that outlive a borrow of the session.
    pub fn resume_dispatcher(&self) -> ResumeDispatcher {
        self.dispatcher.clone()
    }

    /// State of the most recent external user-agent flow.
    pub fn flow_state(&self) -> FlowState {
        self.flows.state()
    }

    /// Refresh the token set.
    pub async fn refresh(&self) -> Result<TokenSet, OAuth2Error> {
        self.refresher.refresh().await
    }

    /// Access token that is good for at least the refresh threshold.
    ///
    /// Refreshes first when the token is about to expire and a refresh token
    /// is available.
    pub async fn valid_access_token(&self) -> Result<String, OAuth2Error> {
        let tokens = self
            .store
            .get()
            .await
            .ok_or(OAuth2Error::Token(TokenError::NoTokens))?;

        let threshold = i64::try_from(self.config.refresh_threshold_secs).unwrap_or(i64::MAX);
        if tokens.has_refresh_token() && tokens.is_expiring_soon(threshold) {
            tracing::debug!("access token near expiry, refreshing");
            let refreshed = self.refresher.refresh().await?;
            return Ok(refreshed.access_token().to_string());
        }

        if tokens.is_expired() {
            return Err(OAuth2Error::Token(TokenError::Expired));
        }

        Ok(tokens.access_token().to_string())
    }

    /// Introspect the current access token.
    pub async fn introspect(&self) -> Result<IntrospectionResponse, OAuth2Error> {
        self.queries.introspect().await
    }

    /// Fetch identity claims for the current user.
    pub async fn get_user_info(&self) -> Result<UserClaims, OAuth2Error> {
        self.queries.get_user_info().await
    }

    /// Revoke an arbitrary token. See [`RevocationCoordinator::revoke_token`].
    pub async fn revoke_token(
        &self,
        token: &str,
        hint: Option<TokenTypeHint>,
    ) -> Result<bool, OAuth2Error> {
        self.revoker.revoke_token(token, hint).await
    }

    /// Revoke both tokens at the provider, then clear the local session.
    pub async fn sign_out_from_provider(&self) -> Result<(), OAuth2Error> {
        self.revoker.sign_out_from_provider().await
    }

    /// End the provider's browser session using the current ID token.
    pub async fn sign_out_from_browser(&self) -> Result<(), OAuth2Error> {
        let tokens = self
            .store
            .get()
            .await
            .ok_or(OAuth2Error::Token(TokenError::NoTokens))?;
        let id_token = tokens
            .id_token()
            .ok_or(OAuth2Error::Token(TokenError::NoIdToken))?;
        self.flows.sign_out_from_browser(id_token).await
    }

    /// Whether the session is authenticated. Hydrates from persistence on
    /// first use.
    pub async fn is_authenticated(&self) -> bool {
        self.queries.is_authenticated().await
    }

    /// Current token set.
    pub async fn tokens(&self) -> Option<TokenSet> {
        self.store.get().await
    }

    /// Drop the local token set and erase it from persistence.
    pub async fn clear(&self) -> Result<(), OAuth2Error> {
        tracing::info!("clearing session");
        self.store.set(None).await
    }
}

/// Builder for [`AuthSession`].
///
/// Only the user agent is required; transport defaults to reqwest,
/// persistence to memory, PKCE to S256 with a 64 character verifier.
pub struct AuthSessionBuilder {
    config: SessionConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    persistence: Option<Arc<dyn PersistenceBackend>>,
    launcher: Option<Arc<dyn UserAgentLauncher>>,
    pkce: Option<Arc<dyn PkceGenerator>>,
}

impl AuthSessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            transport: None,
            persistence: None,
            launcher: None,
            pkce: None,
        }
    }

    /// Set HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set persistence backend.
    pub fn persistence(mut self, persistence: Arc<dyn PersistenceBackend>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the external user agent.
    pub fn user_agent(mut self, launcher: Arc<dyn UserAgentLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Set PKCE and state generator.
    pub fn pkce_generator(mut self, pkce: Arc<dyn PkceGenerator>) -> Self {
        self.pkce = Some(pkce);
        self
    }

    /// Build the session.
    pub fn build(self) -> Result<AuthSession, OAuth2Error> {
        let launcher = self.launcher.ok_or_else(|| {
            OAuth2Error::Configuration(ConfigurationError::MissingField {
                field: "user_agent".to_string(),
            })
        })?;
        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestHttpTransport::with_options(
                self.config.timeout,
                DEFAULT_MAX_RESPONSE_SIZE,
            )?),
        };
        let persistence = self
            .persistence
            .unwrap_or_else(|| Arc::new(InMemoryPersistence::new()));
        let pkce = self
            .pkce
            .unwrap_or_else(|| Arc::new(DefaultPkceGenerator::new()));

        let config = Arc::new(self.config);
        let store = Arc::new(SessionStore::new(persistence, config.persist_failure_policy));

        let flows = AuthorizationFlowController::new(
            config.clone(),
            transport.clone(),
            launcher,
            pkce,
            store.clone(),
        );
        let dispatcher = ResumeDispatcher::new(flows.pending_slot());
        let refresher = RefreshCoordinator::new(config.clone(), transport.clone(), store.clone());
        let revoker = RevocationCoordinator::new(config.clone(), transport.clone(), store.clone());
        let queries = SessionQueryFacade::new(
            store.clone(),
            TokenIntrospector::new(config.clone(), transport),
        );

        tracing::debug!(client_id = %config.credentials.client_id, "session constructed");

        Ok(AuthSession {
            config,
            store,
            flows,
            refresher,
            revoker,
            queries,
            dispatcher,
        })
    }
}
