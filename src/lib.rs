//! OAuth2 Session
//!
//! Client-side OAuth2/OIDC token lifecycle for native applications.
//!
//! # Features
//!
//! - Interactive login through an external user agent with PKCE (RFC 7636)
//! - Resource owner password login (RFC 6749 Section 4.3)
//! - Coalesced token refresh (RFC 6749 Section 6)
//! - Token revocation and provider sign-out (RFC 7009)
//! - Token introspection (RFC 7662) and OIDC userinfo
//! - OIDC browser sign-out (RP-initiated logout)
//! - Pluggable persistence with cold-start hydration
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use oauth2_session::{session_config, AuthSession, FnUserAgentLauncher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = session_config()
//!         .issuer("https://dev-123.okta.com/oauth2/default")
//!         .client_id("0oa1example")
//!         .redirect_uri("com.example.app:/callback")
//!         .scopes(["openid", "profile", "offline_access"])
//!         .build()?;
//!
//!     let launcher = FnUserAgentLauncher::new(|request| {
//!         println!("Open this URL to sign in: {}", request.url);
//!         Ok(())
//!     });
//!
//!     let session = AuthSession::builder(config)
//!         .user_agent(Arc::new(launcher))
//!         .build()?;
//!
//!     // The platform URL handler calls `dispatcher.resume(url)`.
//!     let dispatcher = session.resume_dispatcher();
//!
//!     let tokens = session.login_interactive().await?;
//!     println!("expires at {:?}", tokens.expires_at());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: tokens, configuration, redirect and introspection data
//! - `error`: error hierarchy and provider error mapping
//! - `core`: HTTP transport, PKCE, discovery, user agent launcher
//! - `session`: session store, resume dispatcher, query facade, `AuthSession`
//! - `flows`: interactive and password login, browser sign-out
//! - `token`: persistence, refresh, revocation, introspection
//! - `builders`: configuration builder and TOML loading
//! - `telemetry`: `tracing` subscriber setup

pub mod builders;
pub mod core;
pub mod error;
pub mod flows;
pub mod session;
pub mod telemetry;
pub mod token;
pub mod types;

// Re-export the session surface
pub use session::{AuthSession, AuthSessionBuilder, ResumeDispatcher, SessionQueryFacade, SessionStore};

// Re-export builders
pub use builders::{session_config, SessionConfigBuilder};

// Re-export errors
pub use error::{
    create_error_from_response, get_user_message, map_authorization_error, map_token_error,
    parse_error_response, AuthorizationError, ConfigurationError, ErrorKind, NetworkError,
    OAuth2Error, OAuth2ErrorResponse, OAuth2Result, ProtocolError, ProviderError, StorageError,
    TokenError,
};

// Re-export types
pub use types::{
    // Config
    ClientAuthMethod, ClientCredentials, GrantType, OIDCDiscoveryDocument, PersistFailurePolicy,
    ProviderConfig, SessionConfig,
    // Token
    TokenResponse, TokenSet,
    // Auth
    AuthorizationRequest, FlowKind, PkceMethod, PkceParams,
    // Callback
    CallbackParams,
    // Introspection
    IntrospectionResponse, TokenTypeHint, UserClaims,
};

// Re-export core components
pub use core::{
    // Transport
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockHttpTransport,
    ReqwestHttpTransport,
    // PKCE
    DefaultPkceGenerator, MockPkceGenerator, PkceGenerator,
    // Discovery
    DefaultDiscoveryClient, DiscoveryClient, MockDiscoveryClient,
    // User agent
    FnUserAgentLauncher, MockUserAgentLauncher, UserAgentLauncher,
};

// Re-export flows
pub use flows::{AuthorizationFlowController, FlowState, PendingAuthorizationSession, PendingSlot};

// Re-export token lifecycle
pub use token::{
    FilePersistence, InMemoryPersistence, MockPersistence, PersistenceBackend,
    RefreshCoordinator, RevocationCoordinator, TokenIntrospector,
};

// Re-export telemetry
pub use telemetry::{init_logging, LogFormat, LogLevel, LoggingConfig};
