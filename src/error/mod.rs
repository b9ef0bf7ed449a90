//! Session Error Types
//!
//! Error hierarchy for the session manager. Every public operation resolves to
//! one of these; [`ErrorKind`] collapses them into the categories callers
//! branch on.

use std::time::Duration;
use thiserror::Error;

/// Root error type for session operations.
#[derive(Error, Debug, Clone)]
pub enum OAuth2Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Coarse classification of an [`OAuth2Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operation requires a token set and none is present.
    NoTokens,
    /// Refresh requested but the token set carries no refresh token.
    NoRefreshToken,
    /// An external user-agent flow is already awaiting its redirect.
    FlowAlreadyInProgress,
    /// A refresh is already running. Reserved: refreshes coalesce instead.
    RefreshInProgress,
    /// Network, protocol, or provider failure.
    TransportFailure,
    /// Redirect callback did not carry a usable result.
    InvalidRedirect,
    /// The user or the application cancelled the external user-agent flow.
    UserCancelled,
    /// The session was replaced or cleared while the operation was in flight.
    SessionChanged,
    /// Invalid or incomplete configuration.
    Configuration,
    /// Persistence backend failure.
    Storage,
}

impl OAuth2Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Token(TokenError::NoTokens) | Self::Token(TokenError::NoIdToken) => {
                ErrorKind::NoTokens
            }
            Self::Token(TokenError::NoRefreshToken) => ErrorKind::NoRefreshToken,
            Self::Token(TokenError::RefreshInProgress) => ErrorKind::RefreshInProgress,
            Self::Token(TokenError::SessionChanged) => ErrorKind::SessionChanged,
            Self::Token(_) => ErrorKind::TransportFailure,
            Self::Authorization(AuthorizationError::FlowAlreadyInProgress) => {
                ErrorKind::FlowAlreadyInProgress
            }
            Self::Authorization(AuthorizationError::UserCancelled) => ErrorKind::UserCancelled,
            Self::Authorization(AuthorizationError::InvalidRedirect { .. }) => {
                ErrorKind::InvalidRedirect
            }
            Self::Authorization(_) => ErrorKind::TransportFailure,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Network(_) | Self::Protocol(_) | Self::Provider(_) => {
                ErrorKind::TransportFailure
            }
        }
    }

    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "OAUTH2_CONFIG",
            Self::Authorization(_) => "OAUTH2_AUTH",
            Self::Token(_) => "OAUTH2_TOKEN",
            Self::Network(_) => "OAUTH2_NETWORK",
            Self::Storage(_) => "OAUTH2_STORAGE",
            Self::Protocol(_) => "OAUTH2_PROTOCOL",
            Self::Provider(_) => "OAUTH2_PROVIDER",
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_retryable(),
            Self::Provider(ProviderError::ServerError { .. }) => true,
            Self::Provider(ProviderError::TemporarilyUnavailable { .. }) => true,
            _ => false,
        }
    }

    /// Get retry-after duration if applicable.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Provider(ProviderError::TemporarilyUnavailable { retry_after }) => *retry_after,
            Self::Authorization(AuthorizationError::TemporarilyUnavailable { retry_after }) => {
                *retry_after
            }
            _ => None,
        }
    }

    /// Check if error requires the user to sign in again.
    pub fn needs_reauth(&self) -> bool {
        match self {
            Self::Token(TokenError::NoTokens) => true,
            Self::Token(TokenError::Expired) => true,
            Self::Token(TokenError::NoRefreshToken) => true,
            Self::Provider(ProviderError::InvalidGrant { .. }) => true,
            Self::Authorization(AuthorizationError::AccessDenied { .. }) => true,
            _ => false,
        }
    }
}

/// Configuration error.
#[derive(Error, Debug, Clone)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid endpoint URL: {url}")]
    InvalidEndpoint { url: String },

    #[error("Endpoint not configured: {endpoint}")]
    EndpointNotConfigured { endpoint: String },

    #[error("Discovery failed: {message}")]
    DiscoveryFailed { message: String },
}

/// Authorization flow error.
#[derive(Error, Debug, Clone)]
pub enum AuthorizationError {
    #[error("Access denied by user")]
    AccessDenied {
        error_description: Option<String>,
        error_uri: Option<String>,
    },

    #[error("Invalid scope: {scope}")]
    InvalidScope {
        scope: String,
        error_uri: Option<String>,
    },

    #[error("Unauthorized client")]
    UnauthorizedClient { error_description: Option<String> },

    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
        error_uri: Option<String>,
    },

    #[error("Server error: {message}")]
    ServerError { message: String },

    #[error("Server temporarily unavailable")]
    TemporarilyUnavailable { retry_after: Option<Duration> },

    #[error("An authorization flow is already in progress")]
    FlowAlreadyInProgress,

    #[error("Authorization cancelled")]
    UserCancelled,

    #[error("Invalid redirect: {message}")]
    InvalidRedirect { message: String },

    #[error("Failed to launch user agent: {message}")]
    LaunchFailed { message: String },
}

/// Token-related error.
#[derive(Error, Debug, Clone)]
pub enum TokenError {
    #[error("No tokens available")]
    NoTokens,

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("No ID token available")]
    NoIdToken,

    #[error("Token expired")]
    Expired,

    #[error("A token refresh is already in progress")]
    RefreshInProgress,

    #[error("Token revocation failed: {message}")]
    RevocationFailed { message: String },

    #[error("Session changed while the operation was in flight")]
    SessionChanged,
}

/// Network/transport error.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Background task failed: {message}")]
    TaskFailed { message: String },
}

impl NetworkError {
    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::TaskFailed { .. })
    }
}

/// Protocol/response parsing error.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Unexpected redirect to: {location}")]
    UnexpectedRedirect { location: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },
}

/// Persistence backend error.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("Read failed: {message}")]
    ReadFailed { message: String },

    #[error("Write failed: {message}")]
    WriteFailed { message: String },

    #[error("Delete failed: {message}")]
    DeleteFailed { message: String },

    #[error("Corrupted data: {message}")]
    CorruptedData { message: String },
}

/// Provider (OAuth2 server) error.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Invalid client credentials")]
    InvalidClient { error_description: Option<String> },

    #[error("Invalid grant: {message}")]
    InvalidGrant { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Invalid scope: {scope}")]
    InvalidScope { scope: String },

    #[error("Unauthorized client for this grant type")]
    UnauthorizedClient { error_description: Option<String> },

    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType { grant_type: String },

    #[error("Server error: {message}")]
    ServerError { message: String },

    #[error("Server temporarily unavailable")]
    TemporarilyUnavailable { retry_after: Option<Duration> },

    #[error("Provider error {error}: {}", .error_description.as_deref().unwrap_or("no description"))]
    Other {
        error: String,
        error_description: Option<String>,
    },
}

/// Result type for session operations.
pub type OAuth2Result<T> = Result<T, OAuth2Error>;

/// OAuth2 error response from provider.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuth2ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_uri: Option<String>,
}

/// Map an error carried on an authorization redirect to an error type.
pub fn map_authorization_error(response: &OAuth2ErrorResponse) -> AuthorizationError {
    match response.error.as_str() {
        "access_denied" => AuthorizationError::AccessDenied {
            error_description: response.error_description.clone(),
            error_uri: response.error_uri.clone(),
        },
        "invalid_scope" => AuthorizationError::InvalidScope {
            scope: response.error_description.clone().unwrap_or_default(),
            error_uri: response.error_uri.clone(),
        },
        "unauthorized_client" => AuthorizationError::UnauthorizedClient {
            error_description: response.error_description.clone(),
        },
        "server_error" => AuthorizationError::ServerError {
            message: response
                .error_description
                .clone()
                .unwrap_or_else(|| "Server error".to_string()),
        },
        "temporarily_unavailable" => AuthorizationError::TemporarilyUnavailable { retry_after: None },
        _ => AuthorizationError::InvalidRequest {
            message: response
                .error_description
                .clone()
                .unwrap_or_else(|| response.error.clone()),
            error_uri: response.error_uri.clone(),
        },
    }
}

/// Map token endpoint error response to error type.
pub fn map_token_error(response: &OAuth2ErrorResponse) -> ProviderError {
    match response.error.as_str() {
        "invalid_client" => ProviderError::InvalidClient {
            error_description: response.error_description.clone(),
        },
        "invalid_grant" => ProviderError::InvalidGrant {
            message: response
                .error_description
                .clone()
                .unwrap_or_else(|| "Invalid grant".to_string()),
        },
        "invalid_request" => ProviderError::InvalidRequest {
            message: response
                .error_description
                .clone()
                .unwrap_or_else(|| "Invalid request".to_string()),
        },
        "invalid_scope" => ProviderError::InvalidScope {
            scope: response.error_description.clone().unwrap_or_default(),
        },
        "unauthorized_client" => ProviderError::UnauthorizedClient {
            error_description: response.error_description.clone(),
        },
        "unsupported_grant_type" => ProviderError::UnsupportedGrantType {
            grant_type: response.error_description.clone().unwrap_or_default(),
        },
        "server_error" => ProviderError::ServerError {
            message: response
                .error_description
                .clone()
                .unwrap_or_else(|| "Server error".to_string()),
        },
        "temporarily_unavailable" => ProviderError::TemporarilyUnavailable { retry_after: None },
        _ => ProviderError::Other {
            error: response.error.clone(),
            error_description: response.error_description.clone(),
        },
    }
}

/// Parse error response from HTTP body.
pub fn parse_error_response(body: &str) -> Option<OAuth2ErrorResponse> {
    serde_json::from_str(body).ok()
}

/// Create error from a non-success HTTP response.
pub fn create_error_from_response(status: u16, body: &str) -> OAuth2Error {
    if let Some(response) = parse_error_response(body) {
        return OAuth2Error::Provider(map_token_error(&response));
    }

    let error = match status {
        400 => ProviderError::InvalidRequest {
            message: "Bad request".to_string(),
        },
        401 => ProviderError::InvalidClient {
            error_description: Some("Unauthorized".to_string()),
        },
        403 => ProviderError::UnauthorizedClient {
            error_description: Some("Forbidden".to_string()),
        },
        429 => ProviderError::TemporarilyUnavailable {
            retry_after: Some(Duration::from_secs(60)),
        },
        _ => ProviderError::ServerError {
            message: format!("HTTP {}", status),
        },
    };

    OAuth2Error::Provider(error)
}

/// Get user-friendly error message.
pub fn get_user_message(error: &OAuth2Error) -> String {
    match error {
        OAuth2Error::Token(TokenError::NoTokens) => "You are not signed in.".to_string(),
        OAuth2Error::Token(TokenError::Expired) => {
            "Your session has expired. Please sign in again.".to_string()
        }
        OAuth2Error::Token(TokenError::NoRefreshToken) => {
            "Your session cannot be renewed. Please sign in again.".to_string()
        }
        OAuth2Error::Authorization(AuthorizationError::FlowAlreadyInProgress) => {
            "A sign-in is already in progress.".to_string()
        }
        OAuth2Error::Authorization(AuthorizationError::UserCancelled) => {
            "Sign-in was cancelled.".to_string()
        }
        OAuth2Error::Authorization(AuthorizationError::AccessDenied { .. }) => {
            "Access was denied. Please try signing in again and grant the requested permissions."
                .to_string()
        }
        OAuth2Error::Network(NetworkError::Timeout { .. }) => {
            "The request timed out. Please check your connection and try again.".to_string()
        }
        OAuth2Error::Provider(ProviderError::ServerError { .. })
        | OAuth2Error::Provider(ProviderError::TemporarilyUnavailable { .. }) => {
            "The authentication service is temporarily unavailable. Please try again later."
                .to_string()
        }
        _ => "An authentication error occurred. Please try again.".to_string(),
    }
}
