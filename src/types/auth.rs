//! Authorization Types
//!
//! Requests handed to the external user agent and to the token endpoint.

use secrecy::SecretString;
use url::Url;

/// What an external user-agent flow is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowKind {
    /// Authorization-code login.
    Login,
    /// Provider browser-session sign-out.
    EndSession,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::EndSession => "end_session",
        }
    }
}

/// A request presented to the external user agent.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
    /// Flow this request belongs to.
    pub kind: FlowKind,
    /// Fully built URL to open in the browser.
    pub url: Url,
    /// Redirect URI the provider will call back.
    pub redirect_uri: Url,
    /// State parameter for CSRF validation.
    pub state: String,
}

/// PKCE challenge method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PkceMethod {
    /// SHA-256 hash (recommended).
    #[default]
    S256,
    /// Plain text (not recommended).
    Plain,
}

impl PkceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }
}

/// PKCE parameters.
#[derive(Clone)]
pub struct PkceParams {
    /// Code verifier (keep secret).
    pub code_verifier: String,
    /// Code challenge (sent in authorization URL).
    pub code_challenge: String,
    /// Challenge method used.
    pub code_challenge_method: PkceMethod,
}

impl std::fmt::Debug for PkceParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceParams")
            .field("code_verifier", &"[REDACTED]")
            .field("code_challenge", &self.code_challenge)
            .field("code_challenge_method", &self.code_challenge_method)
            .finish()
    }
}

/// Code exchange request.
#[derive(Clone, Debug)]
pub struct CodeExchangeRequest {
    /// Authorization code from the redirect.
    pub code: String,
    /// Redirect URI used in the authorization request.
    pub redirect_uri: String,
    /// PKCE code verifier, when the request carried a challenge.
    pub code_verifier: Option<String>,
}

/// Resource-owner password grant request.
#[derive(Clone, Debug)]
pub struct PasswordGrantRequest {
    /// Resource owner username.
    pub username: String,
    /// Resource owner password.
    pub password: SecretString,
}
