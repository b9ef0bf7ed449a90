//! Token Revocation
//!
//! RFC 7009 revocation and the conservative provider sign-out built on it.

use std::sync::Arc;

use crate::core::{FormRequest, HttpTransport};
use crate::error::{create_error_from_response, ConfigurationError, OAuth2Error, TokenError};
use crate::session::SessionStore;
use crate::types::{SessionConfig, TokenTypeHint};

/// Revokes tokens and signs the session out of the provider.
pub struct RevocationCoordinator {
    config: Arc<SessionConfig>,
    transport: Arc<dyn HttpTransport>,
    store: Arc<SessionStore>,
}

impl RevocationCoordinator {
    pub fn new(
        config: Arc<SessionConfig>,
        transport: Arc<dyn HttpTransport>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            config,
            transport,
            store,
        }
    }

    /// Revoke a single token.
    ///
    /// Resolves `Ok(true)` when the provider answers 200 with an empty body and
    /// `Ok(false)` when it answers 200 with content. Any other status is a
    /// provider error.
    pub async fn revoke_token(
        &self,
        token: &str,
        hint: Option<TokenTypeHint>,
    ) -> Result<bool, OAuth2Error> {
        let endpoint = self.config.provider.revocation_endpoint.as_ref().ok_or_else(|| {
            OAuth2Error::Configuration(ConfigurationError::EndpointNotConfigured {
                endpoint: "revocation_endpoint".to_string(),
            })
        })?;

        let request = FormRequest::new(endpoint)
            .param("token", token)
            .param_opt("token_type_hint", hint.map(|h| h.as_str()))
            .timeout(self.config.timeout)
            .build(&self.config.credentials);

        let response = self.transport.send(request).await?;

        if response.status != 200 {
            return Err(create_error_from_response(response.status, &response.body));
        }

        let revoked = response.body.trim().is_empty();
        tracing::debug!(hint = hint.map(|h| h.as_str()), revoked, "revocation answered");
        Ok(revoked)
    }

    /// Sign the session out of the provider.
    ///
    /// Revokes the access token, then the refresh token if there is one, then
    /// clears the local token set. Any failure stops the sequence and leaves
    /// the local token set exactly as it was.
    pub async fn sign_out_from_provider(&self) -> Result<(), OAuth2Error> {
        let current = self
            .store
            .get()
            .await
            .ok_or(OAuth2Error::Token(TokenError::NoTokens))?;

        tracing::info!("signing out from provider");

        self.revoke_step(current.access_token(), TokenTypeHint::AccessToken)
            .await?;

        if let Some(refresh_token) = current.refresh_token() {
            self.revoke_step(refresh_token, TokenTypeHint::RefreshToken)
                .await?;
        }

        if !self.store.compare_and_set(Some(&current), None).await? {
            tracing::warn!("session changed during sign-out, local tokens kept");
            return Err(OAuth2Error::Token(TokenError::SessionChanged));
        }

        tracing::info!("signed out from provider");
        Ok(())
    }

    async fn revoke_step(&self, token: &str, hint: TokenTypeHint) -> Result<(), OAuth2Error> {
        match self.revoke_token(token, Some(hint)).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(hint = hint.as_str(), "revocation not confirmed, aborting sign-out");
                Err(OAuth2Error::Token(TokenError::RevocationFailed {
                    message: format!("provider did not confirm {} revocation", hint.as_str()),
                }))
            }
            Err(e) => {
                tracing::warn!(hint = hint.as_str(), error = %e, "revocation failed, aborting sign-out");
                Err(e)
            }
        }
    }
}
