//! Session Queries
//!
//! Read-side operations against the current token set.

use std::sync::Arc;

use crate::error::{OAuth2Error, TokenError};
use crate::session::SessionStore;
use crate::token::TokenIntrospector;
use crate::types::{IntrospectionResponse, TokenTypeHint, UserClaims};

/// Authentication checks, introspection and userinfo for the session.
pub struct SessionQueryFacade {
    store: Arc<SessionStore>,
    introspector: TokenIntrospector,
}

impl SessionQueryFacade {
    pub fn new(store: Arc<SessionStore>, introspector: TokenIntrospector) -> Self {
        Self {
            store,
            introspector,
        }
    }

    /// Whether the session holds an access token.
    ///
    /// This is the cold-start resume path: when memory is empty it hydrates the
    /// store from persistence and adopts what it finds.
    pub async fn is_authenticated(&self) -> bool {
        self.store
            .get()
            .await
            .is_some_and(|tokens| tokens.is_authenticated())
    }

    /// Introspect the current access token.
    pub async fn introspect(&self) -> Result<IntrospectionResponse, OAuth2Error> {
        let tokens = self.store.get().await.ok_or(OAuth2Error::Token(TokenError::NoTokens))?;
        self.introspector
            .introspect(tokens.access_token(), Some(TokenTypeHint::AccessToken))
            .await
    }

    /// Fetch identity claims for the current access token.
    pub async fn get_user_info(&self) -> Result<UserClaims, OAuth2Error> {
        let tokens = self.store.get().await.ok_or(OAuth2Error::Token(TokenError::NoTokens))?;
        self.introspector.user_info(tokens.access_token()).await
    }
}
