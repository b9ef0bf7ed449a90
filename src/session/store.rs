//! Session Store
//!
//! The single source of truth for the current token set. Memory is read first;
//! persistence is only consulted on the cold-start path and written on every
//! mutation.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::OAuth2Error;
use crate::token::PersistenceBackend;
use crate::types::{PersistFailurePolicy, TokenSet};

struct StoreState {
    tokens: Option<TokenSet>,
    // Set once memory is authoritative: after a successful load or any write.
    hydrated: bool,
}

/// Holds the session's token set and mirrors it to a persistence backend.
///
/// Every mutation runs under one async lock that is held across the persist
/// call, so two writers never interleave their backend operations.
pub struct SessionStore {
    state: Mutex<StoreState>,
    backend: Arc<dyn PersistenceBackend>,
    policy: PersistFailurePolicy,
}

impl SessionStore {
    /// Create a store over `backend`.
    pub fn new(backend: Arc<dyn PersistenceBackend>, policy: PersistFailurePolicy) -> Self {
        Self {
            state: Mutex::new(StoreState {
                tokens: None,
                hydrated: false,
            }),
            backend,
            policy,
        }
    }

    /// Current token set, hydrating from persistence on first use.
    ///
    /// A backend read failure or an unparsable persisted value yields `None`;
    /// the next call tries again.
    pub async fn get(&self) -> Option<TokenSet> {
        let mut state = self.state.lock().await;
        if state.tokens.is_some() || state.hydrated {
            return state.tokens.clone();
        }

        match self.backend.load().await {
            Ok(loaded) => {
                if loaded.is_some() {
                    tracing::info!("restored persisted session");
                }
                state.tokens = loaded;
                state.hydrated = true;
                state.tokens.clone()
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to restore persisted session");
                None
            }
        }
    }

    /// In-memory token set, without touching persistence.
    pub async fn current(&self) -> Option<TokenSet> {
        self.state.lock().await.tokens.clone()
    }

    /// Replace the token set (`None` clears it) and persist the change.
    ///
    /// Memory is updated first. When the backend write fails the error is
    /// returned and memory follows the configured [`PersistFailurePolicy`].
    pub async fn set(&self, next: Option<TokenSet>) -> Result<(), OAuth2Error> {
        let mut state = self.state.lock().await;
        self.apply(&mut state, next).await
    }

    /// Replace the token set only if memory still holds `expected`.
    ///
    /// Returns `Ok(false)` without side effects when the session changed.
    pub async fn compare_and_set(
        &self,
        expected: Option<&TokenSet>,
        next: Option<TokenSet>,
    ) -> Result<bool, OAuth2Error> {
        let mut state = self.state.lock().await;
        if state.tokens.as_ref() != expected {
            tracing::debug!("session changed underneath pending update");
            return Ok(false);
        }
        self.apply(&mut state, next).await?;
        Ok(true)
    }

    async fn apply(&self, state: &mut StoreState, next: Option<TokenSet>) -> Result<(), OAuth2Error> {
        let previous = std::mem::replace(&mut state.tokens, next);
        state.hydrated = true;

        let persisted = match &state.tokens {
            Some(tokens) => self.backend.store(tokens).await,
            None => self.backend.clear().await,
        };

        match persisted {
            Ok(()) => {
                if state.tokens.is_some() {
                    tracing::info!("session tokens adopted");
                } else {
                    tracing::info!("session tokens cleared");
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, policy = ?self.policy, "failed to persist session change");
                if self.policy == PersistFailurePolicy::Rollback {
                    state.tokens = previous;
                }
                Err(e)
            }
        }
    }
}
