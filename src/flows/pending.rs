//! Pending Authorization
//!
//! The one external user-agent flow allowed to be waiting for its redirect,
//! and the slot that holds it.

use parking_lot::Mutex;
use tokio::sync::oneshot;
use url::Url;

use crate::error::{AuthorizationError, OAuth2Error};
use crate::types::{redirect_matches, CallbackParams, FlowKind};

/// Lifecycle of the external user-agent flow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlowState {
    /// No flow has run yet.
    #[default]
    Idle,
    /// The user agent was presented and a redirect is awaited.
    AwaitingRedirect,
    /// The last flow finished successfully.
    Completed,
    /// The last flow was cancelled by the user, the app, or a dropped caller.
    Cancelled,
    /// The last flow failed.
    Failed,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingRedirect => "awaiting_redirect",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

/// What ends a pending flow.
#[derive(Debug)]
pub(crate) enum RedirectOutcome {
    Redirect {
        params: CallbackParams,
        code_verifier: Option<String>,
    },
    Cancelled,
}

/// An in-flight external user-agent flow.
pub struct PendingAuthorizationSession {
    id: u64,
    kind: FlowKind,
    redirect_uri: Url,
    state: String,
    code_verifier: Option<String>,
    completion: oneshot::Sender<RedirectOutcome>,
}

impl PendingAuthorizationSession {
    pub(crate) fn new(
        id: u64,
        kind: FlowKind,
        redirect_uri: Url,
        state: String,
        code_verifier: Option<String>,
    ) -> (Self, oneshot::Receiver<RedirectOutcome>) {
        let (completion, receiver) = oneshot::channel();
        let session = Self {
            id,
            kind,
            redirect_uri,
            state,
            code_verifier,
            completion,
        };
        (session, receiver)
    }

    /// Flow kind.
    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    /// Whether `url` is this flow's redirect: same redirect URI and same `state`.
    pub fn accepts(&self, url: &Url) -> bool {
        redirect_matches(&self.redirect_uri, url)
            && CallbackParams::from_url(url).state.as_deref() == Some(self.state.as_str())
    }

    pub(crate) fn complete(self, url: &Url) {
        let outcome = RedirectOutcome::Redirect {
            params: CallbackParams::from_url(url),
            code_verifier: self.code_verifier,
        };
        // The receiver is gone only if the login future was dropped.
        let _ = self.completion.send(outcome);
    }

    pub(crate) fn cancel(self) {
        let _ = self.completion.send(RedirectOutcome::Cancelled);
    }
}

impl std::fmt::Debug for PendingAuthorizationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuthorizationSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("redirect_uri", &self.redirect_uri.as_str())
            .finish_non_exhaustive()
    }
}

struct SlotState {
    pending: Option<PendingAuthorizationSession>,
    flow_id: u64,
    flow_state: FlowState,
}

/// Holds at most one [`PendingAuthorizationSession`].
///
/// Owned by the flow controller; the resume dispatcher only keeps a weak
/// reference. The lock is never held across an await point.
pub struct PendingSlot {
    inner: Mutex<SlotState>,
}

impl Default for PendingSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SlotState {
                pending: None,
                flow_id: 0,
                flow_state: FlowState::Idle,
            }),
        }
    }

    /// Install a new pending session, refusing if one already waits.
    pub(crate) fn install(&self, session: PendingAuthorizationSession) -> Result<(), OAuth2Error> {
        let mut inner = self.inner.lock();
        if inner.pending.is_some() {
            return Err(OAuth2Error::Authorization(
                AuthorizationError::FlowAlreadyInProgress,
            ));
        }
        inner.flow_id = session.id;
        inner.flow_state = FlowState::AwaitingRedirect;
        inner.pending = Some(session);
        Ok(())
    }

    /// Remove the pending session if it accepts `url`.
    pub fn take_matching(&self, url: &Url) -> Option<PendingAuthorizationSession> {
        let mut inner = self.inner.lock();
        if inner.pending.as_ref().is_some_and(|s| s.accepts(url)) {
            inner.pending.take()
        } else {
            None
        }
    }

    /// Remove whatever is pending.
    pub(crate) fn take(&self) -> Option<PendingAuthorizationSession> {
        self.inner.lock().pending.take()
    }

    /// Remove the pending session only if it belongs to flow `id`.
    pub(crate) fn take_if(&self, id: u64) -> Option<PendingAuthorizationSession> {
        let mut inner = self.inner.lock();
        if inner.pending.as_ref().is_some_and(|s| s.id == id) {
            inner.pending.take()
        } else {
            None
        }
    }

    /// Record the terminal state of flow `id`, unless a newer flow started.
    pub(crate) fn finish(&self, id: u64, state: FlowState) {
        let mut inner = self.inner.lock();
        if inner.flow_id == id {
            inner.flow_state = state;
        }
    }

    /// Mark flow `id` cancelled if it never reached a terminal state.
    fn abandon(&self, id: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.flow_id == id && inner.flow_state == FlowState::AwaitingRedirect {
            inner.flow_state = FlowState::Cancelled;
            true
        } else {
            false
        }
    }

    /// Whether a flow is waiting for its redirect.
    pub fn is_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    /// State of the most recent flow.
    pub fn state(&self) -> FlowState {
        self.inner.lock().flow_state
    }
}

/// Releases flow `id` if the owning future is dropped mid-flight.
///
/// Held until the flow records its outcome, so a drop during the code
/// exchange still leaves the flow `Cancelled` rather than awaiting.
pub(crate) struct PendingGuard<'a> {
    slot: &'a PendingSlot,
    id: u64,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(slot: &'a PendingSlot, id: u64) -> Self {
        Self { slot, id }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let released = self.slot.take_if(self.id).is_some();
        if self.slot.abandon(self.id) || released {
            tracing::debug!(flow_id = self.id, "flow released by dropped caller");
        }
    }
}
