//! Resume Dispatcher
//!
//! Routes redirect URLs delivered by the application (URL-scheme or
//! universal-link handlers) back into the pending flow.

use std::sync::Weak;
use url::Url;

use crate::flows::PendingSlot;

/// Bridge from external redirect events to the pending flow.
///
/// Cheap to clone; holds only a weak reference to the flow controller's slot,
/// so it never keeps a finished session alive.
#[derive(Clone)]
pub struct ResumeDispatcher {
    slot: Weak<PendingSlot>,
}

impl ResumeDispatcher {
    pub fn new(slot: Weak<PendingSlot>) -> Self {
        Self { slot }
    }

    /// Deliver a redirect URL.
    ///
    /// Returns `true` if a pending flow accepted it. Returns `false`, without
    /// side effects, when nothing is pending, the URL does not parse, or it
    /// belongs to a different redirect URI or `state`. A duplicate delivery of
    /// an accepted URL returns `false`.
    pub fn resume(&self, url: &str) -> bool {
        let Ok(url) = Url::parse(url) else {
            tracing::debug!("ignoring unparsable redirect");
            return false;
        };
        let Some(slot) = self.slot.upgrade() else {
            return false;
        };

        match slot.take_matching(&url) {
            Some(session) => {
                tracing::debug!(flow = session.kind().as_str(), "redirect accepted");
                session.complete(&url);
                true
            }
            None => {
                tracing::debug!("redirect not claimed by a pending flow");
                false
            }
        }
    }
}

impl std::fmt::Debug for ResumeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeDispatcher")
            .field("attached", &(self.slot.strong_count() > 0))
            .finish()
    }
}
