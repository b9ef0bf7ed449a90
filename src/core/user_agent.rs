//! User Agent
//!
//! The external browser (or system web-auth session) that shows the
//! provider's login and logout pages. The session owns the pending flow; a
//! launcher only has to present the request. The outcome arrives later through
//! [`crate::session::ResumeDispatcher::resume`], or as a cancellation through
//! [`crate::session::AuthSession::cancel_login`].

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{AuthorizationError, OAuth2Error};
use crate::types::AuthorizationRequest;

/// User agent interface (for dependency injection).
#[async_trait]
pub trait UserAgentLauncher: Send + Sync {
    /// Open `request.url` in the user agent.
    async fn present(&self, request: &AuthorizationRequest) -> Result<(), OAuth2Error>;
}

/// Launcher backed by a closure, e.g. one that prints the URL in a CLI shell.
pub struct FnUserAgentLauncher<F> {
    open: F,
}

impl<F> FnUserAgentLauncher<F>
where
    F: Fn(&AuthorizationRequest) -> Result<(), String> + Send + Sync,
{
    pub fn new(open: F) -> Self {
        Self { open }
    }
}

#[async_trait]
impl<F> UserAgentLauncher for FnUserAgentLauncher<F>
where
    F: Fn(&AuthorizationRequest) -> Result<(), String> + Send + Sync,
{
    async fn present(&self, request: &AuthorizationRequest) -> Result<(), OAuth2Error> {
        (self.open)(request)
            .map_err(|message| OAuth2Error::Authorization(AuthorizationError::LaunchFailed { message }))
    }
}

/// Mock user agent for testing.
#[derive(Default)]
pub struct MockUserAgentLauncher {
    presented: Mutex<Vec<AuthorizationRequest>>,
    next_error: Mutex<Option<OAuth2Error>>,
    notify: Notify,
}

impl MockUserAgentLauncher {
    /// Create new mock launcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `present` call.
    pub fn fail_next(&self, error: OAuth2Error) -> &Self {
        *self.next_error.lock() = Some(error);
        self
    }

    /// Requests presented so far.
    pub fn get_presented(&self) -> Vec<AuthorizationRequest> {
        self.presented.lock().clone()
    }

    /// Wait until the `index`-th request (0-based) has been presented.
    pub async fn wait_for_request(&self, index: usize) -> AuthorizationRequest {
        loop {
            if let Some(request) = self.presented.lock().get(index).cloned() {
                return request;
            }
            self.notify.notified().await;
        }
    }
}

#[async_trait]
impl UserAgentLauncher for MockUserAgentLauncher {
    async fn present(&self, request: &AuthorizationRequest) -> Result<(), OAuth2Error> {
        if let Some(error) = self.next_error.lock().take() {
            return Err(error);
        }
        self.presented.lock().push(request.clone());
        self.notify.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FlowKind;
    use url::Url;

    fn request() -> AuthorizationRequest {
        AuthorizationRequest {
            kind: FlowKind::Login,
            url: Url::parse("https://example.com/v1/authorize?state=s1").unwrap(),
            redirect_uri: Url::parse("com.example.app:/callback").unwrap(),
            state: "s1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_launcher_records_and_wakes() {
        let launcher = std::sync::Arc::new(MockUserAgentLauncher::new());
        let waiter = {
            let launcher = launcher.clone();
            tokio::spawn(async move { launcher.wait_for_request(0).await })
        };

        launcher.present(&request()).await.unwrap();
        let seen = waiter.await.unwrap();
        assert_eq!(seen.state, "s1");
        assert_eq!(launcher.get_presented().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_launcher_failure() {
        let launcher = MockUserAgentLauncher::new();
        launcher.fail_next(OAuth2Error::Authorization(AuthorizationError::LaunchFailed {
            message: "no browser".to_string(),
        }));

        assert!(launcher.present(&request()).await.is_err());
        assert!(launcher.get_presented().is_empty());
        assert!(launcher.present(&request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_fn_launcher_maps_error() {
        let launcher = FnUserAgentLauncher::new(|_: &AuthorizationRequest| Err("closed".to_string()));
        let err = launcher.present(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            OAuth2Error::Authorization(AuthorizationError::LaunchFailed { .. })
        ));
    }
}
