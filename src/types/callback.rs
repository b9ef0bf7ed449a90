//! Callback Types
//!
//! Parsing and matching of redirect callbacks delivered by the application.

use url::Url;

use crate::error::OAuth2ErrorResponse;

/// Callback parameters from an authorization redirect.
#[derive(Clone, Debug, Default)]
pub struct CallbackParams {
    /// Authorization code (if success).
    pub code: Option<String>,
    /// State parameter.
    pub state: Option<String>,
    /// Error code (if authorization failed).
    pub error: Option<String>,
    /// Error description.
    pub error_description: Option<String>,
    /// Error URI.
    pub error_uri: Option<String>,
}

impl CallbackParams {
    /// Parse callback parameters from URL.
    ///
    /// Reads the query string, falling back to the fragment for providers
    /// that answer with `response_mode=fragment`.
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();

        let pairs: Vec<(String, String)> = if url.query().is_some() {
            url.query_pairs().into_owned().collect()
        } else {
            url.fragment()
                .map(|f| url::form_urlencoded::parse(f.as_bytes()).into_owned().collect())
                .unwrap_or_default()
        };

        for (key, value) in pairs {
            match key.as_str() {
                "code" => params.code = Some(value),
                "state" => params.state = Some(value),
                "error" => params.error = Some(value),
                "error_description" => params.error_description = Some(value),
                "error_uri" => params.error_uri = Some(value),
                _ => {}
            }
        }

        params
    }

    /// Check if callback contains an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Check if callback is successful.
    pub fn is_success(&self) -> bool {
        self.code.is_some() && self.error.is_none()
    }

    /// Provider error payload, if the redirect carried one.
    pub fn error_response(&self) -> Option<OAuth2ErrorResponse> {
        self.error.as_ref().map(|error| OAuth2ErrorResponse {
            error: error.clone(),
            error_description: self.error_description.clone(),
            error_uri: self.error_uri.clone(),
        })
    }
}

/// Whether `received` is a callback to the `expected` redirect URI.
///
/// Compares scheme, host, port and path; query and fragment carry the result
/// and are ignored.
pub fn redirect_matches(expected: &Url, received: &Url) -> bool {
    expected.scheme() == received.scheme()
        && expected.host_str() == received.host_str()
        && expected.port_or_known_default() == received.port_or_known_default()
        && expected.path().trim_end_matches('/') == received.path().trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_params_from_url() {
        let url = Url::parse("com.example.app:/callback?code=abc123&state=xyz789").unwrap();
        let params = CallbackParams::from_url(&url);

        assert_eq!(params.code, Some("abc123".to_string()));
        assert_eq!(params.state, Some("xyz789".to_string()));
        assert!(params.error.is_none());
        assert!(params.is_success());
    }

    #[test]
    fn test_callback_params_error() {
        let url = Url::parse(
            "com.example.app:/callback?error=access_denied&error_description=User%20denied&state=s",
        )
        .unwrap();
        let params = CallbackParams::from_url(&url);

        assert!(params.code.is_none());
        assert!(params.is_error());
        let response = params.error_response().unwrap();
        assert_eq!(response.error, "access_denied");
        assert_eq!(response.error_description, Some("User denied".to_string()));
    }

    #[test]
    fn test_callback_params_from_fragment() {
        let url = Url::parse("https://app.example.com/cb#code=frag&state=s1").unwrap();
        let params = CallbackParams::from_url(&url);
        assert_eq!(params.code, Some("frag".to_string()));
        assert_eq!(params.state, Some("s1".to_string()));
    }

    #[test]
    fn test_redirect_matches() {
        let expected = Url::parse("com.example.app:/callback").unwrap();

        assert!(redirect_matches(
            &expected,
            &Url::parse("com.example.app:/callback?code=1&state=2").unwrap()
        ));
        assert!(!redirect_matches(
            &expected,
            &Url::parse("com.other.app:/callback?code=1").unwrap()
        ));
        assert!(!redirect_matches(
            &expected,
            &Url::parse("com.example.app:/logout").unwrap()
        ));
    }
}
