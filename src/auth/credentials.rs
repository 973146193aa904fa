use std::fmt;
use std::sync::Arc;

use reqwest::RequestBuilder;
use reqwest::cookie::Jar;

/// A secret string that never appears in Debug or Display output.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    /// Wraps a secret.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw secret. Never log it.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true when the secret is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken([REDACTED])")
    }
}

/// Pre-authenticated transport capability handed to the origin client.
///
/// The client does not care where these came from; it only attaches them.
#[derive(Clone, Default)]
pub enum Credentials {
    /// No authentication (public sites, tests).
    #[default]
    Anonymous,
    /// Personal access token sent as `Authorization: Bearer`.
    Bearer(SecretToken),
    /// User name plus API token sent as HTTP basic auth.
    Basic {
        /// Account name or e-mail.
        user: String,
        /// API token.
        token: SecretToken,
    },
    /// Browser session cookies.
    CookieJar(Arc<Jar>),
}

impl Credentials {
    /// Picks bearer or basic auth from a user/token pair.
    ///
    /// An empty user name means the token is a personal access token.
    #[must_use]
    pub fn from_user_token(user: Option<&str>, token: SecretToken) -> Self {
        match user.map(str::trim).filter(|u| !u.is_empty()) {
            Some(user) => Self::Basic {
                user: user.to_string(),
                token,
            },
            None => Self::Bearer(token),
        }
    }

    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Bearer(_) => "bearer",
            Self::Basic { .. } => "basic",
            Self::CookieJar(_) => "cookies",
        }
    }

    /// Returns the cookie jar when these credentials are session cookies.
    #[must_use]
    pub fn cookie_jar(&self) -> Option<Arc<Jar>> {
        match self {
            Self::CookieJar(jar) => Some(Arc::clone(jar)),
            _ => None,
        }
    }

    /// Attaches header-based credentials to a request.
    ///
    /// Cookie jars are installed on the client itself, so they pass through.
    pub(crate) fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Bearer(token) => request.bearer_auth(token.expose()),
            Self::Basic { user, token } => request.basic_auth(user, Some(token.expose())),
            Self::Anonymous | Self::CookieJar(_) => request,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            Self::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .field("token", &"[REDACTED]")
                .finish(),
            Self::CookieJar(_) => f.write_str("CookieJar([REDACTED])"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_user_token_empty_user_is_bearer() {
        let creds = Credentials::from_user_token(Some("  "), SecretToken::new("pat"));
        assert_eq!(creds.kind(), "bearer");
        let creds = Credentials::from_user_token(None, SecretToken::new("pat"));
        assert_eq!(creds.kind(), "bearer");
    }

    #[test]
    fn test_from_user_token_with_user_is_basic() {
        let creds = Credentials::from_user_token(Some("me@example.com"), SecretToken::new("t"));
        assert!(matches!(creds, Credentials::Basic { ref user, .. } if user == "me@example.com"));
    }

    #[test]
    fn test_debug_never_prints_secrets() {
        let bearer = Credentials::Bearer(SecretToken::new("super-secret"));
        let basic = Credentials::Basic {
            user: "me".to_string(),
            token: SecretToken::new("super-secret"),
        };
        assert!(!format!("{bearer:?}").contains("super-secret"));
        let basic_debug = format!("{basic:?}");
        assert!(!basic_debug.contains("super-secret"));
        assert!(basic_debug.contains("me"));
    }

    #[test]
    fn test_secret_token_blank() {
        assert!(SecretToken::new(" \t").is_blank());
        assert!(!SecretToken::new("x").is_blank());
    }
}
