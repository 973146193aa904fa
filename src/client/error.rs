//! Error types for origin API requests.
//!
//! Every failure surfaced by [`ApiClient`](super::ApiClient) is a
//! [`RequestError`]. Variants carry the URL that failed plus whatever the
//! retry layer needs to decide what to do next (status code, Retry-After hint).

use thiserror::Error;

use super::retry::FailureType;

/// Errors that can occur while talking to the origin service.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// Connection-level failure, timeout, or 5xx response.
    #[error("transient failure requesting {url}: {reason}")]
    Transient {
        /// The URL that failed.
        url: String,
        /// HTTP status when the failure was a server response.
        status: Option<u16>,
        /// Human-readable cause.
        reason: String,
    },

    /// The origin is throttling us (HTTP 429).
    #[error("throttled requesting {url} (HTTP 429)")]
    Throttled {
        /// The URL that was throttled.
        url: String,
        /// Raw Retry-After header value, if the server sent one.
        retry_after: Option<String>,
    },

    /// The resource does not exist (HTTP 404 / 410).
    #[error("not found: {url} (HTTP {status})")]
    NotFound {
        /// The URL that was not found.
        url: String,
        /// 404 or 410.
        status: u16,
    },

    /// The session or credential is no longer accepted.
    ///
    /// Raised for HTTP 401 and for responses that land on a login page.
    /// Nothing recovers from this, so the exporter aborts the whole run.
    #[error("authentication expired requesting {url}: {reason}")]
    AuthExpired {
        /// The URL that was rejected.
        url: String,
        /// What gave it away (status code or login redirect).
        reason: String,
    },

    /// The credential is valid but may not read this resource (HTTP 403).
    #[error("access forbidden: {url} (HTTP 403)")]
    Forbidden {
        /// The URL that was refused.
        url: String,
    },

    /// Any other non-retryable client error (malformed request and friends).
    #[error("request rejected: {url} (HTTP {status})")]
    Rejected {
        /// The URL that was rejected.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response body could not be decoded as the expected document.
    #[error("unexpected response body from {url}: {reason}")]
    Decode {
        /// The URL whose body was malformed.
        url: String,
        /// Decoder message.
        reason: String,
    },

    /// The URL could not be built or parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The offending input.
        url: String,
    },

    /// The run was cancelled while the request waited to retry.
    #[error("cancelled while requesting {url}")]
    Cancelled {
        /// The URL being requested.
        url: String,
    },
}

impl RequestError {
    /// Creates a transient error from a reqwest transport failure.
    pub fn transport(url: impl Into<String>, source: &reqwest::Error) -> Self {
        let reason = if source.is_timeout() {
            "timed out".to_string()
        } else if source.is_connect() {
            format!("connection failed: {source}")
        } else {
            source.to_string()
        };
        Self::Transient {
            url: url.into(),
            status: None,
            reason,
        }
    }

    /// Maps a non-success HTTP status to the matching variant.
    pub fn from_status(url: impl Into<String>, status: u16, retry_after: Option<String>) -> Self {
        let url = url.into();
        match status {
            401 => Self::AuthExpired {
                url,
                reason: "HTTP 401".to_string(),
            },
            403 => Self::Forbidden { url },
            404 | 410 => Self::NotFound { url, status },
            408 => Self::Transient {
                url,
                status: Some(status),
                reason: "request timeout".to_string(),
            },
            429 => Self::Throttled { url, retry_after },
            500..=599 => Self::Transient {
                url,
                status: Some(status),
                reason: format!("server error HTTP {status}"),
            },
            _ => Self::Rejected { url, status },
        }
    }

    /// Creates an authentication-expired error.
    pub fn auth_expired(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AuthExpired {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns the URL the error refers to.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Transient { url, .. }
            | Self::Throttled { url, .. }
            | Self::NotFound { url, .. }
            | Self::AuthExpired { url, .. }
            | Self::Forbidden { url }
            | Self::Rejected { url, .. }
            | Self::Decode { url, .. }
            | Self::InvalidUrl { url }
            | Self::Cancelled { url } => url,
        }
    }

    /// Returns true when this error means the whole run cannot continue.
    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired { .. })
    }

    /// Returns true for a 404/410 answer.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Classifies the error for retry decisions.
    ///
    /// | Variant      | Type        |
    /// |--------------|-------------|
    /// | Transient    | Transient   |
    /// | Throttled    | RateLimited |
    /// | AuthExpired  | NeedsAuth   |
    /// | Forbidden    | NeedsAuth   |
    /// | everything else | Permanent |
    #[must_use]
    pub fn classify(&self) -> FailureType {
        match self {
            Self::Transient { .. } => FailureType::Transient,
            Self::Throttled { .. } => FailureType::RateLimited,
            Self::AuthExpired { .. } | Self::Forbidden { .. } => FailureType::NeedsAuth,
            Self::NotFound { .. }
            | Self::Rejected { .. }
            | Self::Decode { .. }
            | Self::InvalidUrl { .. }
            | Self::Cancelled { .. } => FailureType::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_401_is_auth_expired() {
        let error = RequestError::from_status("https://site/x", 401, None);
        assert!(error.is_auth_expired());
        assert_eq!(error.classify(), FailureType::NeedsAuth);
    }

    #[test]
    fn test_from_status_403_is_scoped_forbidden() {
        let error = RequestError::from_status("https://site/x", 403, None);
        assert!(matches!(error, RequestError::Forbidden { .. }));
        assert!(!error.is_auth_expired());
    }

    #[test]
    fn test_from_status_404_and_410_not_found() {
        for status in [404, 410] {
            let error = RequestError::from_status("https://site/x", status, None);
            assert!(error.is_not_found());
            assert_eq!(error.classify(), FailureType::Permanent);
        }
    }

    #[test]
    fn test_from_status_429_keeps_retry_after() {
        let error = RequestError::from_status("https://site/x", 429, Some("7".to_string()));
        match error {
            RequestError::Throttled { retry_after, .. } => {
                assert_eq!(retry_after.as_deref(), Some("7"));
            }
            other => panic!("expected Throttled, got {other:?}"),
        }
    }

    #[test]
    fn test_from_status_5xx_and_408_transient() {
        for status in [408, 500, 502, 503, 504, 599] {
            let error = RequestError::from_status("https://site/x", status, None);
            assert_eq!(error.classify(), FailureType::Transient, "status {status}");
        }
    }

    #[test]
    fn test_from_status_other_4xx_rejected() {
        for status in [400, 405, 409, 422] {
            let error = RequestError::from_status("https://site/x", status, None);
            assert_eq!(error.classify(), FailureType::Permanent, "status {status}");
        }
    }

    #[test]
    fn test_error_display_contains_url() {
        let error = RequestError::from_status("https://site/rest/api/content/1", 404, None);
        assert!(error.to_string().contains("/rest/api/content/1"));
        assert_eq!(error.url(), "https://site/rest/api/content/1");
    }
}
