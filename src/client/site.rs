//! Site base URL normalization.

use url::Url;

use super::error::RequestError;

/// Turns user input into the site base URL.
///
/// - `acme` becomes `https://acme.atlassian.net`
/// - `wiki.example.com` becomes `https://wiki.example.com`
/// - an `https://` prefix is stripped and re-added
/// - an explicit `http://` is kept (local instances, tests)
///
/// A trailing slash is removed; a context path such as `/wiki` is kept.
///
/// # Errors
///
/// Returns [`RequestError::InvalidUrl`] when the result does not parse.
///
/// # Examples
///
/// ```
/// use exporter_core::client::normalize_site;
///
/// assert_eq!(normalize_site("acme").unwrap().as_str(), "https://acme.atlassian.net/");
/// assert_eq!(
///     normalize_site("https://wiki.example.com/confluence/").unwrap().as_str(),
///     "https://wiki.example.com/confluence"
/// );
/// ```
pub fn normalize_site(input: &str) -> Result<Url, RequestError> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(RequestError::invalid_url(input));
    }

    let candidate = if trimmed.starts_with("http://") {
        trimmed.to_string()
    } else {
        let bare = trimmed.strip_prefix("https://").unwrap_or(trimmed);
        let host = bare.split('/').next().unwrap_or(bare);
        if host.contains('.') || host.contains(':') {
            format!("https://{bare}")
        } else {
            format!("https://{bare}.atlassian.net")
        }
    };

    let url = Url::parse(&candidate).map_err(|_| RequestError::invalid_url(input))?;
    if url.host_str().is_none() {
        return Err(RequestError::invalid_url(input));
    }
    Ok(url)
}

/// Joins the base URL and an API path, keeping the base's context path.
///
/// `path` may already be absolute (`http(s)://...`), in which case it is
/// used as-is.
pub(crate) fn endpoint_url(base: &Url, path: &str) -> Result<Url, RequestError> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Url::parse(path).map_err(|_| RequestError::invalid_url(path));
    }
    let base = base.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let joined = format!("{base}/{path}");
    Url::parse(&joined).map_err(|_| RequestError::invalid_url(joined))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_name() {
        assert_eq!(normalize_site("acme").unwrap().as_str(), "https://acme.atlassian.net/");
    }

    #[test]
    fn test_normalize_full_atlassian_host() {
        assert_eq!(
            normalize_site("https://acme.atlassian.net/").unwrap().as_str(),
            "https://acme.atlassian.net/"
        );
    }

    #[test]
    fn test_normalize_custom_domain_and_context_path() {
        assert_eq!(
            normalize_site("wiki.example.com/confluence").unwrap().as_str(),
            "https://wiki.example.com/confluence"
        );
    }

    #[test]
    fn test_normalize_keeps_http_for_local() {
        assert_eq!(
            normalize_site("http://127.0.0.1:8090").unwrap().as_str(),
            "http://127.0.0.1:8090/"
        );
    }

    #[test]
    fn test_normalize_rejects_empty() {
        assert!(normalize_site("   ").is_err());
    }

    #[test]
    fn test_endpoint_url_keeps_context_path() {
        let base = normalize_site("https://wiki.example.com/confluence").unwrap();
        let url = endpoint_url(&base, "/rest/api/content/1").unwrap();
        assert_eq!(url.as_str(), "https://wiki.example.com/confluence/rest/api/content/1");
    }

    #[test]
    fn test_endpoint_url_absolute_passthrough() {
        let base = normalize_site("acme").unwrap();
        let url = endpoint_url(&base, "https://cdn.example.com/x.png").unwrap();
        assert_eq!(url.host_str(), Some("cdn.example.com"));
    }
}
