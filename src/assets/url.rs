//! URL helpers for asset references: qualification against the site base,
//! file-name extraction and owning-page extraction.

use url::Url;

use crate::client::RequestError;

const ATTACHMENTS_MARKER: &str = "/download/attachments/";
const EMBEDDED_PAGE_MARKER: &str = "embedded-page/";

/// Page that owns an attachment, as encoded in its download URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePage {
    /// `/download/attachments/{id}/{file}`
    Id(String),
    /// `/download/attachments/embedded-page/{space}/{title...}/{file}`
    ///
    /// The title may itself contain `/`, so it is everything between the
    /// space key and the file name.
    Embedded {
        /// Space key.
        space: String,
        /// Page title.
        title: String,
    },
    /// Not an attachment URL, or too few segments to tell.
    Unknown,
}

/// Undoes the HTML entity escaping of attribute values.
#[must_use]
pub fn unescape_entities(raw: &str) -> String {
    raw.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

/// Qualifies a possibly relative reference against the site base URL.
///
/// - absolute `http(s)://` URLs are kept
/// - scheme-relative `//host/x` gets `https:`
/// - `/x` is appended to the base; if the base has a context path that
///   the reference already starts with, it is appended to the origin only
/// - `x` is appended to the base with a separating `/`
///
/// # Errors
///
/// Returns [`RequestError::InvalidUrl`] for empty, `data:` or unparseable input.
///
/// # Examples
///
/// ```
/// use exporter_core::assets::qualify_url;
/// use url::Url;
///
/// let base = Url::parse("https://site").unwrap();
/// let url = qualify_url("/download/export/x.png", &base).unwrap();
/// assert_eq!(url.as_str(), "https://site/download/export/x.png");
/// ```
pub fn qualify_url(raw: &str, base: &Url) -> Result<Url, RequestError> {
    let reference = unescape_entities(raw.trim());
    let lowered = reference.to_ascii_lowercase();
    if reference.is_empty() || lowered.starts_with("data:") || lowered.starts_with("javascript:") {
        return Err(RequestError::invalid_url(raw));
    }

    let candidate = if lowered.starts_with("http://") || lowered.starts_with("https://") {
        reference
    } else if let Some(rest) = reference.strip_prefix("//") {
        format!("https://{rest}")
    } else if reference.starts_with('/') {
        let context = base.path().trim_end_matches('/');
        if !context.is_empty() && reference.starts_with(&format!("{context}/")) {
            format!("{}{reference}", origin_of(base))
        } else {
            format!("{}{reference}", base.as_str().trim_end_matches('/'))
        }
    } else {
        format!("{}/{reference}", base.as_str().trim_end_matches('/'))
    };

    Url::parse(&candidate).map_err(|_| RequestError::invalid_url(raw))
}

fn origin_of(base: &Url) -> String {
    let mut origin = format!("{}://{}", base.scheme(), base.host_str().unwrap_or_default());
    if let Some(port) = base.port() {
        origin.push_str(&format!(":{port}"));
    }
    origin
}

/// Returns the URL path without query or fragment, entity-unescaped.
fn path_part(raw: &str) -> String {
    let unescaped = unescape_entities(raw);
    let without_fragment = unescaped.split('#').next().unwrap_or_default();
    without_fragment
        .split('?')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment).map_or_else(|_| segment.to_string(), |s| s.into_owned())
}

/// Extracts the decoded file name (last path segment) from a URL.
#[must_use]
pub fn file_name_from_url(raw: &str) -> Option<String> {
    let path = path_part(raw);
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    let name = decode_segment(last);
    let name = name.trim();
    if name.is_empty() || (name.contains(':') && !name.contains('.')) {
        return None;
    }
    Some(name.to_string())
}

/// Parses the owning page out of an attachment download URL.
///
/// # Examples
///
/// ```
/// use exporter_core::assets::{SourcePage, source_page};
///
/// assert_eq!(source_page("/download/attachments/42/a.png"), SourcePage::Id("42".into()));
/// assert_eq!(
///     source_page("/download/attachments/embedded-page/DOC/A/B%20Test/a.png"),
///     SourcePage::Embedded { space: "DOC".into(), title: "A/B Test".into() }
/// );
/// ```
#[must_use]
pub fn source_page(raw: &str) -> SourcePage {
    let path = path_part(raw);
    let Some(index) = path.find(ATTACHMENTS_MARKER) else {
        return SourcePage::Unknown;
    };
    let rest = &path[index + ATTACHMENTS_MARKER.len()..];

    if let Some(embedded) = rest.strip_prefix(EMBEDDED_PAGE_MARKER) {
        let segments: Vec<String> = embedded
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode_segment)
            .collect();
        return match segments.as_slice() {
            [space, title @ .., _file] if !title.is_empty() => SourcePage::Embedded {
                space: space.clone(),
                title: title.join("/"),
            },
            _ => SourcePage::Unknown,
        };
    }

    match rest.split('/').next() {
        Some(id) if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) => {
            SourcePage::Id(id.to_string())
        }
        _ => SourcePage::Unknown,
    }
}
