//! Netscape cookie file loader.
//!
//! Browser extensions export session cookies as a Netscape cookie file
//! (7 TAB-separated fields per line). The exporter loads that file into a
//! `reqwest::cookie::Jar` which the origin client then uses as an opaque
//! session capability.

use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::cookie::Jar;
use tracing::{debug, info, instrument, warn};

/// One cookie parsed from a cookie file.
///
/// The value is redacted in Debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct CookieRecord {
    /// Cookie domain, possibly with a leading dot (`.example.atlassian.net`).
    pub domain: String,
    /// Whether subdomains match.
    pub include_subdomains: bool,
    /// Path scope.
    pub path: String,
    /// Whether the cookie is HTTPS-only.
    pub secure: bool,
    /// Unix expiry timestamp (0 = session cookie).
    pub expires: u64,
    /// Cookie name.
    pub name: String,
    value: String,
}

impl CookieRecord {
    /// Returns the cookie value. Never log it.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true when this cookie would be sent to `host`.
    #[must_use]
    pub fn applies_to(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let domain = self.domain.trim_start_matches('.').to_ascii_lowercase();
        host == domain || (self.include_subdomains && host.ends_with(&format!(".{domain}")))
    }

    fn set_cookie_header(&self) -> String {
        let mut parts = vec![
            format!("{}={}", self.name, self.value),
            format!("Domain={}", self.domain),
            format!("Path={}", self.path),
        ];
        if self.secure {
            parts.push("Secure".to_string());
        }
        if self.expires > 0 {
            match unix_to_http_date(self.expires) {
                Some(expires) => parts.push(format!("Expires={expires}")),
                None => warn!(
                    domain = %self.domain,
                    name = %self.name,
                    "cookie expiry overflows SystemTime; treating as session cookie"
                ),
            }
        }
        parts.join("; ")
    }

    fn origin_url(&self) -> Option<url::Url> {
        let scheme = if self.secure { "https" } else { "http" };
        let domain = self.domain.trim_start_matches('.');
        url::Url::parse(&format!("{scheme}://{domain}{}", self.path)).ok()
    }
}

impl fmt::Debug for CookieRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieRecord")
            .field("domain", &self.domain)
            .field("include_subdomains", &self.include_subdomains)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("expires", &self.expires)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Errors raised while loading a cookie file.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// The file could not be read.
    #[error("cannot read cookie file {}: {source}", .path.display())]
    Io {
        /// The cookie file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file had data lines but none of them parsed.
    #[error("no valid cookies found ({malformed} malformed lines)")]
    NoCookies {
        /// Number of lines that failed to parse.
        malformed: usize,
    },
}

/// Parses Netscape cookie lines from a reader.
///
/// Blank lines and `#` comments are skipped, except the `#HttpOnly_` prefix
/// browsers use to mark HTTP-only cookies. Malformed lines are logged and
/// skipped.
///
/// # Errors
///
/// Returns [`CookieError::NoCookies`] when the input has data lines but none
/// of them are valid.
#[instrument(level = "debug", skip(reader))]
pub fn parse_cookie_lines(reader: impl BufRead) -> Result<Vec<CookieRecord>, CookieError> {
    let mut records = Vec::new();
    let mut malformed = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let Ok(line) = line else {
            malformed += 1;
            continue;
        };
        let line = line.trim_end();
        let line = line.strip_prefix("#HttpOnly_").unwrap_or(line);
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_line(line) {
            Ok(record) => {
                debug!(line = line_number, domain = %record.domain, name = %record.name, "parsed cookie");
                records.push(record);
            }
            Err(reason) => {
                warn!(line = line_number, reason, "skipping malformed cookie line");
                malformed += 1;
            }
        }
    }

    if records.is_empty() && malformed > 0 {
        return Err(CookieError::NoCookies { malformed });
    }
    Ok(records)
}

fn parse_line(line: &str) -> Result<CookieRecord, &'static str> {
    let fields: Vec<&str> = line.split('\t').collect();
    let [domain, include_subdomains, path, secure, expires, name, value] = fields[..] else {
        return Err("expected 7 TAB-separated fields");
    };
    if domain.is_empty() {
        return Err("domain field is empty");
    }
    if name.is_empty() {
        return Err("cookie name is empty");
    }
    Ok(CookieRecord {
        domain: domain.to_string(),
        include_subdomains: parse_flag(include_subdomains)?,
        path: if path.is_empty() { "/" } else { path }.to_string(),
        secure: parse_flag(secure)?,
        expires: expires.parse().map_err(|_| "expires is not a non-negative integer")?,
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(value: &str) -> Result<bool, &'static str> {
    match value.to_ascii_uppercase().as_str() {
        "TRUE" => Ok(true),
        "FALSE" => Ok(false),
        _ => Err("flag field must be TRUE or FALSE"),
    }
}

fn unix_to_http_date(timestamp: u64) -> Option<String> {
    let time = std::time::UNIX_EPOCH.checked_add(std::time::Duration::from_secs(timestamp))?;
    Some(httpdate::fmt_http_date(time))
}

/// Builds a cookie jar from parsed records.
#[must_use]
pub fn jar_from_records(records: &[CookieRecord]) -> Arc<Jar> {
    let jar = Arc::new(Jar::default());
    for record in records {
        match record.origin_url() {
            Some(origin) => jar.add_cookie_str(&record.set_cookie_header(), &origin),
            None => warn!(domain = %record.domain, name = %record.name, "skipping cookie with unusable domain"),
        }
    }
    jar
}

/// Loads a Netscape cookie file into a jar for the given site host.
///
/// Warns when none of the cookies would be sent to `site_host`; the auth
/// probe will then fail with a clear message.
///
/// # Errors
///
/// Returns [`CookieError`] when the file cannot be read or holds no valid cookie.
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_cookie_file(path: &Path, site_host: &str) -> Result<Arc<Jar>, CookieError> {
    let file = std::fs::File::open(path).map_err(|source| CookieError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records = parse_cookie_lines(std::io::BufReader::new(file))?;

    let matching = records.iter().filter(|r| r.applies_to(site_host)).count();
    if matching == 0 {
        warn!(site_host, total = records.len(), "no cookie in file applies to the site");
    }
    info!(count = records.len(), matching, "loaded cookies");

    Ok(jar_from_records(&records))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;
    use std::io::Cursor;

    fn parse(input: &str) -> Result<Vec<CookieRecord>, CookieError> {
        parse_cookie_lines(Cursor::new(input.as_bytes()))
    }

    #[test]
    fn test_parse_cookie_lines_valid_file() {
        let input = "\
# Netscape HTTP Cookie File
.acme.atlassian.net\tTRUE\t/\tTRUE\t0\ttenant.session.token\tabc123
#HttpOnly_acme.atlassian.net\tFALSE\t/wiki\tTRUE\t1700000000\tJSESSIONID\txyz
";
        let records = parse(input).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "tenant.session.token");
        assert_eq!(records[0].value(), "abc123");
        assert!(records[0].include_subdomains);
        assert_eq!(records[1].domain, "acme.atlassian.net");
        assert_eq!(records[1].path, "/wiki");
        assert_eq!(records[1].expires, 1_700_000_000);
    }

    #[test]
    fn test_parse_cookie_lines_skips_malformed() {
        let input = "garbage\n.a.net\tTRUE\t/\tFALSE\t0\tname\tvalue\n";
        let records = parse(input).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_parse_cookie_lines_all_malformed_is_error() {
        let result = parse("garbage\nmore garbage\n");
        assert!(matches!(result, Err(CookieError::NoCookies { malformed: 2 })));
    }

    #[test]
    fn test_parse_cookie_lines_empty_is_ok() {
        assert!(parse("# only a header\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_debug_redacts_value() {
        let records = parse(".a.net\tTRUE\t/\tFALSE\t0\tsession\tsecret-value\n").unwrap();
        let debug = format!("{:?}", records[0]);
        assert!(!debug.contains("secret-value"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_applies_to_subdomains() {
        let records = parse(
            ".atlassian.net\tTRUE\t/\tTRUE\t0\ta\t1\nacme.example.com\tFALSE\t/\tTRUE\t0\tb\t2\n",
        )
        .unwrap();
        assert!(records[0].applies_to("acme.atlassian.net"));
        assert!(records[0].applies_to("atlassian.net"));
        assert!(records[1].applies_to("ACME.example.com"));
        assert!(!records[1].applies_to("wiki.acme.example.com"));
    }

    #[test]
    fn test_jar_from_records_sends_cookie() {
        let records = parse(".acme.atlassian.net\tTRUE\t/\tTRUE\t0\tsession\tabc\n").unwrap();
        let jar = jar_from_records(&records);
        let url = url::Url::parse("https://acme.atlassian.net/rest/api/space").unwrap();
        let header = jar.cookies(&url).unwrap();
        assert_eq!(header.to_str().unwrap(), "session=abc");
    }

    #[test]
    fn test_load_cookie_file_missing_path() {
        let result = load_cookie_file(Path::new("/nonexistent/cookies.txt"), "acme.atlassian.net");
        assert!(matches!(result, Err(CookieError::Io { .. })));
    }
}
