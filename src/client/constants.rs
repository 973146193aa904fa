//! Constants for the origin client (timeouts, pagination, pacing).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (2 minutes; attachment downloads can be large).
pub const READ_TIMEOUT_SECS: u64 = 120;

/// Largest page size the origin accepts on list endpoints.
pub const MAX_PAGE_SIZE: u32 = 250;

/// Default minimum spacing between requests to the origin, in milliseconds.
pub const DEFAULT_RATE_LIMIT_MS: u64 = 100;

/// Expansions requested when fetching a page by id.
pub const PAGE_EXPAND: &str = "body.export_view,ancestors,space,version";

/// URL fragments that mean the origin bounced us to a login page.
pub const LOGIN_PATTERNS: &[&str] = &[
    "/login",
    "/signin",
    "/sso",
    "/saml",
    "/oauth",
    "/authenticate",
    "id.atlassian.com",
];
