//! User-Agent strings for origin and external-asset traffic.

/// Project URL advertised in the User-Agent.
const PROJECT_UA_URL: &str = "https://github.com/confluence-exporter/confluence-exporter";

/// User-Agent for authenticated origin API and attachment requests.
#[must_use]
pub(crate) fn origin_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("confluence-exporter/{version} (+{PROJECT_UA_URL})")
}

/// User-Agent for external images fetched without origin credentials.
#[must_use]
pub(crate) fn external_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("confluence-exporter/{version} (asset-fetch; +{PROJECT_UA_URL})")
}
