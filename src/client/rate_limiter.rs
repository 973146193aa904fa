//! Per-host request pacing shared by every export worker.
//!
//! The [`RateLimiter`] enforces a minimum spacing between request starts to
//! the same host and, once the origin answers 429 with a Retry-After hint,
//! blocks *all* workers for that host until the window passes. One throttled
//! worker therefore slows the whole pool instead of each worker discovering
//! the throttle on its own.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use exporter_core::client::RateLimiter;
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::new(Duration::from_millis(100)));
//!
//! // First request proceeds immediately
//! limiter.acquire("https://wiki.example.com/rest/api/content/1").await;
//!
//! // Second request to same host waits for the spacing
//! limiter.acquire("https://wiki.example.com/rest/api/content/2").await;
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Warning threshold for cumulative delay per host (30 seconds).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After value (1 hour) to prevent excessive delays.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Per-host request pacer.
///
/// Designed to be wrapped in `Arc` and shared across worker tasks. Uses
/// `DashMap` for concurrent access to per-host state and a `tokio::sync::Mutex`
/// per host for atomic read-update of timing.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum spacing between requests to the same host.
    default_delay: Duration,

    /// Whether spacing is disabled (`--rate-limit 0`). Server throttle windows still apply.
    disabled: bool,

    /// Per-host state. Arc lets us release the shard lock before awaiting.
    hosts: DashMap<String, Arc<HostState>>,
}

#[derive(Debug)]
struct HostState {
    /// Start time of the last request; `None` until the first request.
    last_request: Mutex<Option<Instant>>,

    /// No request may start before this instant (set from Retry-After).
    blocked_until: std::sync::Mutex<Option<Instant>>,

    /// Cumulative delay applied to this host, in milliseconds.
    cumulative_delay_ms: AtomicU64,
}

impl HostState {
    fn new() -> Self {
        Self {
            last_request: Mutex::new(None),
            blocked_until: std::sync::Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }

    fn blocked_until(&self) -> Option<Instant> {
        self.blocked_until
            .lock()
            .map(|guard| *guard)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    fn extend_block(&self, until: Instant) {
        let mut guard = self
            .blocked_until
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.is_none_or(|current| current < until) {
            *guard = Some(until);
        }
    }
}

impl RateLimiter {
    /// Creates a new limiter with the given minimum spacing.
    #[must_use]
    #[instrument(skip_all, fields(delay_ms = default_delay.as_millis()))]
    pub fn new(default_delay: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            default_delay,
            disabled: default_delay.is_zero(),
            hosts: DashMap::new(),
        }
    }

    /// Creates a limiter that applies no spacing.
    ///
    /// Server-imposed throttle windows recorded via
    /// [`record_rate_limit`](Self::record_rate_limit) are still honored.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns whether spacing is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the minimum spacing between requests.
    #[must_use]
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    fn host_state(&self, host: &str) -> Arc<HostState> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(HostState::new()))
            .clone()
    }

    /// Waits until a request to the URL's host may start.
    ///
    /// The first request to any host proceeds immediately unless the host is
    /// inside a server throttle window.
    #[instrument(skip(self), fields(host))]
    pub async fn acquire(&self, url: &str) {
        let host = extract_host(url);
        tracing::Span::current().record("host", host.as_str());

        let state = self.host_state(&host);
        let mut last_request_guard = state.last_request.lock().await;

        let now = Instant::now();
        let mut wake_at = now;

        if !self.disabled
            && let Some(last_request) = *last_request_guard
        {
            wake_at = wake_at.max(last_request + self.default_delay);
        }
        if let Some(blocked_until) = state.blocked_until() {
            wake_at = wake_at.max(blocked_until);
        }

        if wake_at > now {
            let delay = wake_at - now;
            let cumulative = state.add_cumulative_delay(delay);
            debug!(
                host = %host,
                delay_ms = delay.as_millis(),
                cumulative_ms = cumulative.as_millis(),
                "pacing request"
            );
            if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                warn!(
                    host = %host,
                    cumulative_delay_secs = cumulative.as_secs(),
                    "excessive pacing delay - consider fewer workers"
                );
            }
            tokio::time::sleep_until(wake_at).await;
        }

        *last_request_guard = Some(Instant::now());
    }

    /// Records a server-mandated throttle window for the URL's host.
    ///
    /// Every subsequent [`acquire`](Self::acquire) for the host waits until
    /// the window has passed.
    #[instrument(skip(self), fields(host))]
    pub fn record_rate_limit(&self, url: &str, delay: Duration) {
        let host = extract_host(url);
        tracing::Span::current().record("host", host.as_str());

        let state = self.host_state(&host);
        state.extend_block(Instant::now() + delay);
        let cumulative = state.add_cumulative_delay(delay);

        debug!(
            host = %host,
            delay_ms = delay.as_millis(),
            cumulative_ms = cumulative.as_millis(),
            "recorded server throttle window"
        );

        if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
            warn!(
                host = %host,
                cumulative_delay_secs = cumulative.as_secs(),
                "origin keeps throttling - site may be under heavy load"
            );
        }
    }
}

/// Extracts the lowercase host from a URL.
///
/// Returns "unknown" for malformed URLs so they still share one pacing slot.
///
/// # Examples
///
/// ```
/// use exporter_core::client::rate_limiter::extract_host;
///
/// assert_eq!(extract_host("https://Wiki.Example.COM/rest/api"), "wiki.example.com");
/// assert_eq!(extract_host("http://localhost:8090/x"), "localhost");
/// assert_eq!(extract_host("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports integer seconds and HTTP-date (RFC 7231). Returns `None` when the
/// value cannot be parsed. Caps excessive values at 1 hour.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use exporter_core::client::rate_limiter::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);

        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }

        return Some(duration);
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();
        if let Ok(duration) = datetime.duration_since(now) {
            if duration > MAX_RETRY_AFTER {
                warn!(
                    delay_secs = duration.as_secs(),
                    max_secs = MAX_RETRY_AFTER.as_secs(),
                    "Retry-After date exceeds maximum, capping at 1 hour"
                );
                return Some(MAX_RETRY_AFTER);
            }
            Some(duration)
        } else {
            debug!(header_value, "Retry-After date is in the past, returning zero");
            Some(Duration::ZERO)
        }
    } else {
        debug!(header_value, "unparseable Retry-After value");
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== RateLimiter Tests ====================

    #[test]
    fn test_rate_limiter_new_creates_with_delay() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        assert_eq!(limiter.default_delay(), Duration::from_millis(500));
        assert!(!limiter.is_disabled());
    }

    #[test]
    fn test_rate_limiter_zero_delay_is_disabled() {
        assert!(RateLimiter::new(Duration::ZERO).is_disabled());
        assert!(RateLimiter::disabled().is_disabled());
    }

    #[tokio::test]
    async fn test_rate_limiter_disabled_no_delay() {
        tokio::time::pause();

        let limiter = RateLimiter::disabled();
        let start = Instant::now();

        limiter.acquire("https://wiki.example.com/1").await;
        limiter.acquire("https://wiki.example.com/2").await;
        limiter.acquire("https://wiki.example.com/3").await;

        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_same_host() {
        tokio::time::pause();

        let limiter = RateLimiter::new(Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire("https://wiki.example.com/1").await;
        assert!(start.elapsed() < Duration::from_millis(10));

        limiter.acquire("https://wiki.example.com/2").await;
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));
    }

    #[tokio::test]
    async fn test_rate_limiter_different_hosts_independent() {
        tokio::time::pause();

        let limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.acquire("https://a.example.com/x").await;

        let start = Instant::now();
        limiter.acquire("https://b.example.com/x").await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_recorded_throttle_blocks_even_when_disabled() {
        tokio::time::pause();

        let limiter = RateLimiter::disabled();
        limiter.record_rate_limit("https://wiki.example.com/a", Duration::from_secs(5));

        let start = Instant::now();
        limiter.acquire("https://wiki.example.com/b").await;
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_millis(5100));
    }

    #[test]
    fn test_record_rate_limit_keeps_longest_window() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.record_rate_limit("https://wiki.example.com/1", Duration::from_secs(10));
        let first = limiter
            .hosts
            .get("wiki.example.com")
            .unwrap()
            .blocked_until()
            .unwrap();

        limiter.record_rate_limit("https://wiki.example.com/2", Duration::from_secs(1));
        let second = limiter
            .hosts
            .get("wiki.example.com")
            .unwrap()
            .blocked_until()
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_record_rate_limit_tracks_cumulative() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.record_rate_limit("https://wiki.example.com/1", Duration::from_secs(5));
        limiter.record_rate_limit("https://wiki.example.com/2", Duration::from_secs(10));

        let state = limiter.hosts.get("wiki.example.com").unwrap();
        assert_eq!(state.cumulative_delay_ms.load(Ordering::SeqCst), 15000);
    }

    // ==================== extract_host Tests ====================

    #[test]
    fn test_extract_host_variants() {
        assert_eq!(extract_host("https://wiki.example.com/p"), "wiki.example.com");
        assert_eq!(extract_host("https://Wiki.EXAMPLE.com/p"), "wiki.example.com");
        assert_eq!(extract_host("https://wiki.example.com:8443/p"), "wiki.example.com");
        assert_eq!(extract_host("http://127.0.0.1:9000/p"), "127.0.0.1");
        assert_eq!(extract_host(""), "unknown");
    }

    // ==================== parse_retry_after Tests ====================

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after("  15  "), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_parse_retry_after_rejects_garbage() {
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_parse_retry_after_caps_at_one_hour() {
        assert_eq!(parse_retry_after("7200"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_parse_retry_after_http_date_past() {
        let past_date = "Wed, 01 Jan 2020 00:00:00 GMT";
        assert_eq!(parse_retry_after(past_date), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_http_date_future() {
        let future_time = std::time::SystemTime::now() + Duration::from_secs(60);
        let future_date = httpdate::fmt_http_date(future_time);

        let duration = parse_retry_after(&future_date).unwrap();
        assert!(
            duration >= Duration::from_secs(55) && duration <= Duration::from_secs(65),
            "duration should be ~60s, got {duration:?}"
        );
    }
}
