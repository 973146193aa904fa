//! Resilient client for the origin REST API.
//!
//! - [`ApiClient`]: authenticated requests with retry, backoff and jitter
//! - [`ApiClient::paginate`]: lazy concatenation of every result page
//! - [`RateLimiter`]: per-host spacing and shared throttle windows
//! - [`RequestError`]: typed failures classified for retry decisions

mod api;
mod constants;
mod endpoints;
mod error;
mod models;
mod pagination;
pub mod rate_limiter;
mod retry;
mod site;

pub use api::{ApiClient, ApiResponse, ClientConfig, RequestStats};
pub use constants::{CONNECT_TIMEOUT_SECS, DEFAULT_RATE_LIMIT_MS, MAX_PAGE_SIZE, READ_TIMEOUT_SECS};
pub use error::RequestError;
pub use models::{Content, ContentRef, Label, Links, PagedResult, Space};
pub use rate_limiter::RateLimiter;
pub use retry::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, RetryState,
};
pub use site::normalize_site;
