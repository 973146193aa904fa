//! Confluence Exporter Core Library
//!
//! Exports page trees from a Confluence site into a local directory tree,
//! resolving every embedded image, attachment and emoticon to a file under
//! the export root.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`client`] - REST client with pagination, retry/backoff and throttling
//! - [`assets`] - asset reference discovery, tiered resolution and run cache
//! - [`layout`] - output path allocation and atomic file placement
//! - [`export`] - worker-pool tree exporter and run report
//! - [`auth`] - credentials and cookie-file loading

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assets;
pub mod auth;
pub mod client;
pub mod export;
pub mod layout;
mod user_agent;

// Re-export commonly used types
pub use assets::{AssetResolver, ResolutionError};
pub use auth::Credentials;
pub use client::{ApiClient, ClientConfig, RequestError, RetryPolicy, normalize_site};
pub use export::{ExportOptions, ExportReport, TreeExporter};
pub use layout::ExportLayout;
