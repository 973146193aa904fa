//! Asset discovery and resolution.
//!
//! Pages reference images, attachments, emoticons and external images by
//! URLs that may be relative, stale, or point into another (embedded) page.
//! This module finds those references in page markup and turns each one
//! into a file under the export root's shared `_images/` directory.
//!
//! # Architecture
//!
//! - [`scan_references`] - extracts [`AssetReference`]s from export-view HTML
//! - [`ResolutionTier`] - one fallback strategy; the default chain is
//!   [`DirectFetch`] → [`ContextPageSearch`] → [`SourcePageSearch`]
//! - [`AssetCache`] - run-wide memo with at most one in-flight resolution per key
//! - [`AssetResolver`] - walks the tiers through the cache and stores the body
//!
//! # Example
//!
//! ```no_run
//! use exporter_core::assets::{AssetResolver, PageAssets, scan_references};
//! use exporter_core::client::{ApiClient, ClientConfig, normalize_site};
//! use exporter_core::layout::ExportLayout;
//!
//! # async fn example(html: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new(ClientConfig::new(normalize_site("acme")?))?;
//! let resolver = AssetResolver::new(&client, ExportLayout::new("output"));
//! let page = PageAssets::new("12345", Some("DOC"));
//! for reference in scan_references(html) {
//!     let asset = resolver.resolve(&reference, &page).await?;
//!     println!("{} -> {}", reference.raw, asset.file_name);
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod error;
mod reference;
mod resolver;
mod scan;
mod strategy;
mod url;
mod validate;

pub use cache::{AssetCache, CacheStats, CachedAsset};
pub use error::ResolutionError;
pub use reference::{AssetKey, AssetKind, AssetReference};
pub use resolver::{AssetResolver, EXISTING_SOURCE, PageAssets};
pub use scan::scan_references;
pub use strategy::{
    ContextPageSearch, DirectFetch, FetchedAsset, ResolutionTier, ResolveContext, SourcePageSearch, TierStep,
    default_tiers,
};
pub use url::{SourcePage, file_name_from_url, qualify_url, source_page, unescape_entities};
pub use validate::{content_type_from_extension, sniff_content_type, validate_body};
