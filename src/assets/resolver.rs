//! Asset resolver: tier chain + run-wide cache + local placement.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use super::cache::{AssetCache, CacheStats, CachedAsset};
use super::error::ResolutionError;
use super::reference::{AssetKey, AssetKind, AssetReference};
use super::strategy::{FetchedAsset, ResolutionTier, ResolveContext, TierStep, default_tiers};
use super::url::file_name_from_url;
use super::validate::content_type_from_extension;
use crate::client::ApiClient;
use crate::layout::{ExportLayout, sanitize_file_name, write_atomic};

/// Source recorded for assets reused from a previous run's output.
pub const EXISTING_SOURCE: &str = "existing";

/// Resolves asset references to files in the shared images directory.
///
/// One resolver (and therefore one cache) serves the whole run; share it
/// between workers behind an `Arc`.
pub struct AssetResolver {
    tiers: Vec<Box<dyn ResolutionTier>>,
    cache: AssetCache,
    /// Local file name -> the key that owns it for this run.
    claimed_names: DashMap<String, AssetKey>,
    layout: ExportLayout,
    overwrite: bool,
}

impl std::fmt::Debug for AssetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tiers: Vec<&str> = self.tiers.iter().map(|t| t.name()).collect();
        f.debug_struct("AssetResolver")
            .field("tiers", &tiers)
            .field("cache", &self.cache.stats())
            .field("root", &self.layout.root())
            .field("overwrite", &self.overwrite)
            .finish()
    }
}

/// Per-page resolution state: the context handed to tiers plus the
/// numbering of external images in the order they are met.
#[derive(Debug)]
pub struct PageAssets<'a> {
    ctx: ResolveContext<'a>,
    external_seq: AtomicUsize,
}

impl<'a> PageAssets<'a> {
    /// Starts resolving assets for `page_id`.
    #[must_use]
    pub fn new(page_id: &'a str, space_key: Option<&'a str>) -> Self {
        Self {
            ctx: ResolveContext::new(page_id, space_key),
            external_seq: AtomicUsize::new(0),
        }
    }

    /// The context page id.
    #[must_use]
    pub fn page_id(&self) -> &str {
        self.ctx.page_id
    }
}

impl AssetResolver {
    /// Creates a resolver with the default tier chain.
    #[must_use]
    pub fn new(client: &ApiClient, layout: ExportLayout) -> Self {
        Self::with_tiers(default_tiers(client), layout)
    }

    /// Creates a resolver with a custom tier chain.
    #[must_use]
    pub fn with_tiers(tiers: Vec<Box<dyn ResolutionTier>>, layout: ExportLayout) -> Self {
        Self {
            tiers,
            cache: AssetCache::new(),
            claimed_names: DashMap::new(),
            layout,
            overwrite: false,
        }
    }

    /// Refetch assets even when a file with the target name already exists.
    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Resolves one reference found on `page`.
    ///
    /// A reference already resolved (or already failed) during this run,
    /// from any page, is answered from the cache without network traffic.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] when every tier failed, the source page
    /// is ambiguous, the session expired, or the file cannot be written.
    #[instrument(skip_all, fields(page_id = page.page_id(), file = %reference.filename, kind = ?reference.kind))]
    pub async fn resolve(
        &self,
        reference: &AssetReference,
        page: &PageAssets<'_>,
    ) -> Result<CachedAsset, ResolutionError> {
        let key = reference.key(page.page_id());
        self.cache
            .get_or_resolve(&key, || async {
                let (file_name, contested) = self.claim_name(&local_file_name(reference, &key, page), &key);
                self.resolve_uncached(reference, page.ctx, file_name, contested).await
            })
            .await
    }

    /// Reserves `name` for `key`, appending `-2`, `-3`, ... while another key
    /// holds it. Returns the name and whether it had to be changed.
    fn claim_name(&self, name: &str, key: &AssetKey) -> (String, bool) {
        let mut candidate = name.to_string();
        let mut n = 1;
        loop {
            let holder = self.claimed_names.entry(candidate.clone()).or_insert_with(|| key.clone());
            if holder.value() == key {
                let contested = n > 1;
                if contested {
                    warn!(key = %key, wanted = %name, got = %candidate, "asset file name taken by another asset");
                }
                return (candidate, contested);
            }
            drop(holder);
            n += 1;
            candidate = with_suffix(name, &n.to_string());
        }
    }

    async fn resolve_uncached(
        &self,
        reference: &AssetReference,
        ctx: ResolveContext<'_>,
        file_name: String,
        contested: bool,
    ) -> Result<CachedAsset, ResolutionError> {
        let path = self.layout.images_dir().join(&file_name);
        // A renamed slot may hold another asset's bytes from an earlier run.
        if !self.overwrite && !contested && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(path = %path.display(), "asset already on disk");
            return existing_asset(file_name, &path).await;
        }

        let fetched = self.run_tiers(reference, &ctx).await?;
        write_atomic(&path, &fetched.bytes)
            .await
            .map_err(|e| ResolutionError::io(&path, &e))?;
        info!(
            file = %file_name,
            tier = fetched.tier,
            bytes = fetched.bytes.len(),
            "asset stored"
        );
        Ok(CachedAsset {
            file_name,
            size: fetched.bytes.len() as u64,
            path,
            content_type: fetched.content_type,
            source: fetched.tier.to_string(),
        })
    }

    async fn run_tiers(
        &self,
        reference: &AssetReference,
        ctx: &ResolveContext<'_>,
    ) -> Result<FetchedAsset, ResolutionError> {
        let mut contexts = Vec::new();
        let mut last_error = None;
        for tier in &self.tiers {
            match tier.attempt(reference, ctx).await? {
                TierStep::Resolved(asset) => return Ok(asset),
                TierStep::TryNext { attempted, reason } => {
                    debug!(tier = tier.name(), attempted = %attempted, reason = %reason, "tier failed");
                    contexts.push(attempted);
                    last_error = Some(reason);
                }
                TierStep::NotApplicable => {}
            }
        }
        Err(ResolutionError::Unresolved {
            filename: reference.filename.clone(),
            contexts,
            last_error,
        })
    }
}

async fn existing_asset(file_name: String, path: &Path) -> Result<CachedAsset, ResolutionError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| ResolutionError::io(path, &e))?;
    Ok(CachedAsset {
        content_type: content_type_from_extension(&file_name)
            .unwrap_or("application/octet-stream")
            .to_string(),
        file_name,
        path: path.to_path_buf(),
        size: metadata.len(),
        source: EXISTING_SOURCE.to_string(),
    })
}

/// Name of the file inside the shared images directory.
///
/// Page attachments are prefixed with their owning page id so equal file
/// names from different pages do not collide; emoticons are shared as is;
/// external images are numbered per page.
fn local_file_name(reference: &AssetReference, key: &AssetKey, page: &PageAssets<'_>) -> String {
    match reference.kind {
        AssetKind::Attachment | AssetKind::EmbeddedImage => {
            format!("{}_{}", sanitize_file_name(&key.scope), distinct_file_name(&reference.filename))
        }
        AssetKind::Emoticon => distinct_file_name(&reference.filename),
        AssetKind::External => {
            let n = page.external_seq.fetch_add(1, Ordering::Relaxed) + 1;
            let name = file_name_from_url(&reference.raw).unwrap_or_else(|| "image".to_string());
            format!("{}-{n}-{}", sanitize_file_name(page.page_id()), sanitize_file_name(&name))
        }
    }
}

/// Sanitized file name that stays distinct from other originals.
///
/// When sanitizing changed the name, eight hex digits of the original's
/// SHA-256 are appended to the stem, so `a(1).png` and `a_1_.png` land in
/// different files and keep doing so across runs.
fn distinct_file_name(original: &str) -> String {
    let clean = sanitize_file_name(original);
    if clean == original {
        return clean;
    }
    let digest = Sha256::digest(original.as_bytes());
    let mut tag = String::with_capacity(8);
    for byte in &digest[..4] {
        let _ = write!(tag, "{byte:02x}");
    }
    with_suffix(&clean, &tag)
}

/// Inserts `-{suffix}` before the extension.
fn with_suffix(name: &str, suffix: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => format!("{stem}-{suffix}.{extension}"),
        _ => format!("{name}-{suffix}"),
    }
}
