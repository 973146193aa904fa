//! Resolution tiers.
//!
//! Each tier turns `(reference, context page)` into either a validated body
//! or an explicit "try the next tier" signal. [`AssetResolver`] walks them in
//! order; a tier returns `Err` only for conditions no later tier can fix.
//!
//! [`AssetResolver`]: super::AssetResolver

use async_trait::async_trait;
use tracing::{debug, instrument};
use url::Url;

use super::error::ResolutionError;
use super::reference::AssetReference;
use super::url::{SourcePage, qualify_url, source_page};
use super::validate::validate_body;
use crate::client::{ApiClient, Content, RequestError};

/// Per-page context handed to every tier.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Page the reference was found on.
    pub page_id: &'a str,
    /// Space of that page, when known.
    pub space_key: Option<&'a str>,
}

impl<'a> ResolveContext<'a> {
    /// Creates a context for `page_id`.
    #[must_use]
    pub fn new(page_id: &'a str, space_key: Option<&'a str>) -> Self {
        Self { page_id, space_key }
    }
}

/// A body that passed validation.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    /// Response body.
    pub bytes: Vec<u8>,
    /// Verified content type.
    pub content_type: String,
    /// URL the body was fetched from.
    pub source_url: Url,
    /// Name of the tier that produced it.
    pub tier: &'static str,
}

/// Outcome of one tier.
#[derive(Debug, Clone)]
pub enum TierStep {
    /// The asset was found.
    Resolved(FetchedAsset),
    /// This tier tried and failed; continue with the next one.
    TryNext {
        /// What was attempted, e.g. `page 42`.
        attempted: String,
        /// Why it failed.
        reason: String,
    },
    /// This tier does not apply to the reference.
    NotApplicable,
}

impl TierStep {
    fn try_next(attempted: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TryNext {
            attempted: attempted.into(),
            reason: reason.into(),
        }
    }
}

/// One strategy in the ordered fallback chain.
///
/// Uses `async_trait` so tiers can live in a `Vec<Box<dyn ResolutionTier>>`.
#[async_trait]
pub trait ResolutionTier: Send + Sync {
    /// Short tier name used in logs and the report.
    fn name(&self) -> &'static str;

    /// Attempts to produce the asset.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] only when the whole resolution must stop
    /// (expired session, undeterminable source page).
    async fn attempt(
        &self,
        reference: &AssetReference,
        ctx: &ResolveContext<'_>,
    ) -> Result<TierStep, ResolutionError>;
}

/// Maps a request failure to a tier outcome; only an expired session is fatal.
fn request_failed(error: RequestError, attempted: String) -> Result<TierStep, ResolutionError> {
    if error.is_auth_expired() {
        return Err(ResolutionError::AuthExpired(error));
    }
    Ok(TierStep::try_next(attempted, error.to_string()))
}

/// Fetches `url` and validates the body against `filename`.
async fn fetch_validated(
    client: &ApiClient,
    url: &Url,
    authenticated: bool,
    filename: &str,
    tier: &'static str,
    attempted: String,
) -> Result<TierStep, ResolutionError> {
    let response = match client.fetch_binary(url, authenticated).await {
        Ok(response) => response,
        Err(error) => return request_failed(error, attempted),
    };
    match validate_body(response.content_type.as_deref(), &response.body, filename) {
        Ok(content_type) => Ok(TierStep::Resolved(FetchedAsset {
            bytes: response.body,
            content_type,
            source_url: response.url,
            tier,
        })),
        Err(reason) => {
            debug!(url = %url, reason = %reason, "body rejected");
            Ok(TierStep::try_next(attempted, reason))
        }
    }
}

/// Looks for `reference` in the attachment listing of `page_id` and fetches
/// the canonical download link on match.
async fn search_page(
    client: &ApiClient,
    page_id: &str,
    reference: &AssetReference,
    tier: &'static str,
) -> Result<TierStep, ResolutionError> {
    let attempted = format!("page {page_id}");
    let attachment: Content = match client.find_attachment(page_id, &reference.filename).await {
        Ok(Some(attachment)) => attachment,
        Ok(None) => return Ok(TierStep::try_next(attempted, "not in attachment listing")),
        Err(error) => return request_failed(error, attempted),
    };
    let Some(download) = attachment.links.download.as_deref() else {
        return Ok(TierStep::try_next(attempted, "listing has no download link"));
    };
    let url = match qualify_url(download, client.base_url()) {
        Ok(url) => url,
        Err(error) => return Ok(TierStep::try_next(attempted, error.to_string())),
    };
    fetch_validated(client, &url, true, &reference.filename, tier, attempted).await
}

// ==================== Tier 1 ====================

/// Fetches the reference URL itself, qualified against the site base.
#[derive(Debug, Clone)]
pub struct DirectFetch {
    client: ApiClient,
}

impl DirectFetch {
    /// Creates the tier.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResolutionTier for DirectFetch {
    fn name(&self) -> &'static str {
        "direct"
    }

    #[instrument(skip_all, fields(tier = "direct", file = %reference.filename))]
    async fn attempt(
        &self,
        reference: &AssetReference,
        _ctx: &ResolveContext<'_>,
    ) -> Result<TierStep, ResolutionError> {
        let url = match qualify_url(&reference.raw, self.client.base_url()) {
            Ok(url) => url,
            Err(error) => return Ok(TierStep::try_next("direct", error.to_string())),
        };
        let authenticated = reference.kind.uses_origin_credentials();
        fetch_validated(
            &self.client,
            &url,
            authenticated,
            &reference.filename,
            self.name(),
            "direct".to_string(),
        )
        .await
    }
}

// ==================== Tier 2 ====================

/// Searches the attachment listing of the page the reference was found on.
#[derive(Debug, Clone)]
pub struct ContextPageSearch {
    client: ApiClient,
}

impl ContextPageSearch {
    /// Creates the tier.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResolutionTier for ContextPageSearch {
    fn name(&self) -> &'static str {
        "context-page"
    }

    #[instrument(skip_all, fields(tier = "context-page", page_id = ctx.page_id, file = %reference.filename))]
    async fn attempt(
        &self,
        reference: &AssetReference,
        ctx: &ResolveContext<'_>,
    ) -> Result<TierStep, ResolutionError> {
        if !reference.kind.is_searchable() {
            return Ok(TierStep::NotApplicable);
        }
        search_page(&self.client, ctx.page_id, reference, self.name()).await
    }
}

// ==================== Tier 3 ====================

/// Searches the page the reference URL says owns the attachment, when that
/// is a different page than the context page.
///
/// Embedded-page URLs carry a space key and title instead of an id; the
/// title is looked up and must match exactly one page; otherwise the
/// reference is reported as [`ResolutionError::AmbiguousSource`] rather than
/// guessed.
#[derive(Debug, Clone)]
pub struct SourcePageSearch {
    client: ApiClient,
}

impl SourcePageSearch {
    /// Creates the tier.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    async fn source_page_id(
        &self,
        reference: &AssetReference,
        ctx: &ResolveContext<'_>,
    ) -> Result<SourceLookup, ResolutionError> {
        let other_page = |id: String| {
            if id == ctx.page_id {
                SourceLookup::SameAsContext
            } else {
                SourceLookup::Page(id)
            }
        };
        if let Some(owner) = reference.owner_page_id.as_deref() {
            return Ok(other_page(owner.to_string()));
        }
        match source_page(&reference.raw) {
            SourcePage::Id(id) => Ok(other_page(id)),
            SourcePage::Embedded { space, title } => {
                let pages = match self.client.find_pages_by_title(&space, &title).await {
                    Ok(pages) => pages,
                    Err(error) if error.is_auth_expired() => return Err(ResolutionError::AuthExpired(error)),
                    Err(error) => {
                        debug!(space = %space, title = %title, error = %error, "title lookup failed");
                        return Ok(SourceLookup::Failed {
                            attempted: format!("title {space}/{title}"),
                            reason: error.to_string(),
                        });
                    }
                };
                match pages.as_slice() {
                    [page] => Ok(other_page(page.id.clone())),
                    _ => {
                        debug!(space = %space, title = %title, matches = pages.len(), "source page not unique");
                        Err(ResolutionError::AmbiguousSource {
                            url: reference.raw.clone(),
                        })
                    }
                }
            }
            SourcePage::Unknown => Ok(SourceLookup::SameAsContext),
        }
    }
}

/// Outcome of working out which page owns a reference.
enum SourceLookup {
    /// A page other than the context page.
    Page(String),
    /// No other page to search.
    SameAsContext,
    /// The title lookup itself failed.
    Failed { attempted: String, reason: String },
}

#[async_trait]
impl ResolutionTier for SourcePageSearch {
    fn name(&self) -> &'static str {
        "source-page"
    }

    #[instrument(skip_all, fields(tier = "source-page", page_id = ctx.page_id, file = %reference.filename))]
    async fn attempt(
        &self,
        reference: &AssetReference,
        ctx: &ResolveContext<'_>,
    ) -> Result<TierStep, ResolutionError> {
        if !reference.kind.is_searchable() {
            return Ok(TierStep::NotApplicable);
        }
        match self.source_page_id(reference, ctx).await? {
            SourceLookup::Page(page_id) => search_page(&self.client, &page_id, reference, self.name()).await,
            SourceLookup::SameAsContext => Ok(TierStep::NotApplicable),
            SourceLookup::Failed { attempted, reason } => Ok(TierStep::try_next(attempted, reason)),
        }
    }
}

/// The default chain: direct fetch, context page, source page.
#[must_use]
pub fn default_tiers(client: &ApiClient) -> Vec<Box<dyn ResolutionTier>> {
    vec![
        Box::new(DirectFetch::new(client.clone())),
        Box::new(ContextPageSearch::new(client.clone())),
        Box::new(SourcePageSearch::new(client.clone())),
    ]
}
