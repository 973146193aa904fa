//! Asset references discovered in page content and their cache keys.

use serde::Serialize;

use super::url::{SourcePage, file_name_from_url, source_page};
use crate::client::Content;

/// What kind of asset a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// A file attached to a page (`/download/attachments/...` link or listing).
    Attachment,
    /// An attachment rendered inline as an image.
    EmbeddedImage,
    /// A site-wide emoticon or expand-control image, shared across pages.
    Emoticon,
    /// An image hosted outside the origin.
    External,
}

impl AssetKind {
    /// Whether origin credentials are sent when fetching it.
    #[must_use]
    pub fn uses_origin_credentials(self) -> bool {
        !matches!(self, Self::External)
    }

    /// Whether the attachment-listing fallbacks apply.
    #[must_use]
    pub fn is_searchable(self) -> bool {
        matches!(self, Self::Attachment | Self::EmbeddedImage)
    }
}

/// A reference to an asset as found in a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReference {
    /// The URL exactly as it appears in the markup (still entity-escaped).
    pub raw: String,
    /// Decoded file name.
    pub filename: String,
    /// Owning page parsed from the URL, when the URL names one by id.
    pub owner_page_id: Option<String>,
    /// Reference kind.
    pub kind: AssetKind,
}

impl AssetReference {
    /// Builds a reference from a URL found in markup.
    ///
    /// Returns `None` when no file name can be derived from the URL.
    #[must_use]
    pub fn from_url(raw: &str, kind: AssetKind) -> Option<Self> {
        let filename = file_name_from_url(raw)?;
        let owner_page_id = match source_page(raw) {
            SourcePage::Id(id) => Some(id),
            SourcePage::Embedded { .. } | SourcePage::Unknown => None,
        };
        Some(Self {
            raw: raw.to_string(),
            filename,
            owner_page_id,
            kind,
        })
    }

    /// Builds a reference from an attachment listing entry of `page_id`.
    #[must_use]
    pub fn from_listing(attachment: &Content, page_id: &str) -> Option<Self> {
        let download = attachment.links.download.as_deref()?;
        Some(Self {
            raw: download.to_string(),
            filename: attachment.title.clone(),
            owner_page_id: Some(page_id.to_string()),
            kind: AssetKind::Attachment,
        })
    }

    /// Cache key for this reference seen on `context_page_id`.
    ///
    /// Attachments are scoped to their owning page (or the context page as
    /// best guess), emoticons are global, externals are keyed by URL.
    #[must_use]
    pub fn key(&self, context_page_id: &str) -> AssetKey {
        match self.kind {
            AssetKind::Attachment | AssetKind::EmbeddedImage => AssetKey {
                scope: self
                    .owner_page_id
                    .clone()
                    .unwrap_or_else(|| context_page_id.to_string()),
                filename: self.filename.to_lowercase(),
            },
            AssetKind::Emoticon => AssetKey {
                scope: String::new(),
                filename: self.filename.to_lowercase(),
            },
            AssetKind::External => AssetKey {
                scope: "external".to_string(),
                filename: super::url::unescape_entities(&self.raw),
            },
        }
    }
}

/// Normalized `(owning page, file name)` cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey {
    /// Owning page id, `""` for emoticons, `"external"` for external images.
    pub scope: String,
    /// Lowercased file name (full URL for external images).
    pub filename: String,
}

impl std::fmt::Display for AssetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.scope.is_empty() {
            write!(f, "{}", self.filename)
        } else {
            write!(f, "{}/{}", self.scope, self.filename)
        }
    }
}
