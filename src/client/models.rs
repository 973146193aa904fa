//! Serde models for the origin REST API documents.
//!
//! Only the fields the exporter reads are modelled; everything else in the
//! responses is ignored.

use serde::{Deserialize, Serialize};

/// One page of a paginated list response.
#[derive(Debug, Clone, Deserialize)]
pub struct PagedResult<T> {
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    /// Offset of the first item.
    #[serde(default)]
    pub start: u64,
    /// Requested page size.
    #[serde(default)]
    pub limit: u64,
    /// Number of items actually returned.
    #[serde(default)]
    pub size: Option<u64>,
    /// Navigation links.
    #[serde(rename = "_links", default)]
    pub links: Links,
}

impl<T> PagedResult<T> {
    /// Number of items on this page, preferring the server's `size` field.
    #[must_use]
    pub fn returned(&self) -> u64 {
        self.size.unwrap_or(self.results.len() as u64)
    }

    /// Whether the server advertises another page.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.links.next.as_deref().is_some_and(|next| !next.is_empty())
    }
}

/// `_links` object found on most documents.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Links {
    /// Relative link to the next result page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Site base including context path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Relative web UI link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webui: Option<String>,
    /// Relative download link (attachments only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<String>,
}

/// A content item: page or attachment.
#[derive(Debug, Clone, Deserialize)]
pub struct Content {
    /// Origin-assigned id.
    pub id: String,
    /// `page`, `attachment`, ...
    #[serde(rename = "type", default)]
    pub content_type: String,
    /// Page title or attachment file name.
    #[serde(default)]
    pub title: String,
    /// Owning space, when expanded.
    #[serde(default)]
    pub space: Option<SpaceRef>,
    /// Ancestor chain root-first, when expanded.
    #[serde(default)]
    pub ancestors: Vec<ContentRef>,
    /// Body representations, when expanded.
    #[serde(default)]
    pub body: Option<Body>,
    /// Version info, when expanded.
    #[serde(default)]
    pub version: Option<Version>,
    /// Attachment metadata.
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// Attachment extensions (media type, size).
    #[serde(default)]
    pub extensions: Option<Extensions>,
    /// Links.
    #[serde(rename = "_links", default)]
    pub links: Links,
}

impl Content {
    /// The rendered export view of the body, or an empty string.
    #[must_use]
    pub fn export_view(&self) -> &str {
        self.body
            .as_ref()
            .and_then(|b| b.export_view.as_ref())
            .map_or("", |v| v.value.as_str())
    }

    /// Id of the direct parent (last ancestor).
    #[must_use]
    pub fn parent_id(&self) -> Option<&str> {
        self.ancestors.last().map(|a| a.id.as_str())
    }

    /// Attachment media type from `extensions` or `metadata`.
    #[must_use]
    pub fn media_type(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|e| e.media_type.as_deref())
            .or_else(|| self.metadata.as_ref().and_then(|m| m.media_type.as_deref()))
    }
}

/// Minimal reference to another content item.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ContentRef {
    /// Id.
    pub id: String,
    /// Title.
    #[serde(default)]
    pub title: String,
}

/// Minimal reference to a space.
#[derive(Debug, Clone, Deserialize)]
pub struct SpaceRef {
    /// Space key.
    pub key: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// Body container.
#[derive(Debug, Clone, Deserialize)]
pub struct Body {
    /// Rendered HTML suitable for export.
    #[serde(default)]
    pub export_view: Option<BodyValue>,
}

/// A single body representation.
#[derive(Debug, Clone, Deserialize)]
pub struct BodyValue {
    /// Markup.
    #[serde(default)]
    pub value: String,
}

/// Version info.
#[derive(Debug, Clone, Deserialize)]
pub struct Version {
    /// Version number.
    pub number: u64,
}

/// Attachment metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    /// Declared media type.
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
}

/// Attachment extensions.
#[derive(Debug, Clone, Deserialize)]
pub struct Extensions {
    /// Declared media type.
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    /// File size in bytes.
    #[serde(rename = "fileSize", default)]
    pub file_size: Option<u64>,
}

/// A page label.
#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// `global`, `my`, ...
    #[serde(default)]
    pub prefix: String,
}

/// A space.
#[derive(Debug, Clone, Deserialize)]
pub struct Space {
    /// Space key.
    pub key: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Homepage, when expanded.
    #[serde(default)]
    pub homepage: Option<ContentRef>,
}
