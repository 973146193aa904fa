//! Discovery of asset references in exported page markup.
//!
//! This is a scanner, not a rewriter: it only reports which URLs the markup
//! mentions. Substituting local paths is left to the page sink.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use super::reference::{AssetKind, AssetReference};

#[allow(clippy::expect_used)]
static IMG_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("img tag regex is valid"));

#[allow(clippy::expect_used)]
static ANCHOR_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b[^>]*>").expect("anchor tag regex is valid"));

#[allow(clippy::expect_used)]
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\s([a-z][a-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute regex is valid")
});

const ATTACHMENT_PATH: &str = "/download/attachments/";

struct Tag<'a> {
    attributes: Vec<(String, &'a str)>,
}

impl<'a> Tag<'a> {
    fn parse(tag: &'a str) -> Self {
        let attributes = ATTRIBUTE
            .captures_iter(tag)
            .filter_map(|c| {
                let name = c.get(1)?.as_str().to_ascii_lowercase();
                let value = c.get(2).or_else(|| c.get(3))?.as_str();
                Some((name, value))
            })
            .collect();
        Self { attributes }
    }

    fn get(&self, name: &str) -> Option<&'a str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .filter(|v| !v.trim().is_empty())
    }

    fn has_class(&self, needle: &str) -> bool {
        self.get("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c.contains(needle)))
    }
}

fn classify_image(tag: &Tag<'_>, src: &str) -> Option<AssetKind> {
    if tag.has_class("confluence-external-resource") {
        Some(AssetKind::External)
    } else if tag.has_class("emoticon") || tag.has_class("expand-control-image") {
        Some(AssetKind::Emoticon)
    } else if tag.has_class("confluence-embedded-image") || src.contains(ATTACHMENT_PATH) {
        Some(AssetKind::EmbeddedImage)
    } else {
        None
    }
}

/// Finds every asset reference in a page body, in order of first appearance.
///
/// Recognized references:
/// - `<img class="confluence-embedded-image">` and any image under
///   `/download/attachments/`
/// - `<img class="confluence-external-resource">` (external images)
/// - `<img class="emoticon">` and expand-control images
/// - `<a href="/download/attachments/...">` links
///
/// Each distinct URL is reported once.
///
/// # Examples
///
/// ```
/// use exporter_core::assets::{AssetKind, scan_references};
///
/// let html = r#"<p><img class="confluence-embedded-image" src="/download/attachments/7/a.png"></p>"#;
/// let refs = scan_references(html);
/// assert_eq!(refs.len(), 1);
/// assert_eq!(refs[0].kind, AssetKind::EmbeddedImage);
/// assert_eq!(refs[0].owner_page_id.as_deref(), Some("7"));
/// ```
#[must_use]
pub fn scan_references(html: &str) -> Vec<AssetReference> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    let images = IMG_TAG.find_iter(html).map(|m| (m.start(), m.as_str(), true));
    let anchors = ANCHOR_TAG.find_iter(html).map(|m| (m.start(), m.as_str(), false));
    let mut tags: Vec<_> = images.chain(anchors).collect();
    tags.sort_by_key(|(start, _, _)| *start);

    for (_, raw_tag, is_image) in tags {
        let tag = Tag::parse(raw_tag);
        let reference = if is_image {
            tag.get("src").and_then(|src| {
                let kind = classify_image(&tag, src)?;
                let mut reference = AssetReference::from_url(src, kind)?;
                if kind == AssetKind::EmbeddedImage {
                    if let Some(alias) = tag.get("data-linked-resource-default-alias") {
                        reference.filename = super::url::unescape_entities(alias);
                    }
                    if reference.owner_page_id.is_none() {
                        reference.owner_page_id = tag
                            .get("data-linked-resource-container-id")
                            .filter(|id| id.chars().all(|c| c.is_ascii_digit()))
                            .map(str::to_string);
                    }
                }
                Some(reference)
            })
        } else {
            tag.get("href")
                .filter(|href| href.contains(ATTACHMENT_PATH))
                .and_then(|href| AssetReference::from_url(href, AssetKind::Attachment))
        };

        if let Some(reference) = reference
            && seen.insert(reference.raw.clone())
        {
            trace!(raw = %reference.raw, kind = ?reference.kind, "found asset reference");
            found.push(reference);
        }
    }

    found
}
