//! Page output collaborator.
//!
//! The exporter hands every page, together with the local location of each
//! resolved asset, to a [`PageSink`]. [`HtmlPageSink`] writes a standalone
//! HTML file per page; other formats plug in behind the same trait.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use super::page::Page;
use super::report::MissingAsset;
use crate::assets::CachedAsset;
use crate::layout::{OutputPaths, STYLESHEET_NAME, write_atomic};

/// An asset reference of a page mapped to its local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    /// Reference exactly as it appears in the markup (or the listing's download link).
    pub reference: String,
    /// The stored asset.
    pub asset: CachedAsset,
    /// Path of the file relative to the page's directory.
    pub relative_path: String,
}

impl LocalAsset {
    /// Maps `reference` to `asset` as seen from a page at `paths`.
    #[must_use]
    pub fn new(reference: impl Into<String>, asset: CachedAsset, paths: &OutputPaths) -> Self {
        let relative_path = format!("{}{}", paths.images_prefix(), asset.file_name);
        Self {
            reference: reference.into(),
            asset,
            relative_path,
        }
    }
}

/// Everything the sink needs for one page.
#[derive(Debug, Clone, Copy)]
pub struct PageOutput<'a> {
    /// The fetched page.
    pub page: &'a Page,
    /// Where it goes.
    pub paths: &'a OutputPaths,
    /// Resolved references found in the body.
    pub assets: &'a [LocalAsset],
    /// Resolved page attachments.
    pub attachments: &'a [LocalAsset],
    /// References that could not be resolved.
    pub missing: &'a [MissingAsset],
}

/// Failures of the output collaborator.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The page file could not be written.
    #[error("failed to write page {page_id} to {}: {source}", .path.display())]
    Write {
        /// Page id.
        page_id: String,
        /// Target file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Receives processed pages.
#[async_trait]
pub trait PageSink: Send + Sync {
    /// File the page will be written to; used to skip pages already exported.
    fn output_file(&self, page: &Page, paths: &OutputPaths) -> PathBuf;

    /// Writes one page and returns the written file.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the page cannot be stored.
    async fn write_page(&self, output: PageOutput<'_>) -> Result<PathBuf, SinkError>;
}

/// Writes `<id>-<title>.html` files linking the shared stylesheet and images.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlPageSink;

impl HtmlPageSink {
    /// Creates the sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Renders the full HTML document.
    #[must_use]
    pub fn render(output: &PageOutput<'_>) -> String {
        let page = output.page;
        let mut html = String::with_capacity(page.body.len() + 1024);

        html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str(&format!("<title>{}</title>\n", escape_html(&page.title)));
        html.push_str(&format!(
            "<link rel=\"stylesheet\" href=\"{}{STYLESHEET_NAME}\">\n",
            output.paths.static_prefix()
        ));
        if !page.labels.is_empty() {
            html.push_str(&format!(
                "<meta name=\"labels\" content=\"{}\">\n",
                escape_html(&page.labels.join(","))
            ));
        }
        html.push_str(&format!("<meta name=\"page-id\" content=\"{}\">\n", escape_html(&page.id)));
        if let Some(parent_id) = &page.parent_id {
            html.push_str(&format!("<meta name=\"parent-id\" content=\"{}\">\n", escape_html(parent_id)));
        }
        html.push_str("</head>\n<body>\n");

        html.push_str(&format!("<h1>{}</h1>\n", escape_html(&page.title)));
        if let Some(web_url) = &page.web_url {
            html.push_str(&format!(
                "<p class=\"original-url\">Original URL: <a href=\"{0}\">{0}</a></p>\n",
                escape_html(web_url)
            ));
        }

        html.push_str(&substitute_references(&page.body, output.assets));
        html.push('\n');

        if !output.attachments.is_empty() {
            html.push_str("<div class=\"attachments\">\n<h2>Attachments</h2>\n<ul>\n");
            for attachment in output.attachments {
                html.push_str(&format!(
                    "<li><a href=\"{}\">{}</a></li>\n",
                    escape_html(&attachment.relative_path),
                    escape_html(&attachment.asset.file_name)
                ));
            }
            html.push_str("</ul>\n</div>\n");
        }
        for missing in output.missing {
            html.push_str(&format!(
                "<!-- missing asset: {} -->\n",
                missing.filename.replace("--", "- -")
            ));
        }

        html.push_str("</body>\n</html>\n");
        html
    }
}

#[async_trait]
impl PageSink for HtmlPageSink {
    fn output_file(&self, page: &Page, paths: &OutputPaths) -> PathBuf {
        paths.page_file(&page.id, &page.title, "html")
    }

    #[instrument(skip_all, fields(page_id = %output.page.id))]
    async fn write_page(&self, output: PageOutput<'_>) -> Result<PathBuf, SinkError> {
        let path = self.output_file(output.page, output.paths);
        let html = Self::render(&output);
        write_atomic(&path, html.as_bytes())
            .await
            .map_err(|source| SinkError::Write {
                page_id: output.page.id.clone(),
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), bytes = html.len(), "page written");
        Ok(path)
    }
}

/// Replaces every occurrence of each reference string with its local path.
///
/// Longer references are replaced first so a reference that is a prefix of
/// another does not clobber it.
fn substitute_references(body: &str, assets: &[LocalAsset]) -> String {
    let mut ordered: Vec<&LocalAsset> = assets.iter().collect();
    ordered.sort_by(|a, b| b.reference.len().cmp(&a.reference.len()));

    let mut out = body.to_string();
    for asset in ordered {
        if !asset.reference.is_empty() {
            out = out.replace(&asset.reference, &asset.relative_path);
        }
    }
    out
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
