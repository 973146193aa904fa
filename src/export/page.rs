//! Page model and traversal nodes.

use url::Url;

use crate::client::Content;
use crate::layout::OutputPaths;

/// A page as fetched for this run. Never written back to the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Origin-assigned id.
    pub id: String,
    /// Title.
    pub title: String,
    /// Direct parent; `None` for a page without ancestors.
    pub parent_id: Option<String>,
    /// Child page ids in origin order.
    pub children: Vec<String>,
    /// Export-view markup.
    pub body: String,
    /// Label names.
    pub labels: Vec<String>,
    /// Levels below the export root, fixed at discovery.
    pub depth: usize,
    /// Space key, when expanded.
    pub space_key: Option<String>,
    /// Version number, when expanded.
    pub version: Option<u64>,
    /// Absolute link to the page in the origin web UI.
    pub web_url: Option<String>,
}

impl Page {
    /// Builds a page from the fetched content, its children and labels.
    #[must_use]
    pub fn from_content(
        content: Content,
        children: Vec<String>,
        labels: Vec<String>,
        depth: usize,
        base_url: &Url,
    ) -> Self {
        let web_url = content
            .links
            .webui
            .as_deref()
            .map(|webui| format!("{}{webui}", base_url.as_str().trim_end_matches('/')));
        Self {
            parent_id: content.parent_id().map(str::to_string),
            body: content.export_view().to_string(),
            space_key: content.space.map(|s| s.key),
            version: content.version.map(|v| v.number),
            id: content.id,
            title: content.title,
            children,
            labels,
            depth,
            web_url,
        }
    }
}

/// A page waiting to be exported, with its location fixed by its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportNode {
    /// Page id.
    pub page_id: String,
    /// Title as listed by the parent; the fetched title wins for output names.
    pub title: Option<String>,
    /// Parent's output paths; `None` for a root.
    pub parent: Option<OutputPaths>,
    /// Parent page id; `None` for a root.
    pub parent_id: Option<String>,
    /// Levels below the export root.
    pub depth: usize,
}

impl ExportNode {
    /// A root node.
    #[must_use]
    pub fn root(page_id: impl Into<String>) -> Self {
        Self {
            page_id: page_id.into(),
            title: None,
            parent: None,
            parent_id: None,
            depth: 0,
        }
    }

    /// A child of a node whose page was fetched and placed at `paths`.
    #[must_use]
    pub fn child(parent: &Page, paths: &OutputPaths, page_id: impl Into<String>, title: Option<String>) -> Self {
        Self {
            page_id: page_id.into(),
            title,
            parent: Some(paths.clone()),
            parent_id: Some(parent.id.clone()),
            depth: paths.depth + 1,
        }
    }
}
