//! Output path allocation.
//!
//! Every page directory nests under its parent's directory and reaches the
//! shared `_images/` and `_static/` directories at the export root through a
//! `../` prefix repeated once per level. Paths are pure functions of the
//! parent's paths and the page's own id and title, so workers never need to
//! coordinate to allocate them.

use std::path::{Path, PathBuf};

use super::sanitize::sanitize_title;

/// Shared images/attachments directory at the export root.
pub const IMAGES_DIR: &str = "_images";

/// Shared stylesheet directory at the export root.
pub const STATIC_DIR: &str = "_static";

/// Where a page's output goes and how it reaches the shared asset directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// Directory holding the page file and its child page directories.
    pub page_dir: PathBuf,
    /// Levels below the export root.
    pub depth: usize,
    /// `../` repeated `depth` times.
    pub asset_prefix: String,
}

impl OutputPaths {
    /// Relative prefix of the shared images directory, e.g. `../_images/`.
    #[must_use]
    pub fn images_prefix(&self) -> String {
        format!("{}{IMAGES_DIR}/", self.asset_prefix)
    }

    /// Relative prefix of the shared static directory, e.g. `../_static/`.
    #[must_use]
    pub fn static_prefix(&self) -> String {
        format!("{}{STATIC_DIR}/", self.asset_prefix)
    }

    /// Page output file `<id>-<title>.<extension>` inside `page_dir`.
    #[must_use]
    pub fn page_file(&self, page_id: &str, title: &str, extension: &str) -> PathBuf {
        self.page_dir
            .join(format!("{}.{extension}", page_stem(page_id, title)))
    }

    /// Paths for a child page one level below this one.
    #[must_use]
    pub fn child(&self, page_id: &str, title: &str) -> Self {
        let depth = self.depth + 1;
        Self {
            page_dir: self.page_dir.join(page_stem(page_id, title)),
            depth,
            asset_prefix: relative_prefix(depth),
        }
    }
}

/// The export root and its shared directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLayout {
    root: PathBuf,
}

impl ExportLayout {
    /// Creates a layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The export root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The shared images directory.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    /// The shared static directory.
    #[must_use]
    pub fn static_dir(&self) -> PathBuf {
        self.root.join(STATIC_DIR)
    }

    /// Paths for an export root page (depth 0, written at the export root).
    #[must_use]
    pub fn root_paths(&self) -> OutputPaths {
        OutputPaths {
            page_dir: self.root.clone(),
            depth: 0,
            asset_prefix: String::new(),
        }
    }

    /// Allocates paths for a page discovered under `parent`.
    ///
    /// `None` means the page is an export root.
    #[must_use]
    pub fn allocate(&self, parent: Option<&OutputPaths>, page_id: &str, title: &str) -> OutputPaths {
        match parent {
            Some(parent) => parent.child(page_id, title),
            None => self.root_paths(),
        }
    }
}

/// `../` repeated `depth` times.
#[must_use]
pub fn relative_prefix(depth: usize) -> String {
    "../".repeat(depth)
}

fn page_stem(page_id: &str, title: &str) -> String {
    format!("{}-{}", sanitize_title(page_id), sanitize_title(title))
}
