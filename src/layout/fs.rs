//! Filesystem helpers: export-root bootstrap and atomic file placement.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::paths::ExportLayout;

/// Default stylesheet written to `_static/` when none exists.
pub const DEFAULT_STYLESHEET: &str = include_str!("confluence.css");

/// Stylesheet file name inside `_static/`.
pub const STYLESHEET_NAME: &str = "confluence.css";

/// Creates the export root with its `_images/` and `_static/` directories
/// and writes the default stylesheet if absent.
///
/// # Errors
///
/// Returns the I/O error of the first directory or file that cannot be created.
#[instrument(skip(layout), fields(root = %layout.root().display()))]
pub async fn bootstrap(layout: &ExportLayout) -> std::io::Result<()> {
    tokio::fs::create_dir_all(layout.images_dir()).await?;
    tokio::fs::create_dir_all(layout.static_dir()).await?;

    let stylesheet = layout.static_dir().join(STYLESHEET_NAME);
    if !tokio::fs::try_exists(&stylesheet).await? {
        write_atomic(&stylesheet, DEFAULT_STYLESHEET.as_bytes()).await?;
        debug!(path = %stylesheet.display(), "wrote default stylesheet");
    }
    Ok(())
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Writes `bytes` to `<path>.part` and renames it into place.
///
/// Parent directories are created as needed. Readers never observe a
/// half-written file at `path`.
///
/// # Errors
///
/// Returns the underlying I/O error; the `.part` file is removed on failure.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let part = part_path(path);

    let result = async {
        let mut file = tokio::fs::File::create(&part).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&part, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&part).await;
    }
    result
}
