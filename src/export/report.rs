//! Per-run export report.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::layout::write_atomic;

/// File name of the report at the export root.
pub const REPORT_FILE_NAME: &str = "export-report.json";

/// Why a page was not exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    /// An ancestor could not be fetched, so no path can be allocated.
    AncestorFailed {
        /// The page whose fetch failed.
        ancestor_id: String,
    },
    /// The run was aborted before the page was processed.
    Cancelled,
    /// The output file already existed.
    AlreadyExported,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AncestorFailed { ancestor_id } => write!(f, "ancestor {ancestor_id} failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::AlreadyExported => write!(f, "already exported"),
        }
    }
}

/// Outcome of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Written with every asset resolved.
    Exported,
    /// Written, but some assets are missing.
    Partial,
    /// Fetching or writing the page failed.
    Failed,
    /// Not processed.
    Skipped(SkipReason),
}

impl PageStatus {
    /// Short label for logs and summaries.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exported => "exported",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Skipped(_) => "skipped",
        }
    }
}

/// An asset that could not be resolved for a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingAsset {
    /// File name that was looked for.
    pub filename: String,
    /// Reference as found in the page.
    pub reference: String,
    /// Resolution error text.
    pub error: String,
}

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRecord {
    /// Page id.
    pub page_id: String,
    /// Title, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Parent id, `None` for roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Levels below the export root.
    pub depth: usize,
    /// Outcome.
    pub status: PageStatus,
    /// Written page file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Assets resolved for the page (references and listed attachments).
    pub assets: usize,
    /// Assets that could not be resolved.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_assets: Vec<MissingAsset>,
    /// Failure text for failed pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageRecord {
    /// A record with no outcome details yet.
    #[must_use]
    pub fn new(page_id: impl Into<String>, depth: usize, status: PageStatus) -> Self {
        Self {
            page_id: page_id.into(),
            title: None,
            parent_id: None,
            depth,
            status,
            output: None,
            assets: 0,
            missing_assets: Vec::new(),
            error: None,
        }
    }
}

/// Counts per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    /// Fully exported pages.
    pub exported: usize,
    /// Pages written with missing assets.
    pub partial: usize,
    /// Failed pages.
    pub failed: usize,
    /// Skipped pages.
    pub skipped: usize,
}

impl std::fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} exported, {} partial, {} failed, {} skipped",
            self.exported, self.partial, self.failed, self.skipped
        )
    }
}

/// Everything a run produced, in no particular page order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    /// Outcome counts.
    pub summary: ReportSummary,
    /// One record per page seen.
    pub pages: Vec<PageRecord>,
    /// Assets fetched from the origin or external hosts.
    pub assets_fetched: u64,
    /// Asset lookups answered by the run cache.
    pub cache_hits: u64,
    /// HTTP requests sent, retries included.
    pub requests: u64,
    /// Retries scheduled.
    pub retries: u64,
    /// Why the run stopped early, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl ExportReport {
    /// Appends a record and updates the summary.
    pub fn push(&mut self, record: PageRecord) {
        match record.status {
            PageStatus::Exported => self.summary.exported += 1,
            PageStatus::Partial => self.summary.partial += 1,
            PageStatus::Failed => self.summary.failed += 1,
            PageStatus::Skipped(_) => self.summary.skipped += 1,
        }
        self.pages.push(record);
    }

    /// The record of `page_id`.
    #[must_use]
    pub fn page(&self, page_id: &str) -> Option<&PageRecord> {
        self.pages.iter().find(|p| p.page_id == page_id)
    }

    /// True when no page failed and the run was not aborted.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.summary.failed == 0 && self.aborted.is_none()
    }

    /// Writes the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when the file cannot be written.
    pub async fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        write_atomic(path, &json).await
    }
}
