//! Tree exporter.
//!
//! Walks page trees from one or more roots with a bounded worker pool,
//! resolves every asset through the shared [`AssetResolver`](crate::assets::AssetResolver),
//! and hands each page to a [`PageSink`].
//!
//! - [`TreeExporter`] - runs an export and returns an [`ExportReport`]
//! - [`NodeQueue`] - deduplicating work queue with drain detection
//! - [`PageSink`] / [`HtmlPageSink`] - page output collaborator

mod engine;
mod page;
mod queue;
mod report;
mod sink;

pub use engine::{
    DEFAULT_WORKERS, ExportError, ExportOptions, ExportProgress, MAX_WORKERS, MIN_WORKERS, TreeExporter,
};
pub use page::{ExportNode, Page};
pub use queue::NodeQueue;
pub use report::{
    ExportReport, MissingAsset, PageRecord, PageStatus, REPORT_FILE_NAME, ReportSummary, SkipReason,
};
pub use sink::{HtmlPageSink, LocalAsset, PageOutput, PageSink, SinkError};
