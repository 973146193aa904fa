//! Tree exporter: a fixed pool of workers pulling pages from a shared queue.
//!
//! # Concurrency Model
//!
//! - `workers` Tokio tasks pull [`ExportNode`]s from one [`NodeQueue`]
//! - each worker runs a page to completion (fetch, scan, resolve, write)
//!   before taking the next one
//! - children are queued as soon as their parent is fetched, carrying the
//!   parent's output paths, so depth and location are fixed at discovery
//! - the asset cache inside [`AssetResolver`] is the only other shared state
//!
//! # Failure Policy
//!
//! - a page that cannot be fetched is recorded as failed and its descendants
//!   as skipped; siblings and unrelated subtrees carry on
//! - unresolved assets make a page partial, never failed
//! - an expired session cancels the run: dispatch stops, in-flight pages
//!   finish, queued pages are reported as cancelled

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::page::{ExportNode, Page};
use super::queue::NodeQueue;
use super::report::{ExportReport, MissingAsset, PageRecord, PageStatus, SkipReason};
use super::sink::{HtmlPageSink, LocalAsset, PageOutput, PageSink};
use crate::assets::{AssetReference, AssetResolver, PageAssets, ResolutionError, scan_references};
use crate::client::{ApiClient, RequestError};
use crate::layout::{ExportLayout, OutputPaths, bootstrap};

/// Minimum worker count.
pub const MIN_WORKERS: usize = 1;

/// Maximum worker count; more only invites origin throttling.
pub const MAX_WORKERS: usize = 32;

/// Default worker count.
pub const DEFAULT_WORKERS: usize = 5;

/// Setup failures. Per-page failures are recorded in the report instead.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Worker count out of range.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkers {
        /// The rejected value.
        value: usize,
    },

    /// The export root could not be prepared.
    #[error("cannot prepare output directory {}: {source}", .path.display())]
    OutputRoot {
        /// Export root.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Listing the pages of a space failed.
    #[error("cannot list pages of space {space}: {source}")]
    SpaceListing {
        /// Space key.
        space: String,
        /// Underlying request error.
        #[source]
        source: RequestError,
    },
}

/// Knobs of one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Concurrent page pipelines.
    pub workers: usize,
    /// Also resolve every attachment listed for each page.
    pub include_attachments: bool,
    /// Rewrite pages and assets that already exist on disk.
    pub overwrite: bool,
    /// Run-level abort. Share it with the client so retry waits stop too.
    pub cancel: CancellationToken,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            include_attachments: true,
            overwrite: false,
            cancel: CancellationToken::new(),
        }
    }
}

/// Live counters for progress display.
#[derive(Debug, Default)]
pub struct ExportProgress {
    queued: AtomicUsize,
    processed: AtomicUsize,
    failed: AtomicUsize,
}

impl ExportProgress {
    /// Pages queued so far.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Pages finished (any outcome).
    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    /// Pages failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

struct Shared {
    client: ApiClient,
    layout: ExportLayout,
    resolver: AssetResolver,
    sink: Box<dyn PageSink>,
    options: ExportOptions,
    progress: Arc<ExportProgress>,
}

/// State of one `export` call.
struct Run {
    shared: Arc<Shared>,
    queue: NodeQueue,
    abort_reason: OnceLock<String>,
}

/// Exports page trees to the local file system.
///
/// # Example
///
/// ```no_run
/// use exporter_core::client::{ApiClient, ClientConfig, normalize_site};
/// use exporter_core::export::{ExportOptions, TreeExporter};
/// use exporter_core::layout::ExportLayout;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let options = ExportOptions::default();
/// let config = ClientConfig::new(normalize_site("acme")?).cancel_token(options.cancel.clone());
/// let client = ApiClient::new(config)?;
/// let exporter = TreeExporter::new(client, ExportLayout::new("output"), options)?;
/// let report = exporter.export(&["12345".to_string()]).await?;
/// println!("{}", report.summary);
/// # Ok(())
/// # }
/// ```
pub struct TreeExporter {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TreeExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeExporter")
            .field("root", &self.shared.layout.root())
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

impl TreeExporter {
    /// Creates an exporter writing HTML pages.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidWorkers`] when `options.workers` is out of range.
    pub fn new(client: ApiClient, layout: ExportLayout, options: ExportOptions) -> Result<Self, ExportError> {
        Self::with_sink(client, layout, options, Box::new(HtmlPageSink::new()))
    }

    /// Creates an exporter handing pages to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InvalidWorkers`] when `options.workers` is out of range.
    #[instrument(level = "debug", skip_all, fields(workers = options.workers))]
    pub fn with_sink(
        client: ApiClient,
        layout: ExportLayout,
        options: ExportOptions,
        sink: Box<dyn PageSink>,
    ) -> Result<Self, ExportError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&options.workers) {
            return Err(ExportError::InvalidWorkers { value: options.workers });
        }
        let resolver = AssetResolver::new(&client, layout.clone()).overwrite(options.overwrite);
        debug!(
            include_attachments = options.include_attachments,
            overwrite = options.overwrite,
            "creating tree exporter"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                client,
                layout,
                resolver,
                sink,
                options,
                progress: Arc::new(ExportProgress::default()),
            }),
        })
    }

    /// Live progress counters.
    #[must_use]
    pub fn progress(&self) -> Arc<ExportProgress> {
        Arc::clone(&self.shared.progress)
    }

    /// Ids of the pages of `space_key` that have no ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::SpaceListing`] when the listing fails.
    #[instrument(skip(self))]
    pub async fn space_root_ids(&self, space_key: &str) -> Result<Vec<String>, ExportError> {
        let pages = self
            .shared
            .client
            .list_space_pages(space_key)
            .await
            .map_err(|source| ExportError::SpaceListing {
                space: space_key.to_string(),
                source,
            })?;
        let roots: Vec<String> = pages
            .into_iter()
            .filter(|p| p.ancestors.is_empty())
            .map(|p| p.id)
            .collect();
        info!(count = roots.len(), "space roots found");
        Ok(roots)
    }

    /// Exports the trees rooted at `root_ids`.
    ///
    /// Individual page failures never fail the call; they end up in the
    /// returned report. Assets resolved by an earlier call on the same
    /// exporter are reused.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::OutputRoot`] when the export root cannot be created.
    #[instrument(skip_all, fields(roots = root_ids.len(), workers = self.shared.options.workers))]
    pub async fn export(&self, root_ids: &[String]) -> Result<ExportReport, ExportError> {
        let shared = &self.shared;
        bootstrap(&shared.layout).await.map_err(|source| ExportError::OutputRoot {
            path: shared.layout.root().to_path_buf(),
            source,
        })?;

        let run = Arc::new(Run {
            shared: Arc::clone(shared),
            queue: NodeQueue::new(),
            abort_reason: OnceLock::new(),
        });
        for id in root_ids {
            if run.queue.push(ExportNode::root(id.clone())) {
                shared.progress.queued.fetch_add(1, Ordering::SeqCst);
            }
        }
        run.queue.close_if_idle();
        info!("export started");

        let mut handles = Vec::with_capacity(shared.options.workers);
        for worker_id in 0..shared.options.workers {
            let run = Arc::clone(&run);
            handles.push(tokio::spawn(async move { run_worker(&run, worker_id).await }));
        }

        let mut report = ExportReport::default();
        for handle in handles {
            match handle.await {
                Ok(records) => records.into_iter().for_each(|r| report.push(r)),
                Err(e) => warn!(error = %e, "export worker panicked"),
            }
        }

        for node in run.queue.drain_remaining().await {
            let mut record = PageRecord::new(&node.page_id, node.depth, PageStatus::Skipped(SkipReason::Cancelled));
            record.title = node.title;
            record.parent_id = node.parent_id;
            report.push(record);
        }

        let cache = shared.resolver.cache_stats();
        let requests = shared.client.stats();
        report.assets_fetched = cache.resolutions;
        report.cache_hits = cache.hits;
        report.requests = requests.requests;
        report.retries = requests.retries;
        report.aborted = run.abort_reason.get().cloned().or_else(|| {
            shared
                .options
                .cancel
                .is_cancelled()
                .then(|| "interrupted".to_string())
        });

        info!(
            summary = %report.summary,
            assets = report.assets_fetched,
            cache_hits = report.cache_hits,
            retries = report.retries,
            "export finished"
        );
        Ok(report)
    }
}

async fn run_worker(run: &Run, worker_id: usize) -> Vec<PageRecord> {
    let mut records = Vec::new();
    while let Some(node) = run.queue.next(&run.shared.options.cancel).await {
        debug!(worker_id, page_id = %node.page_id, depth = node.depth, "processing page");
        let page_records = process_node(run, node).await;
        for record in &page_records {
            if record.status == PageStatus::Failed {
                run.shared.progress.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
        run.shared.progress.processed.fetch_add(page_records.len(), Ordering::SeqCst);
        records.extend(page_records);
        run.queue.complete();
    }
    debug!(worker_id, "worker finished");
    records
}

fn abort_run(run: &Run, reason: String) {
    if run.abort_reason.set(reason.clone()).is_ok() {
        warn!(reason = %reason, "aborting export");
    }
    run.shared.options.cancel.cancel();
}

/// Runs one page; returns its record plus records of skipped descendants.
#[instrument(skip_all, fields(page_id = %node.page_id, depth = node.depth))]
async fn process_node(run: &Run, node: ExportNode) -> Vec<PageRecord> {
    let mut record = PageRecord::new(&node.page_id, node.depth, PageStatus::Failed);
    record.title.clone_from(&node.title);
    record.parent_id.clone_from(&node.parent_id);

    let page = match fetch_page(run, &node).await {
        Ok(page) => page,
        Err(error) => return page_failed(run, record, &node, error).await,
    };
    record.title = Some(page.title.clone());

    let paths = run.shared.layout.allocate(node.parent.as_ref(), &page.id, &page.title);
    debug_assert_eq!(paths.depth, node.depth);

    let output_file = run.shared.sink.output_file(&page, &paths);
    if !run.shared.options.overwrite && tokio::fs::try_exists(&output_file).await.unwrap_or(false) {
        debug!(path = %output_file.display(), "page already exported");
        record.status = PageStatus::Skipped(SkipReason::AlreadyExported);
        record.output = Some(output_file);
        return vec![record];
    }

    let resolution = PageAssets::new(&page.id, page.space_key.as_deref());
    let mut assets = Vec::new();
    let mut missing = Vec::new();
    for reference in scan_references(&page.body) {
        resolve_into(run, &reference, &resolution, &paths, &mut assets, &mut missing).await;
    }

    let mut attachments = Vec::new();
    if run.shared.options.include_attachments {
        match run.shared.client.list_attachments(&page.id).await {
            Ok(listed) => {
                for attachment in &listed {
                    let Some(reference) = AssetReference::from_listing(attachment, &page.id) else {
                        continue;
                    };
                    resolve_into(run, &reference, &resolution, &paths, &mut attachments, &mut missing).await;
                }
            }
            Err(error) => {
                if error.is_auth_expired() {
                    abort_run(run, error.to_string());
                }
                warn!(error = %error, "attachment listing failed");
                missing.push(MissingAsset {
                    filename: "(attachment listing)".to_string(),
                    reference: format!("/rest/api/content/{}/child/attachment", page.id),
                    error: error.to_string(),
                });
            }
        }
    }

    let output = PageOutput {
        page: &page,
        paths: &paths,
        assets: &assets,
        attachments: &attachments,
        missing: &missing,
    };
    record.assets = assets.len() + attachments.len();
    match run.shared.sink.write_page(output).await {
        Ok(path) => {
            record.status = if missing.is_empty() {
                PageStatus::Exported
            } else {
                PageStatus::Partial
            };
            info!(path = %path.display(), assets = record.assets, missing = missing.len(), "page exported");
            record.output = Some(path);
        }
        Err(error) => {
            warn!(error = %error, "page output failed");
            record.error = Some(error.to_string());
        }
    }
    record.missing_assets = missing;
    vec![record]
}

/// Fetches page, children and labels, and queues the children.
async fn fetch_page(run: &Run, node: &ExportNode) -> Result<Page, RequestError> {
    let content = run.shared.client.get_page(&node.page_id).await?;
    let children = run.shared.client.list_children(&node.page_id).await?;
    let labels = match run.shared.client.list_labels(&node.page_id).await {
        Ok(labels) => labels,
        Err(error) if error.is_auth_expired() => return Err(error),
        Err(error) => {
            warn!(error = %error, "label listing failed");
            Vec::new()
        }
    };

    let page = Page::from_content(
        content,
        children.iter().map(|c| c.id.clone()).collect(),
        labels,
        node.depth,
        run.shared.client.base_url(),
    );
    let paths = run.shared.layout.allocate(node.parent.as_ref(), &page.id, &page.title);
    for child in children {
        let title = (!child.title.is_empty()).then_some(child.title);
        if run.queue.push(ExportNode::child(&page, &paths, child.id, title)) {
            run.shared.progress.queued.fetch_add(1, Ordering::SeqCst);
        }
    }
    Ok(page)
}

async fn resolve_into(
    run: &Run,
    reference: &AssetReference,
    page: &PageAssets<'_>,
    paths: &OutputPaths,
    resolved: &mut Vec<LocalAsset>,
    missing: &mut Vec<MissingAsset>,
) {
    match run.shared.resolver.resolve(reference, page).await {
        Ok(asset) => resolved.push(LocalAsset::new(&reference.raw, asset, paths)),
        Err(error) => {
            if let ResolutionError::AuthExpired(cause) = &error {
                abort_run(run, cause.to_string());
            }
            warn!(file = %reference.filename, error = %error, "asset unresolved");
            missing.push(MissingAsset {
                filename: reference.filename.clone(),
                reference: reference.raw.clone(),
                error: error.to_string(),
            });
        }
    }
}

/// Records a page whose fetch failed and skips everything below it.
async fn page_failed(run: &Run, mut record: PageRecord, node: &ExportNode, error: RequestError) -> Vec<PageRecord> {
    if matches!(error, RequestError::Cancelled { .. }) {
        record.status = PageStatus::Skipped(SkipReason::Cancelled);
        return vec![record];
    }
    if error.is_auth_expired() {
        abort_run(run, error.to_string());
    }
    warn!(error = %error, "page fetch failed");
    record.error = Some(error.to_string());

    let mut records = vec![record];
    records.extend(skip_descendants(run, node).await);
    records
}

/// Best-effort walk of the subtree below a failed page, recording each
/// descendant as skipped. Stops quietly where a listing fails.
async fn skip_descendants(run: &Run, failed: &ExportNode) -> Vec<PageRecord> {
    let mut records = Vec::new();
    let mut pending = vec![(failed.page_id.clone(), failed.depth)];
    while let Some((parent_id, depth)) = pending.pop() {
        if run.shared.options.cancel.is_cancelled() {
            break;
        }
        let children = match run.shared.client.list_children(&parent_id).await {
            Ok(children) => children,
            Err(error) => {
                debug!(parent_id = %parent_id, error = %error, "cannot list children of skipped subtree");
                continue;
            }
        };
        for child in children {
            if !run.queue.mark_seen(&child.id) {
                continue;
            }
            let mut record = PageRecord::new(
                &child.id,
                depth + 1,
                PageStatus::Skipped(SkipReason::AncestorFailed {
                    ancestor_id: failed.page_id.clone(),
                }),
            );
            record.title = Some(child.title.clone());
            record.parent_id = Some(parent_id.clone());
            records.push(record);
            pending.push((child.id, depth + 1));
        }
    }
    if !records.is_empty() {
        info!(skipped = records.len(), "subtree skipped after page failure");
    }
    records
}
