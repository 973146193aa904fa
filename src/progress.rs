//! Progress UI (spinner) for export runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use exporter_core::export::ExportProgress;
use indicatif::{ProgressBar, ProgressStyle};

/// Spawns the spinner when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub fn spawn_progress_ui(
    use_spinner: bool,
    progress: Arc<ExportProgress>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = Arc::clone(&stop);
    let handle = tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop_signal.load(Ordering::SeqCst) {
            spinner.set_message(progress_message(&progress));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }
        spinner.finish_and_clear();
    });
    (Some(handle), stop)
}

fn progress_message(progress: &ExportProgress) -> String {
    let failed = progress.failed();
    if failed == 0 {
        format!("[{}/{}] Exporting pages...", progress.processed(), progress.queued())
    } else {
        format!(
            "[{}/{}] Exporting pages ({failed} failed)...",
            progress.processed(),
            progress.queued()
        )
    }
}
