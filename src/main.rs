//! CLI entry point for the Confluence exporter.

use std::io::{self, IsTerminal};
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use exporter_core::auth::{Credentials, SecretToken, load_cookie_file};
use exporter_core::export::REPORT_FILE_NAME;
use exporter_core::{
    ApiClient, ClientConfig, ExportLayout, ExportOptions, RetryPolicy, TreeExporter, normalize_site,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

mod app_config;
mod cli;
mod progress;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let (args, sources) = cli::parse_with_sources();
    let loaded = app_config::load_config(args.config.as_deref())?;
    let args = match &loaded.config {
        Some(file_config) => file_config.apply_to(args, &sources),
        None => args,
    };

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(
        config = ?loaded.path,
        from_file = loaded.config.is_some(),
        "configuration resolved"
    );

    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let Some(site) = args.site.as_deref() else {
        bail!("No site given. Pass --site or set `site` in the config file");
    };
    if args.pages.is_empty() && args.spaces.is_empty() {
        bail!("Nothing to export. Pass --page <ID> and/or --space <KEY>");
    }

    let base_url = normalize_site(site).with_context(|| format!("Invalid site '{site}'"))?;
    let credentials = build_credentials(&args, &base_url)?;
    info!(site = %base_url, auth = credentials.kind(), "Confluence exporter starting");

    let cancel = CancellationToken::new();
    let retry_policy = RetryPolicy::with_max_attempts(u32::from(args.max_retries))
        .base_delay(Duration::from_millis(args.retry_base_ms));
    if args.rate_limit == 0 {
        debug!("rate limiting disabled");
    } else {
        debug!(rate_limit_ms = args.rate_limit, "rate limiting enabled");
    }
    let config = ClientConfig::new(base_url.clone())
        .credentials(credentials)
        .retry_policy(retry_policy)
        .rate_limit(Duration::from_millis(args.rate_limit))
        .timeouts(
            Duration::from_secs(args.connect_timeout_secs),
            Duration::from_secs(args.read_timeout_secs),
        )
        .cancel_token(cancel.clone());
    let client = ApiClient::new(config).context("Failed to build HTTP client")?;

    client.probe_auth().await.with_context(|| {
        format!("Authentication against {base_url} failed. Check --token, --user or --cookies")
    })?;
    debug!("authentication probe succeeded");

    let options = ExportOptions {
        workers: usize::from(args.workers),
        include_attachments: !args.no_attachments,
        overwrite: false,
        cancel: cancel.clone(),
    };
    let exporter = TreeExporter::new(client, ExportLayout::new(&args.output_dir), options)?;

    let mut roots = args.pages.clone();
    for space in &args.spaces {
        let ids = exporter
            .space_root_ids(space)
            .await
            .with_context(|| format!("Failed to list pages of space '{space}'"))?;
        info!(space = %space, roots = ids.len(), "space listed");
        roots.extend(ids);
    }

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight pages");
            interrupt.cancel();
        }
    });

    let use_spinner = io::stderr().is_terminal() && !args.quiet;
    let (progress_handle, progress_stop) = progress::spawn_progress_ui(use_spinner, exporter.progress());

    let result = exporter.export(&roots).await;

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }
    let report = result?;

    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| args.output_dir.join(REPORT_FILE_NAME));
    report
        .write_json(&report_path)
        .await
        .with_context(|| format!("Failed to write report '{}'", report_path.display()))?;

    info!(
        exported = report.summary.exported,
        partial = report.summary.partial,
        failed = report.summary.failed,
        skipped = report.summary.skipped,
        assets = report.assets_fetched,
        cache_hits = report.cache_hits,
        retries = report.retries,
        report = %report_path.display(),
        "Export complete"
    );
    if !args.quiet {
        println!("{}", report.summary);
    }

    if let Some(reason) = &report.aborted {
        bail!("Export aborted: {reason}");
    }
    if !report.is_success() {
        bail!("{} page(s) failed; see {}", report.summary.failed, report_path.display());
    }
    Ok(())
}

/// Cookie file, then token (bearer, or basic with --user), else anonymous.
fn build_credentials(args: &Args, base_url: &Url) -> Result<Credentials> {
    if let Some(path) = &args.cookies {
        let host = base_url.host_str().unwrap_or_default();
        let jar = load_cookie_file(path, host)
            .with_context(|| format!("Failed to load cookie file '{}'", path.display()))?;
        return Ok(Credentials::CookieJar(jar));
    }

    if let Some(token) = &args.token {
        let token = SecretToken::new(token.as_str());
        if token.is_blank() {
            bail!("--token is empty");
        }
        return Ok(Credentials::from_user_token(args.user.as_deref(), token));
    }

    warn!("no credentials given, requests are anonymous");
    Ok(Credentials::Anonymous)
}
