//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, parser::ValueSource};

use exporter_core::client::{CONNECT_TIMEOUT_SECS, DEFAULT_MAX_ATTEMPTS, DEFAULT_RATE_LIMIT_MS, READ_TIMEOUT_SECS};
use exporter_core::export::DEFAULT_WORKERS;

/// Default retry base delay in milliseconds.
pub const DEFAULT_RETRY_BASE_MS: u64 = 3000;

/// Export Confluence page trees to local HTML with every asset downloaded.
///
/// Pages are written into nested directories mirroring the page hierarchy;
/// images and attachments land in a shared `_images/` directory at the
/// export root.
#[derive(Parser, Debug)]
#[command(name = "confluence-export")]
#[command(author, version, about)]
pub struct Args {
    /// Site name (`acme`), host (`wiki.example.com`) or base URL
    #[arg(short, long)]
    pub site: Option<String>,

    /// Root page id to export with all descendants (repeatable)
    #[arg(short, long = "page", value_name = "ID")]
    pub pages: Vec<String>,

    /// Space key whose top-level pages become export roots (repeatable)
    #[arg(long = "space", value_name = "KEY")]
    pub spaces: Vec<String>,

    /// Export root directory
    #[arg(short, long = "output", value_name = "DIR", default_value = "output")]
    pub output_dir: PathBuf,

    /// Concurrent page pipelines (1-32)
    #[arg(short, long, default_value_t = DEFAULT_WORKERS as u8, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub workers: u8,

    /// Maximum attempts per request for transient failures (1-15)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_ATTEMPTS as u8, value_parser = clap::value_parser!(u8).range(1..=15))]
    pub max_retries: u8,

    /// Base delay of the exponential retry backoff in milliseconds (max 600000)
    #[arg(long, default_value_t = DEFAULT_RETRY_BASE_MS, value_parser = clap::value_parser!(u64).range(0..=600_000))]
    pub retry_base_ms: u64,

    /// Minimum delay between requests to the site in milliseconds (0 to disable, max 60000)
    #[arg(short = 'l', long, default_value_t = DEFAULT_RATE_LIMIT_MS, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub rate_limit: u64,

    /// Netscape cookie file exported from a logged-in browser session
    #[arg(long, value_name = "FILE", conflicts_with = "token")]
    pub cookies: Option<PathBuf>,

    /// API token; a personal access token unless --user is given
    #[arg(long, env = "CONFLUENCE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Account name for basic authentication with --token
    #[arg(short, long, requires = "token")]
    pub user: Option<String>,

    /// Only resolve assets referenced in page content
    #[arg(long)]
    pub no_attachments: bool,

    /// HTTP connect timeout in seconds (1-3600)
    #[arg(long, default_value_t = CONNECT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub connect_timeout_secs: u64,

    /// HTTP read timeout in seconds (1-3600)
    #[arg(long, default_value_t = READ_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub read_timeout_secs: u64,

    /// Run report path (defaults to export-report.json in the export root)
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Config file (defaults to ~/.config/confluence-exporter/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Which overridable arguments were given explicitly on the command line.
#[derive(Debug, Clone, Copy, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct CliValueSources {
    pub output_dir: bool,
    pub workers: bool,
    pub max_retries: bool,
    pub retry_base_ms: bool,
    pub rate_limit: bool,
    pub no_attachments: bool,
    pub connect_timeout_secs: bool,
    pub read_timeout_secs: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl CliValueSources {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            output_dir: is_commandline_value(matches, "output_dir"),
            workers: is_commandline_value(matches, "workers"),
            max_retries: is_commandline_value(matches, "max_retries"),
            retry_base_ms: is_commandline_value(matches, "retry_base_ms"),
            rate_limit: is_commandline_value(matches, "rate_limit"),
            no_attachments: is_commandline_value(matches, "no_attachments"),
            connect_timeout_secs: is_commandline_value(matches, "connect_timeout_secs"),
            read_timeout_secs: is_commandline_value(matches, "read_timeout_secs"),
            verbose: is_commandline_value(matches, "verbose"),
            quiet: is_commandline_value(matches, "quiet"),
        }
    }
}

/// Parses the process arguments, exiting with clap's message on error.
pub fn parse_with_sources() -> (Args, CliValueSources) {
    let matches = Args::command().get_matches();
    let args = Args::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    (args, CliValueSources::from_matches(&matches))
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}
