//! Configuration file loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::cli::{Args, CliValueSources};

const CONFIG_DIR_NAME: &str = "confluence-exporter";
const CONFIG_FILE_NAME: &str = "config.toml";

/// `key = value` file configuration for exporter defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Site name, host or base URL.
    pub site: Option<String>,
    /// Default export root.
    pub output_dir: Option<PathBuf>,
    /// Concurrent page pipelines (same range as CLI).
    pub workers: Option<u8>,
    /// Maximum attempts per request.
    pub max_retries: Option<u8>,
    /// Retry backoff base in milliseconds.
    pub retry_base_ms: Option<u64>,
    /// Minimum request spacing in milliseconds.
    pub rate_limit: Option<u64>,
    /// Netscape cookie file.
    pub cookies: Option<PathBuf>,
    /// Resolve every listed attachment, not only referenced ones.
    pub include_attachments: Option<bool>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against the CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(workers) = self.workers
            && !(1..=32).contains(&workers)
        {
            bail!("Invalid config value for `workers`: {workers}. Expected range: 1..=32");
        }

        if let Some(max_retries) = self.max_retries
            && !(1..=15).contains(&max_retries)
        {
            bail!("Invalid config value for `max_retries`: {max_retries}. Expected range: 1..=15");
        }

        if let Some(retry_base_ms) = self.retry_base_ms
            && retry_base_ms > 600_000
        {
            bail!("Invalid config value for `retry_base_ms`: {retry_base_ms}. Expected range: 0..=600000");
        }

        if let Some(rate_limit) = self.rate_limit
            && rate_limit > 60_000
        {
            bail!("Invalid config value for `rate_limit`: {rate_limit}. Expected range: 0..=60000");
        }

        if let Some(site) = &self.site
            && site.trim().is_empty()
        {
            bail!("Invalid config value for `site`: must not be empty");
        }

        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }

    /// Fills every argument not given on the command line from this file.
    #[must_use]
    pub fn apply_to(&self, mut args: Args, sources: &CliValueSources) -> Args {
        if args.site.is_none() {
            args.site.clone_from(&self.site);
        }
        if args.cookies.is_none() && args.token.is_none() {
            args.cookies.clone_from(&self.cookies);
        }

        if !sources.output_dir
            && let Some(output_dir) = &self.output_dir
        {
            args.output_dir.clone_from(output_dir);
        }
        if !sources.workers
            && let Some(workers) = self.workers
        {
            args.workers = workers;
        }
        if !sources.max_retries
            && let Some(max_retries) = self.max_retries
        {
            args.max_retries = max_retries;
        }
        if !sources.retry_base_ms
            && let Some(retry_base_ms) = self.retry_base_ms
        {
            args.retry_base_ms = retry_base_ms;
        }
        if !sources.rate_limit
            && let Some(rate_limit) = self.rate_limit
        {
            args.rate_limit = rate_limit;
        }
        if !sources.no_attachments
            && let Some(include_attachments) = self.include_attachments
        {
            args.no_attachments = !include_attachments;
        }
        if !sources.connect_timeout_secs
            && let Some(secs) = self.connect_timeout_secs
        {
            args.connect_timeout_secs = secs;
        }
        if !sources.read_timeout_secs
            && let Some(secs) = self.read_timeout_secs
        {
            args.read_timeout_secs = secs;
        }
        if !sources.verbose
            && !sources.quiet
            && let Some(verbosity) = self.verbosity
        {
            match verbosity {
                VerbositySetting::Default => {}
                VerbositySetting::Verbose => args.verbose = 1,
                VerbositySetting::Debug => args.verbose = 2,
                VerbositySetting::Quiet => args.quiet = true,
            }
        }
        args
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Verbose => "verbose",
            Self::Quiet => "quiet",
            Self::Debug => "debug",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Config path that was looked at, if any.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/confluence-exporter/config.toml`
/// 2. `$HOME/.config/confluence-exporter/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the explicit config file, or the default one if present.
///
/// An explicit path that does not exist is an error; a missing default file is not.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = load_file_config(path)?;
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: Some(config),
        });
    }

    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_number = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_number}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "site" => cfg.site = Some(parse_string_literal(value).with_context(invalid)?),
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(parse_string_literal(value).with_context(invalid)?));
            }
            "workers" => cfg.workers = Some(parse_integer_u8(value).with_context(invalid)?),
            "max_retries" => cfg.max_retries = Some(parse_integer_u8(value).with_context(invalid)?),
            "retry_base_ms" => cfg.retry_base_ms = Some(parse_integer_u64(value).with_context(invalid)?),
            "rate_limit" => cfg.rate_limit = Some(parse_integer_u64(value).with_context(invalid)?),
            "cookies" => {
                cfg.cookies = Some(PathBuf::from(parse_string_literal(value).with_context(invalid)?));
            }
            "include_attachments" => {
                cfg.include_attachments = Some(parse_boolean(value).with_context(invalid)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_number}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use clap::Parser;
    use tempfile::TempDir;

    use super::*;

    // ==================== Parsing ====================

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
site = "acme"
workers = 8
verbosity = "verbose"
"#,
        )
        .expect("partial config should parse");
        assert_eq!(cfg.site.as_deref(), Some("acme"));
        assert_eq!(cfg.workers, Some(8));
        assert_eq!(cfg.verbosity, Some(VerbositySetting::Verbose));
        assert!(cfg.output_dir.is_none());
    }

    #[test]
    fn test_parse_config_all_fields() {
        let cfg = parse_config_str(
            r#"
site = "https://wiki.example.com"
output_dir = "/tmp/export"
workers = 4
max_retries = 3
retry_base_ms = 500
rate_limit = 250
cookies = "/home/ann/cookies.txt"
include_attachments = false
connect_timeout_secs = 10
read_timeout_secs = 90
verbosity = "debug"
"#,
        )
        .expect("full config should parse");
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/tmp/export")));
        assert_eq!(cfg.max_retries, Some(3));
        assert_eq!(cfg.retry_base_ms, Some(500));
        assert_eq!(cfg.rate_limit, Some(250));
        assert_eq!(cfg.cookies, Some(PathBuf::from("/home/ann/cookies.txt")));
        assert_eq!(cfg.include_attachments, Some(false));
        assert_eq!(cfg.connect_timeout_secs, Some(10));
        assert_eq!(cfg.read_timeout_secs, Some(90));
        assert_eq!(cfg.verbosity, Some(VerbositySetting::Debug));
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r#"
workers = 4 # pipelines
site = "acme#1" # hash inside quotes is kept
"#,
        )
        .expect("config with comments should parse");
        assert_eq!(cfg.workers, Some(4));
        assert_eq!(cfg.site.as_deref(), Some("acme#1"));
    }

    // ==================== Validation ====================

    #[test]
    fn test_parse_config_rejects_invalid_workers() {
        let err = parse_config_str("workers = 33").expect_err("invalid workers expected");
        assert!(err.to_string().contains("workers"));

        let err = parse_config_str("workers = 0").expect_err("invalid workers expected");
        assert!(err.to_string().contains("1..=32"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_rate_limit() {
        let err = parse_config_str("rate_limit = 60001").expect_err("invalid rate_limit expected");
        assert!(err.to_string().contains("rate_limit"));
    }

    #[test]
    fn test_parse_config_rejects_negative_integer() {
        let err = parse_config_str("retry_base_ms = -5").expect_err("negative value expected");
        assert!(err.to_string().contains("retry_base_ms"));
    }

    #[test]
    fn test_parse_config_rejects_numeric_values_with_trailing_tokens() {
        let err = parse_config_str("workers = 4 trailing").expect_err("expected trailing token error");
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn test_parse_config_rejects_unquoted_string() {
        let err = parse_config_str("site = acme").expect_err("expected quoted string error");
        assert!(err.to_string().contains("site"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_boolean() {
        let err = parse_config_str("include_attachments = yes").expect_err("invalid boolean expected");
        assert!(err.to_string().contains("include_attachments"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_timeout_value() {
        let err = parse_config_str("read_timeout_secs = 0").expect_err("invalid timeout expected");
        assert!(err.to_string().contains("read_timeout_secs"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("unknown_key = 123").expect_err("unknown key error expected");
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(err.to_string().contains("unknown_key"));
    }

    #[test]
    fn test_parse_config_rejects_line_without_equals() {
        let err = parse_config_str("workers 4").expect_err("syntax error expected");
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_verbosity_as_str() {
        assert_eq!(VerbositySetting::Default.as_str(), "default");
        assert_eq!(VerbositySetting::Verbose.as_str(), "verbose");
        assert_eq!(VerbositySetting::Quiet.as_str(), "quiet");
        assert_eq!(VerbositySetting::Debug.as_str(), "debug");
    }

    // ==================== Loading ====================

    #[test]
    fn test_load_explicit_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("export.toml");
        fs::write(&path, "site = \"acme\"\nworkers = 2\n").unwrap();

        let loaded = load_config(Some(&path)).expect("explicit config should load");
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.config.unwrap().workers, Some(2));
    }

    #[test]
    fn test_load_missing_explicit_config_fails() {
        let temp = TempDir::new().unwrap();
        let err = load_config(Some(&temp.path().join("absent.toml"))).expect_err("missing file");
        assert!(err.to_string().contains("Failed to read config file"));
    }

    // ==================== Precedence ====================

    fn parse_args(argv: &[&str]) -> (Args, CliValueSources) {
        use clap::{CommandFactory, FromArgMatches};
        let matches = Args::command().try_get_matches_from(argv).unwrap();
        let args = Args::from_arg_matches(&matches).unwrap();
        let sources = CliValueSources {
            workers: matches.value_source("workers") == Some(clap::parser::ValueSource::CommandLine),
            ..CliValueSources::default()
        };
        (args, sources)
    }

    #[test]
    fn test_file_values_fill_defaults() {
        let cfg = parse_config_str(
            "site = \"acme\"\nworkers = 3\ninclude_attachments = false\nverbosity = \"quiet\"",
        )
        .unwrap();
        let (args, sources) = parse_args(&["confluence-export", "-p", "1"]);
        let merged = cfg.apply_to(args, &sources);

        assert_eq!(merged.site.as_deref(), Some("acme"));
        assert_eq!(merged.workers, 3);
        assert!(merged.no_attachments);
        assert!(merged.quiet);
    }

    #[test]
    fn test_explicit_cli_values_win_over_file() {
        let cfg = parse_config_str("site = \"file-site\"\nworkers = 3").unwrap();
        let (args, sources) = parse_args(&["confluence-export", "--site", "cli-site", "-w", "5"]);
        let merged = cfg.apply_to(args, &sources);

        assert_eq!(merged.site.as_deref(), Some("cli-site"));
        assert_eq!(merged.workers, 5);
    }

    #[test]
    fn test_file_cookies_ignored_when_token_given() {
        let cfg = parse_config_str("cookies = \"/tmp/cookies.txt\"").unwrap();
        let args = Args::try_parse_from(["confluence-export", "--token", "t0k"]).unwrap();
        let merged = cfg.apply_to(args, &CliValueSources::default());
        assert!(merged.cookies.is_none());
    }
}
