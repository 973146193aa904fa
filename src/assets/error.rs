//! Asset resolution errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::client::RequestError;

/// Why an asset could not be made available locally.
///
/// Cloneable so a memoized failure can be handed to every page that
/// references the same asset.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    /// Every tier was tried and none produced a valid body.
    #[error(
        "could not resolve {filename} (tried: {tried}){cause}",
        tried = .contexts.join(", "),
        cause = cause_suffix(.last_error.as_deref())
    )]
    Unresolved {
        /// File name that was looked for.
        filename: String,
        /// What was attempted, in order (e.g. `direct`, `page 42`).
        contexts: Vec<String>,
        /// The last underlying failure, if any.
        last_error: Option<String>,
    },

    /// The reference points into an embedded page that cannot be identified exactly.
    #[error("cannot determine source page of {url}")]
    AmbiguousSource {
        /// The reference URL.
        url: String,
    },

    /// The origin rejected the session while resolving.
    #[error("authentication expired while resolving asset: {0}")]
    AuthExpired(RequestError),

    /// The asset was fetched but could not be stored.
    #[error("failed to write {}: {message}", .path.display())]
    Io {
        /// Target path.
        path: PathBuf,
        /// I/O error text.
        message: String,
    },
}

fn cause_suffix(last_error: Option<&str>) -> String {
    last_error.map(|e| format!(": {e}")).unwrap_or_default()
}

impl ResolutionError {
    /// Returns true when the failure should abort the whole run.
    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }
}
