//! Run-wide asset cache with per-key request coalescing.
//!
//! Each key maps to an `Arc<OnceCell>`. The map shard lock is only held long
//! enough to clone that `Arc`; the (possibly slow) resolution then runs
//! against the cell, so resolving one asset never blocks lookups of other
//! keys, and concurrent lookups of the same key wait for the single
//! in-flight resolution instead of starting their own.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::trace;

use super::error::ResolutionError;
use super::reference::AssetKey;

/// A resolved asset as stored under the export root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedAsset {
    /// File name inside the shared images directory.
    pub file_name: String,
    /// Absolute path of the stored file.
    pub path: PathBuf,
    /// Verified content type.
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Which tier produced it (`existing` when reused from disk).
    pub source: String,
}

type Slot = Arc<OnceCell<Result<CachedAsset, ResolutionError>>>;

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Distinct keys seen.
    pub entries: usize,
    /// Lookups answered without running a resolution.
    pub hits: u64,
    /// Resolutions actually run.
    pub resolutions: u64,
}

/// Memoizes asset resolutions for one export run.
///
/// Entries are never overwritten; failures are memoized too, so a missing
/// asset referenced from many pages is looked for once.
#[derive(Debug, Default)]
pub struct AssetCache {
    slots: DashMap<AssetKey, Slot>,
    hits: AtomicU64,
    resolutions: AtomicU64,
}

impl AssetCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized result for `key`, running `resolve` if this is
    /// the first lookup.
    ///
    /// When several tasks ask for the same unseen key at once, exactly one
    /// of them runs `resolve`; the rest await its result.
    pub async fn get_or_resolve<F, Fut>(&self, key: &AssetKey, resolve: F) -> Result<CachedAsset, ResolutionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedAsset, ResolutionError>>,
    {
        let slot: Slot = self.slots.entry(key.clone()).or_default().clone();

        let mut ran = false;
        let result = slot
            .get_or_init(|| {
                ran = true;
                resolve()
            })
            .await
            .clone();

        if ran {
            self.resolutions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "asset cache hit");
        }
        result
    }

    /// Returns the stored result for `key` without resolving.
    #[must_use]
    pub fn peek(&self, key: &AssetKey) -> Option<Result<CachedAsset, ResolutionError>> {
        let slot = self.slots.get(key)?.clone();
        slot.get().cloned()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.slots.len(),
            hits: self.hits.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    fn key(scope: &str, name: &str) -> AssetKey {
        AssetKey {
            scope: scope.to_string(),
            filename: name.to_string(),
        }
    }

    fn asset(name: &str) -> CachedAsset {
        CachedAsset {
            file_name: name.to_string(),
            path: PathBuf::from(name),
            content_type: "image/png".to_string(),
            size: 1,
            source: "direct".to_string(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_lookups_resolve_once() {
        let cache = Arc::new(AssetCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_resolve(&key("1", "a.png"), || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(asset("a.png"))
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().file_name, "a.png");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.resolutions, 1);
        assert_eq!(stats.hits, 7);
    }

    #[tokio::test]
    async fn test_distinct_keys_resolve_in_parallel() {
        let cache = Arc::new(AssetCache::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let run = |name: &'static str| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                cache
                    .get_or_resolve(&key("1", name), || async {
                        // Both resolutions must be in flight at once to pass.
                        barrier.wait().await;
                        Ok(asset(name))
                    })
                    .await
            })
        };
        let first = run("a.png");
        let second = run("b.png");

        let both = tokio::time::timeout(Duration::from_secs(5), async {
            (first.await.unwrap(), second.await.unwrap())
        })
        .await
        .expect("resolutions of different keys must not serialize");
        assert!(both.0.is_ok() && both.1.is_ok());
    }

    #[tokio::test]
    async fn test_failures_are_memoized() {
        let cache = AssetCache::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let result = cache
                .get_or_resolve(&key("1", "gone.png"), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ResolutionError::AmbiguousSource { url: "x".to_string() })
                })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.peek(&key("1", "gone.png")).unwrap().is_err());
    }
}
