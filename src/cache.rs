use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default time-to-live for cached responses: 30 days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Stable fingerprint over the logical request parameters, independent of
/// incidental URL formatting. Parts are hashed with a separator so that
/// ["ab", "c"] and ["a", "bc"] do not collide.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Serialize, Deserialize)]
struct Entry {
    timestamp: u64,
    value: serde_json::Value,
}

/// File-per-key disk cache with time-based expiry.
///
/// Entries are written atomically (temp file + rename), so concurrent
/// processes writing different keys cannot corrupt each other. The cache
/// directory is a pure optimization and is always safe to delete.
pub struct Cache {
    dir: PathBuf,
    ttl: Duration,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, ttl })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Look up a key. Expired or unreadable entries are treated as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = std::fs::read_to_string(self.path(key)).ok()?;
        let entry: Entry = serde_json::from_str(&raw).ok()?;
        let age = now_secs().saturating_sub(entry.timestamp);
        if age >= self.ttl.as_secs() {
            return None;
        }
        serde_json::from_value(entry.value).ok()
    }

    /// Store a value under a key, stamped with the current time.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> std::io::Result<()> {
        let entry = Entry {
            timestamp: now_secs(),
            value: serde_json::to_value(value).map_err(std::io::Error::other)?,
        };
        write_atomic(&self.dir, &self.path(key), &entry)
    }

    /// Return the cached value for `key` if fresh, otherwise invoke
    /// `fetch`, store a successful result, and return it. A failed fetch
    /// leaves any existing entry untouched.
    pub async fn get_or_fetch<T, E, F, Fut>(&self, key: &str, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = fetch().await?;
        if let Err(e) = self.put(key, &value) {
            tracing::warn!(key, error = %e, "cache write failed");
        }
        Ok(value)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn write_atomic(dir: &Path, path: &Path, entry: &Entry) -> std::io::Result<()> {
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer(tmp.as_file(), entry).map_err(std::io::Error::other)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fingerprint_stable_and_distinct() {
        assert_eq!(fingerprint(&["dblp", "ICSE", "2023"]), fingerprint(&["dblp", "ICSE", "2023"]));
        assert_ne!(fingerprint(&["ab", "c"]), fingerprint(&["a", "bc"]));
    }

    #[tokio::test]
    async fn test_get_or_fetch_hits_cache_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path(), Duration::from_secs(3600)).unwrap();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Result<String, std::io::Error> = cache
                .get_or_fetch("key", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("body".to_string())
                })
                .await;
            assert_eq!(value.unwrap(), "body");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_fetch_refetches_after_expiry() {
        let dir = tempfile::tempdir().unwrap();
        // Zero TTL: every entry is expired the moment it is written.
        let cache = Cache::new(dir.path(), Duration::ZERO).unwrap();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Result<String, std::io::Error> = cache
                .get_or_fetch("key", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("body".to_string())
                })
                .await;
            assert_eq!(value.unwrap(), "body");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_entry_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path(), Duration::from_secs(3600)).unwrap();
        cache.put("key", &"stale".to_string()).unwrap();

        // Remove freshness by recreating the cache with zero TTL so the
        // fetch path runs, then fail the fetch.
        let expired = Cache::new(dir.path(), Duration::ZERO).unwrap();
        let result: Result<String, std::io::Error> = expired
            .get_or_fetch("key", || async {
                Err(std::io::Error::other("network down"))
            })
            .await;
        assert!(result.is_err());

        // The original entry is still on disk for the long-TTL view.
        assert_eq!(cache.get::<String>("key").unwrap(), "stale");
    }

    #[test]
    fn test_negative_result_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path(), Duration::from_secs(3600)).unwrap();
        cache.put("miss", &None::<String>).unwrap();
        assert_eq!(cache.get::<Option<String>>("miss"), Some(None));
    }
}
