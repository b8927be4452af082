//! On-disk cache of fetched payloads.
//!
//! One JSON file per key under the cache directory, holding the request
//! identity, the fetch timestamp and the raw payload. An entry is served
//! while `now - fetched_at < max_age`; afterwards it is a miss and the next
//! `put` replaces it.

use crate::config::CacheConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// Identity of a cached request.
///
/// `name` picks the file, `identity` (usually the url) must match what was
/// stored; a changed url under the same name is a miss.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    name: String,
    identity: String,
}

impl CacheKey {
    pub fn new(name: impl AsRef<str>, identity: impl Into<String>) -> Self {
        Self {
            name: sanitise(name.as_ref()),
            identity: identity.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

// keep file names portable; tickers such as `BRK/B` would otherwise escape the directory
pub(crate) fn sanitise(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub fetched_at: DateTime<Utc>,
    pub payload: String,
}

impl CacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.fetched_at) < max_age
    }
}

#[derive(Clone, Debug)]
pub struct FileCache {
    // `None` when caching is disabled
    dir: Option<PathBuf>,
    max_age: Duration,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: Some(dir.into()),
            max_age,
        }
    }

    /// Every `get` misses and every `put` is a no-op.
    pub fn disabled() -> Self {
        Self {
            dir: None,
            max_age: Duration::zero(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        if config.enabled {
            Self::new(&config.directory, config.max_age())
        } else {
            Self::disabled()
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.dir.is_none()
    }

    fn path(&self, dir: &Path, key: &CacheKey) -> PathBuf {
        dir.join(format!("{}.json", key.name))
    }

    /// Payload stored under `key`, if present, matching and not expired.
    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        self.get_at(key, Utc::now()).await
    }

    pub(crate) async fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<String> {
        let dir = self.dir.as_ref()?;
        let path = self.path(dir, key);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!("failed to read cache entry {}, error({err})", path.display());
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("corrupt cache entry {}, error({err})", path.display());
                return None;
            }
        };

        if entry.key != key.identity {
            trace!("cache entry {} belongs to another request", key.name);
            return None;
        }
        if !entry.is_fresh(now, self.max_age) {
            trace!("cache entry {} expired", key.name);
            return None;
        }

        trace!("cache hit for {}", key.name);
        Some(entry.payload)
    }

    /// Store `payload` under `key`, stamped with the current time.
    pub async fn put(&self, key: &CacheKey, payload: &str) -> std::io::Result<()> {
        self.put_at(key, payload, Utc::now()).await
    }

    pub(crate) async fn put_at(
        &self,
        key: &CacheKey,
        payload: &str,
        fetched_at: DateTime<Utc>,
    ) -> std::io::Result<()> {
        let Some(dir) = self.dir.as_ref() else {
            return Ok(());
        };
        tokio::fs::create_dir_all(dir).await?;

        let entry = CacheEntry {
            key: key.identity.clone(),
            fetched_at,
            payload: payload.to_string(),
        };
        let bytes = serde_json::to_vec(&entry)?;

        // write-then-rename so a concurrent reader never sees half an entry
        let path = self.path(dir, key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        trace!("cached {}", key.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key() -> CacheKey {
        CacheKey::new("trades_2024_03", "http://openinsider.com/screener?page=1")
    }

    #[tokio::test]
    async fn round_trip_within_max_age() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path(), Duration::hours(1));

        assert!(cache.get(&key()).await.is_none());
        cache.put(&key(), "<table/>").await.unwrap();
        assert_eq!(cache.get(&key()).await.as_deref(), Some("<table/>"));

        cache.put(&key(), "<table>2</table>").await.unwrap();
        assert_eq!(cache.get(&key()).await.as_deref(), Some("<table>2</table>"));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path(), Duration::hours(24));
        let stored = Utc::now() - Duration::hours(25);

        cache.put_at(&key(), "old", stored).await.unwrap();
        assert!(cache.get(&key()).await.is_none());

        // still fresh an hour after it was stored
        assert_eq!(
            cache.get_at(&key(), stored + Duration::hours(1)).await.as_deref(),
            Some("old")
        );
    }

    #[tokio::test]
    async fn entry_exactly_max_age_old_is_expired() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path(), Duration::hours(2));
        let stored = Utc::now();

        cache.put_at(&key(), "p", stored).await.unwrap();
        assert!(cache.get_at(&key(), stored + Duration::hours(2)).await.is_none());
    }

    #[tokio::test]
    async fn different_identity_under_same_name_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path(), Duration::hours(1));

        cache.put(&key(), "payload").await.unwrap();
        let moved = CacheKey::new("trades_2024_03", "http://openinsider.com/screener?page=2");
        assert!(cache.get(&moved).await.is_none());
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path(), Duration::hours(1));

        std::fs::write(dir.path().join("trades_2024_03.json"), b"{ not json").unwrap();
        assert!(cache.get(&key()).await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_never_hits() {
        let cache = FileCache::disabled();
        assert!(cache.is_disabled());

        cache.put(&key(), "payload").await.unwrap();
        assert!(cache.get(&key()).await.is_none());
    }

    #[test]
    fn key_names_are_sanitised() {
        assert_eq!(CacheKey::new("prices_BRK/B", "u").name(), "prices_BRK_B");
        assert_eq!(CacheKey::new("prices_BRK.B", "u").name(), "prices_BRK.B");
    }
}
