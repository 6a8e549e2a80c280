//! In-process cache backend, used when no Redis URL is configured.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{CacheBackend, CacheError, CacheTag};

/// Expired entries and their tag registrations are swept at most this often.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entry {
    value: String,
    expires_at: Instant,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// tag -> keys registered under it
    index: HashMap<String, HashSet<String>>,
    epoch: u64,
    swept_at: Instant,
}

impl Inner {
    fn sweep(&mut self, now: Instant) {
        self.entries.retain(|_, entry| entry.expires_at > now);
        let entries = &self.entries;
        self.index.retain(|_, keys| {
            keys.retain(|key| entries.contains_key(key));
            !keys.is_empty()
        });
        self.swept_at = now;
    }
}

pub struct MemoryCache {
    inner: Mutex<Inner>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                index: HashMap::new(),
                epoch: 0,
                swept_at: Instant::now(),
            }),
        }
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn sizes(&self) -> (usize, usize) {
        let inner = self.inner.lock().await;
        (inner.entries.len(), inner.index.len())
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut inner = self.inner.lock().await;
        let expired = match inner.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()))
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.remove(key);
        }
        Ok(None)
    }

    async fn epoch(&self) -> Result<u64, CacheError> {
        Ok(self.inner.lock().await.epoch)
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        tags: &[CacheTag],
        ttl: Duration,
        loaded_at: u64,
    ) -> Result<bool, CacheError> {
        let mut inner = self.inner.lock().await;
        if inner.epoch != loaded_at {
            return Ok(false);
        }

        let now = Instant::now();
        if now.duration_since(inner.swept_at) >= SWEEP_INTERVAL {
            inner.sweep(now);
        }

        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        for tag in tags {
            inner
                .index
                .entry(tag.to_string())
                .or_default()
                .insert(key.to_string());
        }
        Ok(true)
    }

    async fn invalidate(&self, tags: &[CacheTag]) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().await;
        inner.epoch += 1;
        for tag in tags {
            if let Some(keys) = inner.index.remove(&tag.to_string()) {
                for key in keys {
                    inner.entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}
