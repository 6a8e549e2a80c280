//! Tag-indexed read-through cache.
//!
//! Every cached read is registered under the tags it depended on; writes
//! invalidate by tag. Tag strings follow a fixed naming scheme so that the
//! same tag is produced everywhere a resource is read or written.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::AppError;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Entity types that participate in tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Users,
    JobInfos,
    Questions,
    Interviews,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Users => "users",
            ResourceKind::JobInfos => "jobInfos",
            ResourceKind::Questions => "questions",
            ResourceKind::Interviews => "interviews",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An invalidation tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheTag {
    /// Every record of a kind.
    Global(ResourceKind),
    /// Records of a kind owned by one user.
    User(String, ResourceKind),
    /// Records of a kind scoped to one job info.
    JobInfo(String, ResourceKind),
    /// A single record.
    Id(ResourceKind, String),
}

impl CacheTag {
    pub fn global(kind: ResourceKind) -> Self {
        CacheTag::Global(kind)
    }

    pub fn user(user_id: &str, kind: ResourceKind) -> Self {
        CacheTag::User(user_id.to_string(), kind)
    }

    pub fn job_info(job_info_id: impl ToString, kind: ResourceKind) -> Self {
        CacheTag::JobInfo(job_info_id.to_string(), kind)
    }

    pub fn id(kind: ResourceKind, id: impl ToString) -> Self {
        CacheTag::Id(kind, id.to_string())
    }
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTag::Global(kind) => write!(f, "global:{kind}"),
            CacheTag::User(user_id, kind) => write!(f, "user:{user_id}-{kind}"),
            CacheTag::JobInfo(job_info_id, kind) => write!(f, "jobInfo:{job_info_id}-{kind}"),
            CacheTag::Id(kind, id) => write!(f, "id:{id}-{kind}"),
        }
    }
}

/// A freshly loaded value and the tags it depends on.
pub struct Tagged<T> {
    pub value: T,
    pub tags: Vec<CacheTag>,
}

impl<T> Tagged<T> {
    pub fn new(value: T, tags: Vec<CacheTag>) -> Self {
        Self { value, tags }
    }
}

/// Storage behind `TaggedCache`.
///
/// The backend keeps an invalidation epoch that every `invalidate` bumps.
/// `put` stores nothing unless the epoch still equals the one observed
/// before the value was loaded, so a load that raced with a write is never
/// cached.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn epoch(&self) -> Result<u64, CacheError>;
    /// Returns `false` when the entry was skipped because of a newer epoch.
    async fn put(
        &self,
        key: &str,
        value: String,
        tags: &[CacheTag],
        ttl: Duration,
        loaded_at: u64,
    ) -> Result<bool, CacheError>;
    /// Drops every key registered under any of `tags` and bumps the epoch.
    async fn invalidate(&self, tags: &[CacheTag]) -> Result<(), CacheError>;
}

#[derive(Clone)]
pub struct TaggedCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl TaggedCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// Returns the cached value for `key`, or runs `load` and caches its
    /// result under the tags it reports. Cache faults fall through to `load`.
    pub async fn read_through<T, F, Fut>(&self, key: &str, load: F) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Tagged<T>, AppError>>,
    {
        match self.backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!("Cache hit: {key}");
                    return Ok(value);
                }
                Err(e) => warn!("Discarding undecodable cache entry {key}: {e}"),
            },
            Ok(None) => debug!("Cache miss: {key}"),
            Err(e) => warn!("Cache read failed for {key}: {e}"),
        }

        let loaded_at = match self.backend.epoch().await {
            Ok(epoch) => Some(epoch),
            Err(e) => {
                warn!("Cache epoch unavailable, not caching {key}: {e}");
                None
            }
        };

        let Tagged { value, tags } = load().await?;

        let Some(loaded_at) = loaded_at else {
            return Ok(value);
        };
        match serde_json::to_string(&value) {
            Ok(raw) => match self.backend.put(key, raw, &tags, self.ttl, loaded_at).await {
                Ok(true) => {}
                Ok(false) => debug!("Skipped caching {key}: invalidated while loading"),
                Err(e) => warn!("Cache write failed for {key}: {e}"),
            },
            Err(e) => warn!("Could not serialize cache entry {key}: {e}"),
        }

        Ok(value)
    }

    /// Invalidates `tags`. Failures are logged; entries then age out by TTL.
    pub async fn invalidate(&self, tags: &[CacheTag]) {
        if let Err(e) = self.backend.invalidate(tags).await {
            warn!("Cache invalidation failed for {} tag(s): {e}", tags.len());
        } else {
            debug!(
                "Invalidated tags: {}",
                tags.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
            );
        }
    }
}
