//! Per-user token bucket limiter.
//!
//! A bucket starts full at `capacity` tokens and gains `refill` tokens at
//! the end of every whole `interval`, never exceeding `capacity`. Each
//! allowed request spends one token.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::cache::CacheError;
use crate::config::RateLimitConfig;
use crate::errors::AppError;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Spends one token from `key`'s bucket; `false` when it is empty.
    async fn allow(&self, key: &str) -> Result<bool, CacheError>;
}

/// Rejects with `RateLimited` when the caller's bucket is empty. A limiter
/// outage is logged and the request is let through.
pub async fn enforce(limiter: &dyn RateLimiter, user_id: &str) -> Result<(), AppError> {
    match limiter.allow(user_id).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(AppError::RateLimited),
        Err(e) => {
            warn!("Rate limiter unavailable, allowing request for {user_id}: {e}");
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucket {
    pub tokens: u32,
    pub refilled_at_ms: i64,
}

impl TokenBucket {
    pub fn full(config: &RateLimitConfig, now_ms: i64) -> Self {
        Self {
            tokens: config.capacity,
            refilled_at_ms: now_ms,
        }
    }

    fn refill(&mut self, config: &RateLimitConfig, now_ms: i64) {
        let interval_ms = (config.interval_secs as i64).saturating_mul(1000);
        if interval_ms > 0 {
            let periods = (now_ms - self.refilled_at_ms) / interval_ms;
            if periods > 0 {
                let added = (periods as u64).saturating_mul(config.refill as u64);
                self.tokens = (self.tokens as u64 + added).min(config.capacity as u64) as u32;
                self.refilled_at_ms += periods * interval_ms;
            }
        }
    }

    /// A bucket that has refilled to capacity is indistinguishable from a
    /// fresh one and can be dropped.
    pub fn is_full_at(&self, config: &RateLimitConfig, now_ms: i64) -> bool {
        let mut bucket = *self;
        bucket.refill(config, now_ms);
        bucket.tokens >= config.capacity
    }

    pub fn take(&mut self, config: &RateLimitConfig, now_ms: i64) -> bool {
        self.refill(config, now_ms);

        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }
}

/// How often the in-process limiter drops buckets that have refilled.
const SWEEP_INTERVAL_MS: i64 = 10 * 60 * 1000;

#[derive(Default)]
struct Buckets {
    by_key: HashMap<String, TokenBucket>,
    swept_at_ms: i64,
}

/// In-process limiter, used when no Redis URL is configured.
pub struct MemoryRateLimiter {
    config: RateLimitConfig,
    started: Instant,
    buckets: Mutex<Buckets>,
}

impl MemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            buckets: Mutex::new(Buckets::default()),
        }
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.buckets.lock().await.by_key.len()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn allow(&self, key: &str) -> Result<bool, CacheError> {
        let now_ms = self.started.elapsed().as_millis() as i64;
        let mut buckets = self.buckets.lock().await;

        if now_ms - buckets.swept_at_ms >= SWEEP_INTERVAL_MS {
            let config = self.config;
            buckets
                .by_key
                .retain(|_, bucket| !bucket.is_full_at(&config, now_ms));
            buckets.swept_at_ms = now_ms;
        }

        let bucket = buckets
            .by_key
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::full(&self.config, now_ms));
        Ok(bucket.take(&self.config, now_ms))
    }
}

/// Same refill rule as `TokenBucket::take`, evaluated atomically in Redis.
const TAKE_TOKEN_SCRIPT: &str = r#"
local capacity = tonumber(ARGV[1])
local refill = tonumber(ARGV[2])
local interval = tonumber(ARGV[3])
local now = tonumber(ARGV[4])

local state = redis.call('HMGET', KEYS[1], 'tokens', 'refilled_at')
local tokens = tonumber(state[1])
local refilled_at = tonumber(state[2])
if tokens == nil or refilled_at == nil then
  tokens = capacity
  refilled_at = now
end

if interval > 0 then
  local periods = math.floor((now - refilled_at) / interval)
  if periods > 0 then
    tokens = math.min(capacity, tokens + periods * refill)
    refilled_at = refilled_at + periods * interval
  end
end

local allowed = 0
if tokens > 0 then
  tokens = tokens - 1
  allowed = 1
end

redis.call('HSET', KEYS[1], 'tokens', tokens, 'refilled_at', refilled_at)
local refills_to_full = math.ceil(capacity / math.max(refill, 1))
redis.call('PEXPIRE', KEYS[1], interval * (refills_to_full + 1))
return allowed
"#;

pub struct RedisRateLimiter {
    conn: ConnectionManager,
    config: RateLimitConfig,
    script: Script,
}

impl RedisRateLimiter {
    pub fn new(conn: ConnectionManager, config: RateLimitConfig) -> Self {
        Self {
            conn,
            config,
            script: Script::new(TAKE_TOKEN_SCRIPT),
        }
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn allow(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let allowed: i64 = self
            .script
            .key(format!("prep:ratelimit:{key}"))
            .arg(self.config.capacity)
            .arg(self.config.refill)
            .arg(self.config.interval_secs.saturating_mul(1000))
            .arg(chrono::Utc::now().timestamp_millis())
            .invoke_async(&mut conn)
            .await?;
        Ok(allowed == 1)
    }
}
