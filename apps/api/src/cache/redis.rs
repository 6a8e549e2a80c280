//! Redis cache backend. Values live under `prep:cache:{key}`; each tag is a
//! set `prep:tag:{tag}` holding the value keys registered under it. The
//! invalidation epoch is the counter `prep:cache-epoch`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use super::{CacheBackend, CacheError, CacheTag};

const VALUE_PREFIX: &str = "prep:cache:";
const TAG_PREFIX: &str = "prep:tag:";
const EPOCH_KEY: &str = "prep:cache-epoch";

/// KEYS: epoch, value key, tag sets. ARGV: expected epoch, value, ttl secs.
const PUT_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current ~= tonumber(ARGV[1]) then
  return 0
end
redis.call('SET', KEYS[2], ARGV[2], 'EX', ARGV[3])
for i = 3, #KEYS do
  redis.call('SADD', KEYS[i], KEYS[2])
  redis.call('EXPIRE', KEYS[i], ARGV[3])
end
return 1
"#;

/// KEYS: epoch, tag sets.
const INVALIDATE_SCRIPT: &str = r#"
redis.call('INCR', KEYS[1])
for i = 2, #KEYS do
  local members = redis.call('SMEMBERS', KEYS[i])
  for _, key in ipairs(members) do
    redis.call('DEL', key)
  end
  redis.call('DEL', KEYS[i])
end
return 1
"#;

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    put_script: Script,
    invalidate_script: Script,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            put_script: Script::new(PUT_SCRIPT),
            invalidate_script: Script::new(INVALIDATE_SCRIPT),
        }
    }
}

fn value_key(key: &str) -> String {
    format!("{VALUE_PREFIX}{key}")
}

fn tag_key(tag: &CacheTag) -> String {
    format!("{TAG_PREFIX}{tag}")
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(value_key(key)).await?)
    }

    async fn epoch(&self) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let epoch: Option<u64> = conn.get(EPOCH_KEY).await?;
        Ok(epoch.unwrap_or(0))
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        tags: &[CacheTag],
        ttl: Duration,
        loaded_at: u64,
    ) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.put_script.prepare_invoke();
        invocation.key(EPOCH_KEY).key(value_key(key));
        for tag in tags {
            invocation.key(tag_key(tag));
        }
        let stored: i64 = invocation
            .arg(loaded_at)
            .arg(value)
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;
        Ok(stored == 1)
    }

    async fn invalidate(&self, tags: &[CacheTag]) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let mut invocation = self.invalidate_script.prepare_invoke();
        invocation.key(EPOCH_KEY);
        for tag in tags {
            invocation.key(tag_key(tag));
        }
        invocation.invoke_async::<_, i64>(&mut conn).await?;
        Ok(())
    }
}
