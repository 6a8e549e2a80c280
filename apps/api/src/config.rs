use anyhow::{bail, Context, Result};

/// How bearer tokens from the hosted auth provider are verified.
#[derive(Debug, Clone)]
pub enum JwtKey {
    /// RS256 public key in PEM form (production).
    RsaPem(String),
    /// HS256 shared secret (local development and tests).
    Secret(String),
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// When unset, the tagged cache and rate limiter run in-process.
    pub redis_url: Option<String>,
    pub anthropic_api_key: String,
    pub hume_api_key: String,
    pub hume_secret_key: String,
    pub jwt_key: JwtKey,
    pub jwt_issuer: Option<String>,
    pub cache_ttl_secs: u64,
    pub rate_limit: RateLimitConfig,
    pub port: u16,
    pub rust_log: String,
}

/// Token bucket parameters for the per-user interview limiter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    pub capacity: u32,
    pub refill: u32,
    pub interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 12,
            refill: 4,
            interval_secs: 24 * 60 * 60,
        }
    }
}

impl RateLimitConfig {
    /// A zero interval would never refill in memory and never persist in Redis.
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            bail!("'RATE_LIMIT_INTERVAL_SECS' must be greater than zero");
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let jwt_key = match (
            optional_env("AUTH_JWT_PUBLIC_KEY"),
            optional_env("AUTH_JWT_SECRET"),
        ) {
            (Some(pem), _) => JwtKey::RsaPem(pem),
            (None, Some(secret)) => JwtKey::Secret(secret),
            (None, None) => {
                bail!("One of 'AUTH_JWT_PUBLIC_KEY' or 'AUTH_JWT_SECRET' must be set")
            }
        };

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            capacity: parse_env("RATE_LIMIT_CAPACITY", defaults.capacity)?,
            refill: parse_env("RATE_LIMIT_REFILL", defaults.refill)?,
            interval_secs: parse_env("RATE_LIMIT_INTERVAL_SECS", defaults.interval_secs)?,
        };
        rate_limit.validate()?;

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: optional_env("REDIS_URL"),
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            hume_api_key: require_env("HUME_API_KEY")?,
            hume_secret_key: require_env("HUME_SECRET_KEY")?,
            jwt_key,
            jwt_issuer: optional_env("AUTH_JWT_ISSUER"),
            cache_ttl_secs: parse_env("CACHE_TTL_SECS", 3600)?,
            rate_limit,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("'{key}' must be a valid number")),
        None => Ok(default),
    }
}
