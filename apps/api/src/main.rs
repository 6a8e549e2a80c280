mod auth;
mod cache;
mod config;
mod db;
mod errors;
mod interviews;
mod job_infos;
mod llm_client;
mod models;
mod questions;
mod rate_limit;
mod resources;
mod resumes;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod test_support;
mod users;
mod validation;
mod voice;

use anyhow::Result;
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::JwtVerifier;
use crate::cache::{CacheBackend, MemoryCache, RedisCache, TaggedCache};
use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::rate_limit::{MemoryRateLimiter, RateLimiter, RedisRateLimiter};
use crate::resources::Repository;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::PgStore;
use crate::voice::HumeClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Prep API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs migrations)
    let db = create_pool(&config.database_url).await?;
    let store = Arc::new(PgStore::new(db));

    // Cache and rate limiter share Redis when configured
    let (cache_backend, rate_limiter): (Arc<dyn CacheBackend>, Arc<dyn RateLimiter>) =
        match &config.redis_url {
            Some(url) => {
                let client = redis::Client::open(url.as_str())?;
                let redis = ConnectionManager::new(client).await?;
                info!("Redis connection established");
                (
                    Arc::new(RedisCache::new(redis.clone())),
                    Arc::new(RedisRateLimiter::new(redis, config.rate_limit)),
                )
            }
            None => {
                info!("REDIS_URL not set, using in-process cache and rate limiter");
                (
                    Arc::new(MemoryCache::new()),
                    Arc::new(MemoryRateLimiter::new(config.rate_limit)),
                )
            }
        };
    let cache = TaggedCache::new(cache_backend, Duration::from_secs(config.cache_ttl_secs));

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Initialize voice provider client
    let voice = HumeClient::new(config.hume_api_key.clone(), config.hume_secret_key.clone())?;

    let verifier = JwtVerifier::from_config(&config)?;

    // Build app state
    let state = AppState {
        repo: Repository::new(store, cache),
        llm: Arc::new(llm),
        voice: Arc::new(voice),
        rate_limiter,
        verifier: Arc::new(verifier),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web app domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
