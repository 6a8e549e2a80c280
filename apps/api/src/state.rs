use std::sync::Arc;

use crate::auth::JwtVerifier;
use crate::config::Config;
use crate::llm_client::LanguageModel;
use crate::rate_limit::RateLimiter;
use crate::resources::Repository;
use crate::voice::VoiceService;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Ownership-scoped, tag-cached access to the database.
    pub repo: Repository,
    pub llm: Arc<dyn LanguageModel>,
    pub voice: Arc<dyn VoiceService>,
    /// Token bucket guarding interview creation.
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub verifier: Arc<JwtVerifier>,
    pub config: Config,
}
