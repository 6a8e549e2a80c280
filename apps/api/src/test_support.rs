//! Shared fixtures for unit and router tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use futures_util::stream;
use jsonwebtoken::{encode, EncodingKey, Header};
use tower::ServiceExt;

use crate::auth::{Claims, Identity, JwtVerifier};
use crate::cache::{MemoryCache, TaggedCache};
use crate::config::{Config, JwtKey, RateLimitConfig};
use crate::llm_client::{LanguageModel, LlmError, LlmRequest, TokenStream};
use crate::models::{ExperienceLevel, JobInfo, NewJobInfo};
use crate::rate_limit::MemoryRateLimiter;
use crate::resources::Repository;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::memory::MemoryStore;
use crate::voice::{ChatEvent, VoiceError, VoiceService};

pub const TEST_JWT_SECRET: &str = "prep-api-test-secret";

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/prep_test".to_string(),
        redis_url: None,
        anthropic_api_key: "test-anthropic-key".to_string(),
        hume_api_key: "test-hume-key".to_string(),
        hume_secret_key: "test-hume-secret".to_string(),
        jwt_key: JwtKey::Secret(TEST_JWT_SECRET.to_string()),
        jwt_issuer: None,
        cache_ttl_secs: 60,
        rate_limit: RateLimitConfig::default(),
        port: 0,
        rust_log: "debug".to_string(),
    }
}

pub fn claims_for(user_id: &str, features: &[&str]) -> Claims {
    Claims {
        sub: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() + 3600,
        name: Some("Test User".to_string()),
        email: Some(format!("{user_id}@example.com")),
        picture: None,
        fea: (!features.is_empty()).then(|| {
            features
                .iter()
                .map(|f| format!("u:{f}"))
                .collect::<Vec<_>>()
                .join(",")
        }),
    }
}

pub fn sign(claims: &Claims) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Replies with a fixed text, streamed in small chunks.
#[derive(Default)]
pub struct ScriptedModel {
    reply: String,
    /// Fail the stream after the first chunk.
    fail_mid_stream: bool,
    /// Fail before any output.
    fail_upfront: bool,
    calls: AtomicUsize,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            ..Default::default()
        }
    }

    pub fn failing_mid_stream(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            fail_mid_stream: true,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_upfront: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<LlmRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn record(&self, request: &LlmRequest) -> Result<(), LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_upfront {
            return Err(LlmError::Api {
                status: 529,
                message: "Overloaded".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.record(request)?;
        if self.fail_mid_stream {
            return Err(LlmError::EmptyContent);
        }
        Ok(self.reply.clone())
    }

    async fn stream(&self, request: &LlmRequest) -> Result<TokenStream, LlmError> {
        self.record(request)?;

        let mut chunks: Vec<Result<String, LlmError>> = self
            .reply
            .split_inclusive(' ')
            .map(|chunk| Ok(chunk.to_string()))
            .collect();
        if self.fail_mid_stream {
            chunks.truncate(1);
            chunks.push(Err(LlmError::Stream("connection reset".to_string())));
        }

        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[derive(Default)]
pub struct FakeVoice {
    pub events: Vec<ChatEvent>,
    pub unavailable: bool,
}

#[async_trait]
impl VoiceService for FakeVoice {
    async fn access_token(&self) -> Result<String, VoiceError> {
        if self.unavailable {
            return Err(VoiceError::Api {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok("voice-access-token".to_string())
    }

    async fn chat_events(&self, _chat_id: &str) -> Result<Vec<ChatEvent>, VoiceError> {
        if self.unavailable {
            return Err(VoiceError::Api {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(self.events.clone())
    }
}

/// A router wired to in-memory backends.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub llm: Arc<ScriptedModel>,
    pub state: AppState,
}

impl TestApp {
    pub fn new(llm: ScriptedModel) -> Self {
        Self::with_voice(llm, FakeVoice::default())
    }

    pub fn with_voice(llm: ScriptedModel, voice: FakeVoice) -> Self {
        Self::build(llm, voice, RateLimitConfig::default())
    }

    pub fn build(llm: ScriptedModel, voice: FakeVoice, rate_limit: RateLimitConfig) -> Self {
        let config = test_config();
        let store = Arc::new(MemoryStore::new());
        let llm = Arc::new(llm);
        let cache = TaggedCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(60));

        let state = AppState {
            repo: Repository::new(store.clone(), cache),
            llm: llm.clone(),
            voice: Arc::new(voice),
            rate_limiter: Arc::new(MemoryRateLimiter::new(rate_limit)),
            verifier: Arc::new(JwtVerifier::from_config(&config).unwrap()),
            config,
        };

        Self { store, llm, state }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Syncs `user_id` from default claims and gives them a job info.
    pub async fn job_info_for(&self, user_id: &str) -> JobInfo {
        Identity::from_claims(claims_for(user_id, &[]))
            .ensure_user(&self.state.repo)
            .await
            .unwrap();
        self.state
            .repo
            .insert_job_info(NewJobInfo {
                user_id: user_id.to_string(),
                title: "Backend Engineer".to_string(),
                description: "Design and operate Rust services.".to_string(),
                experience_level: ExperienceLevel::Senior,
            })
            .await
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body)
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> (StatusCode, Bytes) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Bytes) {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

/// Token for `user_id` holding `features`.
pub fn token_for(user_id: &str, features: &[&str]) -> String {
    sign(&claims_for(user_id, features))
}

/// Splits an SSE body into `(event, data)` pairs.
pub fn sse_events(body: &[u8]) -> Vec<(String, String)> {
    String::from_utf8_lossy(body)
        .split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .map(|block| {
            let mut event = String::from("message");
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    event = value.trim().to_string();
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
                }
            }
            (event, data.join("\n"))
        })
        .collect()
}
