/// LLM client: the single point of entry for all hosted-model calls.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// Handlers depend on the `LanguageModel` trait; `LlmClient` is the
/// production implementation.
///
/// Model: claude-sonnet-4-5, fixed at compile time.
use std::pin::Pin;

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;
pub mod sse;

use sse::{SseDecoder, SseEvent};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Incremental text chunks from a streamed completion.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// A provider-neutral completion request: one system prompt and an
/// alternating conversation that starts with a user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub system: String,
    pub messages: Vec<Message>,
}

impl LlmRequest {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            messages: Vec::new(),
        }
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message {
            role: Role::User,
            content: content.into(),
        });
        self
    }

    pub fn assistant(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message {
            role: Role::Assistant,
            content: content.into(),
        });
        self
    }
}

/// The seam between handlers and the hosted model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Buffered completion; returns the full text.
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;

    /// Streamed completion. Errors before the first byte are returned
    /// directly; later failures surface as stream items.
    async fn stream(&self, request: &LlmRequest) -> Result<TokenStream, LlmError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Concatenates every text block.
    pub fn text(&self) -> Option<String> {
        let text: String = self
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Payload of one streamed event, discriminated by its `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamPayload {
    ContentBlockDelta { delta: Delta },
    MessageStop,
    Error { error: AnthropicErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, PartialEq)]
enum StreamStep {
    Text(String),
    Stop,
    Skip,
}

fn interpret_event(event: &SseEvent) -> Result<StreamStep, LlmError> {
    if event.data.is_empty() {
        return Ok(StreamStep::Skip);
    }
    match serde_json::from_str::<StreamPayload>(&event.data)? {
        StreamPayload::ContentBlockDelta {
            delta: Delta::TextDelta { text },
        } => Ok(StreamStep::Text(text)),
        StreamPayload::ContentBlockDelta { .. } | StreamPayload::Other => Ok(StreamStep::Skip),
        StreamPayload::MessageStop => Ok(StreamStep::Stop),
        StreamPayload::Error { error } => Err(LlmError::Stream(error.message)),
    }
}

/// The single LLM client used by all services.
/// Wraps the Anthropic Messages API; no retries are attempted.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
            api_key,
        })
    }

    async fn send(&self, request: &LlmRequest, stream: bool) -> Result<reqwest::Response, LlmError> {
        let body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system: &request.system,
            messages: &request.messages,
            stream,
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("LLM API returned {}: {}", status, body);
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let response: LlmResponse = self.send(request, false).await?.json().await?;

        debug!(
            "LLM call succeeded: input_tokens={}, output_tokens={}",
            response.usage.input_tokens, response.usage.output_tokens
        );

        response.text().ok_or(LlmError::EmptyContent)
    }

    async fn stream(&self, request: &LlmRequest) -> Result<TokenStream, LlmError> {
        let bytes = self.send(request, true).await?.bytes_stream();
        Ok(decode_token_stream(bytes))
    }
}

/// Turns an upstream SSE body into text chunks. A body that ends before
/// `message_stop` yields a final error so callers never mistake a cut-off
/// completion for a finished one.
fn decode_token_stream<S, E>(bytes: S) -> TokenStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<LlmError> + Send + 'static,
{
    let tokens = stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = SseDecoder::default();
        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };
            for event in decoder.push(&chunk) {
                match interpret_event(&event) {
                    Ok(StreamStep::Text(text)) => yield Ok(text),
                    Ok(StreamStep::Stop) => return,
                    Ok(StreamStep::Skip) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }
        if let Some(event) = decoder.finish() {
            match interpret_event(&event) {
                Ok(StreamStep::Text(text)) => yield Ok(text),
                Ok(StreamStep::Stop) => return,
                Ok(StreamStep::Skip) => {}
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        warn!("LLM stream ended without message_stop");
        yield Err(LlmError::Stream("stream ended before message_stop".to_string()));
    };

    Box::pin(tokens)
}
