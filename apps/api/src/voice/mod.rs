//! Voice interview provider (Hume EVI).
//!
//! Two calls are needed: a short-lived client access token so the browser
//! can open the voice session, and the transcript of a finished chat so
//! feedback can be generated from it.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const HUME_TOKEN_URL: &str = "https://api.hume.ai/oauth2-cc/token";
const HUME_CHATS_URL: &str = "https://api.hume.ai/v0/evi/chats";
const PAGE_SIZE: u32 = 100;
/// Upper bound on transcript pages fetched for one chat.
const MAX_PAGES: u32 = 50;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid chat id: {0:?}")]
    InvalidChatId(String),
}

/// Chat ids are opaque provider identifiers made of ASCII letters, digits,
/// `-` and `_`.
pub fn is_valid_chat_id(chat_id: &str) -> bool {
    !chat_id.is_empty()
        && chat_id.len() <= 128
        && chat_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn chat_url(chat_id: &str) -> Result<Url, VoiceError> {
    let invalid = || VoiceError::InvalidChatId(chat_id.to_string());
    if !is_valid_chat_id(chat_id) {
        return Err(invalid());
    }
    let mut url = Url::parse(HUME_CHATS_URL).map_err(|_| invalid())?;
    url.path_segments_mut().map_err(|_| invalid())?.push(chat_id);
    Ok(url)
}

/// One event from a voice chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub message_text: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Consecutive messages from one speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CondensedMessage {
    pub is_user: bool,
    pub content: Vec<String>,
}

/// Keeps only spoken messages and merges consecutive ones from the same
/// speaker.
pub fn condense_chat_messages(events: &[ChatEvent]) -> Vec<CondensedMessage> {
    let mut condensed: Vec<CondensedMessage> = Vec::new();

    for event in events {
        let is_user = match event.event_type.as_str() {
            "USER_MESSAGE" => true,
            "AGENT_MESSAGE" => false,
            _ => continue,
        };
        let Some(text) = event.message_text.as_deref().map(str::trim) else {
            continue;
        };
        if text.is_empty() {
            continue;
        }

        match condensed.last_mut() {
            Some(last) if last.is_user == is_user => last.content.push(text.to_string()),
            _ => condensed.push(CondensedMessage {
                is_user,
                content: vec![text.to_string()],
            }),
        }
    }

    condensed
}

#[async_trait]
pub trait VoiceService: Send + Sync {
    /// Issues a client access token for starting a voice session.
    async fn access_token(&self) -> Result<String, VoiceError>;

    /// Every event of a chat, oldest first.
    async fn chat_events(&self, chat_id: &str) -> Result<Vec<ChatEvent>, VoiceError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ChatEventsPage {
    events_page: Vec<ChatEvent>,
    #[serde(default)]
    total_pages: u32,
}

#[derive(Clone)]
pub struct HumeClient {
    client: Client,
    api_key: String,
    secret_key: String,
}

impl HumeClient {
    pub fn new(api_key: String, secret_key: String) -> Result<Self, VoiceError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()?,
            api_key,
            secret_key,
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, VoiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        warn!("Voice API returned {}: {}", status, message);
        Err(VoiceError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl VoiceService for HumeClient {
    async fn access_token(&self) -> Result<String, VoiceError> {
        let response = self
            .client
            .post(HUME_TOKEN_URL)
            .basic_auth(&self.api_key, Some(&self.secret_key))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let token: TokenResponse = Self::check(response).await?.json().await?;
        Ok(token.access_token)
    }

    async fn chat_events(&self, chat_id: &str) -> Result<Vec<ChatEvent>, VoiceError> {
        let url = chat_url(chat_id)?;
        let mut events = Vec::new();
        let mut page_number = 0;

        loop {
            let response = self
                .client
                .get(url.clone())
                .header("X-Hume-Api-Key", &self.api_key)
                .query(&[
                    ("page_number", page_number.to_string()),
                    ("page_size", PAGE_SIZE.to_string()),
                    ("ascending_order", "true".to_string()),
                ])
                .send()
                .await?;

            let page: ChatEventsPage = Self::check(response).await?.json().await?;
            events.extend(page.events_page);
            page_number += 1;

            if page_number >= page.total_pages || page_number >= MAX_PAGES {
                break;
            }
        }

        debug!("Fetched {} event(s) for chat {chat_id}", events.len());
        Ok(events)
    }
}
