//! Client for the generative-AI backend.
//!
//! The backend speaks an OpenAI-style chat-completion wire shape: one request
//! carrying a system prompt and a user payload (text, optionally with image
//! data URLs), one response carrying `choices[0].message.content`. Failures
//! are surfaced, never retried; cancellation is cooperative through the
//! caller's token.

use std::num::NonZeroU32;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const API_KEY_ENV: &str = "MELETE_AI_API_KEY";
const API_KEY_ENV_FALLBACK: &str = "OPENAI_API_KEY";
const COMPLETIONS_PATH: &str = "/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

type BackendRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn backend_rate_limiter() -> &'static Arc<BackendRateLimiter> {
    static LIMITER: OnceLock<Arc<BackendRateLimiter>> = OnceLock::new();
    LIMITER.get_or_init(|| {
        let quota = Quota::per_second(NonZeroU32::new(8).expect("non-zero quota"))
            .allow_burst(NonZeroU32::new(8).expect("non-zero burst"));
        Arc::new(RateLimiter::direct(quota))
    })
}

/// Errors produced by the generative backend client.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("missing {API_KEY_ENV} or {API_KEY_ENV_FALLBACK} environment variable")]
    MissingApiKey,
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend returned no content")]
    EmptyContent,
    #[error("backend call aborted")]
    Aborted,
}

/// User-side payload of one backend call.
#[derive(Debug, Clone)]
pub enum UserContent {
    Text(String),
    Parts(Vec<UserPart>),
}

#[derive(Debug, Clone)]
pub enum UserPart {
    Text(String),
    /// `data:<mime>;base64,<payload>` URL, the shape vision backends accept.
    ImageDataUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    JsonObject,
}

/// One fully assembled backend call.
#[derive(Debug, Clone, Builder)]
pub struct ChatCall {
    #[builder(into)]
    pub model: String,
    #[builder(into)]
    pub system_prompt: String,
    pub user_content: UserContent,
    #[builder(default = 4096)]
    pub max_tokens: u32,
    #[builder(default = 0.7)]
    pub temperature: f32,
    pub response_format: Option<ResponseFormat>,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Issue one completion call. Honors `cancel` cooperatively: a signalled
    /// token surfaces as [`ChatError::Aborted`] instead of a backend error.
    async fn complete(&self, call: ChatCall, cancel: &CancellationToken)
    -> Result<String, ChatError>;
}

/// HTTP implementation speaking the OpenAI-style wire protocol.
#[derive(Debug, Clone)]
pub struct HttpChatBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl HttpChatBackend {
    pub fn from_env(api_base: impl Into<String>) -> Result<Self, ChatError> {
        let api_key = std::env::var(API_KEY_ENV)
            .or_else(|_| std::env::var(API_KEY_ENV_FALLBACK))
            .map_err(|_| ChatError::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn send(&self, call: &ChatCall) -> Result<String, ChatError> {
        backend_rate_limiter().until_ready().await;

        let url = format!("{}{}", self.api_base, COMPLETIONS_PATH);
        let request = build_wire_request(call);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: WireResponse = response.json().await?;
        let content = content_from_response(parsed)?;
        debug!(
            model = %call.model,
            content_len = content.len(),
            "backend completion received"
        );
        Ok(content)
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn complete(
        &self,
        call: ChatCall,
        cancel: &CancellationToken,
    ) -> Result<String, ChatError> {
        if cancel.is_cancelled() {
            return Err(ChatError::Aborted);
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(ChatError::Aborted),
            result = self.send(&call) => result,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: WireContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Serialize)]
struct WireImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireResponseFormat {
    JsonObject,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn build_wire_request(call: &ChatCall) -> WireRequest {
    let user_content = match &call.user_content {
        UserContent::Text(text) => WireContent::Text(text.clone()),
        UserContent::Parts(parts) => WireContent::Parts(
            parts
                .iter()
                .map(|part| match part {
                    UserPart::Text(text) => WirePart::Text { text: text.clone() },
                    UserPart::ImageDataUrl(url) => WirePart::ImageUrl {
                        image_url: WireImageUrl { url: url.clone() },
                    },
                })
                .collect(),
        ),
    };

    WireRequest {
        model: call.model.clone(),
        messages: vec![
            WireMessage {
                role: "system",
                content: WireContent::Text(call.system_prompt.clone()),
            },
            WireMessage {
                role: "user",
                content: user_content,
            },
        ],
        max_tokens: call.max_tokens,
        temperature: call.temperature,
        response_format: call.response_format.map(|format| match format {
            ResponseFormat::JsonObject => WireResponseFormat::JsonObject,
        }),
    }
}

fn content_from_response(response: WireResponse) -> Result<String, ChatError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content);

    match content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ChatError::EmptyContent),
    }
}
