//! Chat completions forwarded to the Anthropic Messages API.
//!
//! - POST /chat/completions

use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::anthropic::types::{Message, MessagesRequest, StreamEvent, Usage};
use crate::anthropic::EventStream;
use crate::server::error::ApiError;
use crate::server::routes::AppState;
use crate::server::streaming::chat_to_sse_stream;

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Chat completion request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_max_tokens() -> u32 {
    1000
}
fn default_temperature() -> f64 {
    0.7
}
fn default_stream() -> bool {
    true
}

pub const MAX_TOKENS_LIMIT: u32 = 4096;

impl ChatRequest {
    /// Reject parameters outside the ranges the upstream accepts.
    pub fn validate(&self) -> Result<(), ApiError> {
        if !(1..=MAX_TOKENS_LIMIT).contains(&self.max_tokens) {
            return Err(ApiError::Validation(format!(
                "max_tokens must be between 1 and {MAX_TOKENS_LIMIT}, got {}",
                self.max_tokens
            )));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ApiError::Validation(format!(
                "temperature must be between 0.0 and 1.0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }

    /// Build the upstream request. System messages are lifted into the
    /// `system` field; the last one wins.
    pub fn into_upstream(self, default_model: &str) -> MessagesRequest {
        let mut system = None;
        let mut messages = Vec::with_capacity(self.messages.len());

        for msg in self.messages {
            match msg.role {
                MessageRole::System => system = Some(msg.content),
                role => messages.push(Message {
                    role: role.as_str().to_string(),
                    content: msg.content,
                }),
            }
        }

        MessagesRequest {
            model: self.model.unwrap_or_else(|| default_model.to_string()),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages,
            system,
            stream: self.stream,
        }
    }
}

/// Non-streaming chat response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub role: MessageRole,
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let mode = if req.stream { "stream" } else { "unary" };
    let result = handle_chat(&state, req).await;

    let status = match &result {
        Ok(_) => "ok",
        Err(ApiError::NotConfigured) => "not_configured",
        Err(ApiError::Validation(_)) => "invalid",
        Err(_) => "error",
    };
    state.metrics.record_chat(mode, status);

    result
}

async fn handle_chat(state: &AppState, req: ChatRequest) -> Result<Response, ApiError> {
    let backend = state.chat.clone().ok_or(ApiError::NotConfigured)?;
    req.validate()?;

    let request_id = Uuid::new_v4().to_string();
    let upstream = req.into_upstream(&state.config.anthropic.default_model);

    info!(
        request_id = request_id,
        model = upstream.model,
        messages = upstream.messages.len(),
        stream = upstream.stream,
        "Chat completion request"
    );

    if upstream.stream {
        // Failures to open the stream are reported in-band, like mid-stream ones.
        let events: EventStream = match backend.stream(upstream).await {
            Ok(events) => events,
            Err(e) => Box::pin(stream::iter(vec![Err::<StreamEvent, _>(e)])),
        };
        let sse = Sse::new(chat_to_sse_stream(events)).keep_alive(KeepAlive::default());
        return Ok(sse.into_response());
    }

    let response = backend.create(upstream).await?;
    let content = response
        .first_text()
        .ok_or_else(|| anyhow::anyhow!("upstream response contained no text content"))?
        .to_string();

    info!(
        request_id = request_id,
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        "Chat completion finished"
    );

    Ok(Json(ChatResponse {
        role: MessageRole::Assistant,
        content,
        model: response.model,
        usage: Some(response.usage),
    })
    .into_response())
}
