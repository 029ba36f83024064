//! SSE (Server-Sent Events) re-encoding of upstream chat events.
//!
//! Each upstream event of interest becomes one `data: {json}` frame. An
//! upstream failure becomes a final `error` frame and ends the stream.

use std::convert::Infallible;

use axum::response::sse::Event;
use futures::future;
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use tracing::warn;

use crate::anthropic::types::{Delta, StreamEvent};
use crate::anthropic::{AnthropicError, EventStream};

/// Chunk sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    MessageStart { model: String },
    ContentBlockDelta { content: String },
    MessageStop,
    Error { content: String },
}

impl StreamChunk {
    /// Map an upstream event; events without a client counterpart yield `None`.
    pub fn from_event(event: Result<StreamEvent, AnthropicError>) -> Option<Self> {
        match event {
            Ok(StreamEvent::MessageStart { message }) => Some(StreamChunk::MessageStart {
                model: message.model,
            }),
            Ok(StreamEvent::ContentBlockDelta {
                delta: Delta::TextDelta { text },
            }) => Some(StreamChunk::ContentBlockDelta { content: text }),
            Ok(StreamEvent::MessageStop) => Some(StreamChunk::MessageStop),
            Ok(StreamEvent::Error { error }) => Some(StreamChunk::Error {
                content: format!("Error: {}", error.message),
            }),
            Ok(_) => None,
            Err(e) => Some(StreamChunk::Error {
                content: format!("Error: {e}"),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StreamChunk::Error { .. })
    }

    pub fn to_event(&self) -> Event {
        let data = serde_json::to_string(self).unwrap_or_default();
        Event::default().data(data)
    }
}

/// Convert upstream events into client chunks, stopping after the first error.
pub fn chat_chunks(events: EventStream) -> impl Stream<Item = StreamChunk> {
    events
        .scan(false, |failed, event| {
            if *failed {
                return future::ready(None);
            }
            let chunk = StreamChunk::from_event(event);
            if let Some(chunk) = &chunk {
                if chunk.is_error() {
                    warn!(chunk = ?chunk, "Upstream stream failed");
                    *failed = true;
                }
            }
            future::ready(Some(chunk))
        })
        .filter_map(future::ready)
}

/// Convert upstream events into an SSE stream.
pub fn chat_to_sse_stream(events: EventStream) -> impl Stream<Item = Result<Event, Infallible>> {
    chat_chunks(events).map(|chunk| Ok(chunk.to_event()))
}
