//! Client for the Anthropic Messages API.
//!
//! - [`client`]: `ChatBackend` trait and the reqwest-based `AnthropicClient`
//! - [`types`]: Request, response and stream event wire types
//! - [`sse`]: Incremental server-sent-events decoder

pub mod client;
pub mod sse;
pub mod types;

pub use client::{AnthropicClient, AnthropicError, ChatBackend, EventStream};
