//! HTTP server fronting the race demos and the Anthropic chat proxy.
//!
//! - [`routes`]: Application state, router and the simple handlers
//! - [`chat`]: Chat completion types and handler
//! - [`streaming`]: SSE re-encoding of upstream chat events
//! - [`error`]: Handler error type and its HTTP mapping

pub mod chat;
pub mod error;
pub mod routes;
pub mod streaming;
