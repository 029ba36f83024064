//! Error type returned by route handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::anthropic::AnthropicError;
use crate::race::CoordinatorError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("ANTHROPIC_API_KEY not configured")]
    NotConfigured,

    #[error("{0}")]
    Validation(String),

    #[error("Error calling Anthropic API: {0}")]
    Upstream(#[from] AnthropicError),

    #[error("Race failed: {0}")]
    Race(#[from] CoordinatorError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotConfigured
            | ApiError::Upstream(_)
            | ApiError::Race(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
