//! HTTP routes.
//!
//! - GET /
//! - GET /health
//! - GET /metrics
//! - GET /async-demo
//! - GET /race-demo?proceed=<bool>
//! - GET /users/{user_id}
//! - POST /echo
//! - POST /chat/completions (see [`crate::server::chat`])

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::extract::rejection::PathRejection;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::anthropic::ChatBackend;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::race::demo::{run_gather_demo, run_race_demo, DemoReport};
use crate::race::RaceCoordinator;
use crate::server::chat::chat_completions;
use crate::server::error::ApiError;

/// Application state shared across handlers.
pub struct AppState {
    pub config: Arc<Config>,
    /// Absent when no API key was configured.
    pub chat: Option<Arc<dyn ChatBackend>>,
    pub coordinator: RaceCoordinator,
    pub metrics: Metrics,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Arc<Config>, chat: Option<Arc<dyn ChatBackend>>) -> anyhow::Result<Self> {
        Ok(Self {
            coordinator: RaceCoordinator::from_config(&config.race),
            config,
            chat,
            metrics: Metrics::new()?,
            start_time: Instant::now(),
        })
    }
}

/// Build the axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/async-demo", get(async_demo))
        .route("/race-demo", get(race_demo))
        .route("/users/{user_id}", get(get_user))
        .route("/echo", post(echo))
        .route("/chat/completions", post(chat_completions))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AsyncDemoResponse {
    pub message: String,
    pub results: Vec<String>,
    pub total_tasks: usize,
}

#[derive(Debug, Deserialize)]
pub struct RaceDemoParams {
    #[serde(default = "default_proceed")]
    pub proceed: bool,
}

fn default_proceed() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_id: i64,
    pub username: String,
    pub active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EchoResponse {
    pub received: Map<String, Value>,
    /// Seconds since the Unix epoch when the request was handled.
    pub timestamp: u64,
    pub echo: bool,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Welcome to AioPy FastAPI!".to_string(),
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "aiopy-api".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

async fn async_demo(State(state): State<Arc<AppState>>) -> Json<AsyncDemoResponse> {
    let results = run_gather_demo(&state.config.race).await;
    Json(AsyncDemoResponse {
        message: "Async tasks completed".to_string(),
        total_tasks: results.len(),
        results,
    })
}

async fn race_demo(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RaceDemoParams>,
) -> Result<Json<DemoReport>, ApiError> {
    let start = Instant::now();
    let result = run_race_demo(&state.coordinator, &state.config.race, params.proceed).await;

    let label = match &result {
        Ok(report) => report.fate.to_string(),
        Err(err) => err.kind().to_string(),
    };
    state
        .metrics
        .record_race(&label, start.elapsed().as_secs_f64());

    Ok(Json(result?))
}

/// A non-integer id is a validation failure (422), like any other bad input.
async fn get_user(
    user_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Path(user_id) = user_id.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
    Ok(Json(UserResponse {
        user_id,
        username: format!("user_{user_id}"),
        active: true,
    }))
}

async fn echo(Json(data): Json<Map<String, Value>>) -> Json<EchoResponse> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    Json(EchoResponse {
        received: data,
        timestamp,
        echo: true,
    })
}
