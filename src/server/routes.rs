//! HTTP API.
//!
//! - GET /ask_query?prompt=...   single prompt, SSE response
//! - POST /chat                  message history, SSE response
//! - GET /health

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::HeaderValue;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ApiError, ValidationError};
use crate::relay::{normalize, CompletionRelay, Message, RelaySettings, RequestInput};
use crate::server::streaming::{relay_to_sse_stream, sse_response};
use crate::upstream::CompletionBackend;

/// Application state shared across handlers. Read-only after startup.
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: Arc<CompletionRelay>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Arc<Config>, backend: Arc<dyn CompletionBackend>) -> Self {
        let relay = CompletionRelay::new(backend, RelaySettings::from_config(&config));
        Self {
            config,
            relay: Arc::new(relay),
            start_time: Instant::now(),
        }
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config.server.cors_origin)?;

    Ok(Router::new()
        .route("/ask_query", get(ask_query))
        .route("/chat", post(chat))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Only the configured origin may call the relay, with credentials.
fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin)
        .map_err(|e| anyhow::anyhow!("invalid CORS origin {origin:?}: {e}"))?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Query string of `GET /ask_query`.
#[derive(Debug, Deserialize)]
pub struct AskQuery {
    pub prompt: Option<String>,
}

/// Body of `POST /chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub backend: String,
    pub model: String,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn ask_query(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AskQuery>,
) -> Result<Response, ApiError> {
    let prompt = query.prompt.ok_or(ValidationError::MissingPrompt)?;
    start_relay(&state, RequestInput::Prompt(prompt))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let input = RequestInput::from_parts(req.prompt, req.messages)?;
    start_relay(&state, input)
}

/// Validate the input, then hand the conversation to a relay task and
/// stream its events back.
fn start_relay(state: &AppState, input: RequestInput) -> Result<Response, ApiError> {
    let messages = normalize(input, &state.config.relay.system_prompt)?;
    let request_id = Uuid::new_v4().to_string();

    info!(
        request_id = request_id,
        messages = messages.len(),
        "Relay request"
    );

    let (rx, _task) = state.relay.spawn(request_id, messages);
    let stream = relay_to_sse_stream(rx, state.config.relay.named_complete_event);

    let keep_alive = match state.config.server.keep_alive_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    Ok(sse_response(stream, keep_alive))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        backend: state.relay.backend_name().to_string(),
        model: state.relay.settings().model.clone(),
    })
}
