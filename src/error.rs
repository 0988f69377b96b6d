//! Error types for the relay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Request input that cannot be turned into a conversation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("request must contain a non-empty `messages` list or a `prompt`")]
    EmptyRequest,

    #[error("missing required query parameter `prompt`")]
    MissingPrompt,
}

/// Failures opening or reading the upstream completion stream.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(err.to_string())
        } else if err.is_connect() {
            UpstreamError::Http(format!("Connection failed: {err}"))
        } else if err.is_decode() {
            UpstreamError::Parse(format!("Failed to decode response: {err}"))
        } else {
            UpstreamError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        UpstreamError::Parse(err.to_string())
    }
}

/// Errors rejected at the HTTP layer, before any stream is opened.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
