//! OpenAI-compatible streaming backend.
//!
//! Posts to `{api_base}/chat/completions` with `stream: true` and decodes
//! the `data:` lines of the SSE response into fragments.

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::backend::{CompletionBackend, CompletionRequest, Fragment, FragmentStream};
use crate::config::UpstreamConfig;
use crate::error::UpstreamError;

/// Backend speaking the OpenAI chat-completions protocol.
pub struct OpenAiBackend {
    client: Client,
    url: String,
    headers: HeaderMap,
}

impl OpenAiBackend {
    /// Build the backend once at startup. The key is kept inside the
    /// authorization header and never logged.
    pub fn new(config: &UpstreamConfig, api_key: &str) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| UpstreamError::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| UpstreamError::Config(format!("Invalid API key format: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        Ok(Self {
            client,
            url: config.completions_url(),
            headers,
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn open(&self, request: &CompletionRequest) -> Result<FragmentStream, UpstreamError> {
        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let mut bytes = response.bytes_stream();
        let s = stream! {
            let mut buffer = BytesMut::new();
            'read: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(UpstreamError::from(e));
                        break 'read;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let raw = buffer.split_to(pos + 1);
                    let line = match std::str::from_utf8(&raw) {
                        Ok(line) => line,
                        Err(e) => {
                            yield Err(UpstreamError::Stream(format!("Invalid UTF-8 in stream: {e}")));
                            break 'read;
                        }
                    };
                    match parse_sse_line(line) {
                        Ok(SseLine::Fragment(fragment)) => yield Ok(fragment),
                        Ok(SseLine::Done) => break 'read,
                        Ok(SseLine::Skip) => {}
                        Err(e) => {
                            yield Err(e);
                            break 'read;
                        }
                    }
                }
            }
            debug!("Upstream stream closed");
        };

        Ok(Box::pin(s))
    }
}

/// Map a non-2xx upstream response to an error.
fn classify_status(status: StatusCode, body: String) -> UpstreamError {
    let message = upstream_error_message(&body).unwrap_or(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpstreamError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => UpstreamError::RateLimited(message),
        _ => UpstreamError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Pull `error.message` out of an OpenAI error body.
fn upstream_error_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
}

/// A decoded line of the upstream SSE stream.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseLine {
    Fragment(Fragment),
    Done,
    Skip,
}

/// Parse one SSE line from the upstream response.
pub(crate) fn parse_sse_line(line: &str) -> Result<SseLine, UpstreamError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() || line.starts_with(':') {
        return Ok(SseLine::Skip);
    }

    // event:, id:, retry: carry nothing we relay.
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.strip_prefix(' ').unwrap_or(data);

    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    if let Ok(err) = serde_json::from_str::<StreamErrorChunk>(data) {
        return Err(UpstreamError::Stream(err.error.message));
    }

    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| UpstreamError::Parse(format!("Failed to parse chunk: {e}")))?;
    let delta = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content);

    Ok(SseLine::Fragment(Fragment { delta }))
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Error object some providers send in-band after the stream started.
#[derive(Debug, Deserialize)]
struct StreamErrorChunk {
    error: StreamErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StreamErrorDetail {
    message: String,
}
