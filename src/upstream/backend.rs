//! Backend trait definitions.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use crate::error::UpstreamError;
use crate::relay::normalizer::MessageList;

/// A streaming chat-completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Open a streaming completion for `request`.
    ///
    /// Errors returned here happen before any fragment was produced; errors
    /// yielded by the stream happen mid-generation.
    async fn open(&self, request: &CompletionRequest) -> Result<FragmentStream, UpstreamError>;
}

/// Body of an upstream streaming completion call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: MessageList,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn streaming(model: impl Into<String>, messages: MessageList) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
        }
    }
}

/// One incremental unit of generated output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    /// Text delta, absent for role-only or finish-only chunks.
    pub delta: Option<String>,
}

impl Fragment {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: Some(delta.into()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// The delta when it carries any text.
    pub fn into_text(self) -> Option<String> {
        self.delta.filter(|d| !d.is_empty())
    }
}

/// Ordered, finite fragments of one completion.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, UpstreamError>> + Send>>;
