//! Local backends that never touch the network.
//!
//! [`MockBackend`] echoes the conversation word by word for demos without
//! credentials. [`ScriptedBackend`] replays a fixed script and records the
//! requests it receives, for tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;

use super::backend::{CompletionBackend, CompletionRequest, Fragment, FragmentStream};
use crate::error::UpstreamError;
use crate::relay::normalizer::Role;

/// Mock backend that simulates a streaming completion.
pub struct MockBackend {
    /// Delay between fragments.
    token_delay: Duration,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            token_delay: Duration::from_millis(50),
        }
    }

    /// Create with custom fragment delay.
    pub fn with_delay(token_delay: Duration) -> Self {
        Self { token_delay }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn open(&self, request: &CompletionRequest) -> Result<FragmentStream, UpstreamError> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let response = format!(
            "You said: \"{last_user}\"\n\nThis reply comes from the chat-relay mock backend. \
             Start the server without --mock to talk to {}.",
            request.model
        );

        let fragments: Vec<Fragment> = response
            .split_inclusive(' ')
            .map(Fragment::text)
            .collect();

        let delay = self.token_delay;
        let s = stream::iter(fragments).then(move |fragment| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, UpstreamError>(fragment)
        });

        Ok(Box::pin(s))
    }
}

/// One step of a [`ScriptedBackend`] script.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Fragment(Fragment),
    Fail(String),
}

/// Backend replaying a fixed script.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    steps: Vec<ScriptStep>,
    open_error: Option<String>,
    received: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedBackend {
    /// Stream the given text deltas, then end.
    pub fn fragments<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: deltas
                .into_iter()
                .map(|d| ScriptStep::Fragment(Fragment::text(d)))
                .collect(),
            ..Default::default()
        }
    }

    /// Stream the given steps in order.
    pub fn steps(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    /// Refuse to open the stream with an authentication failure.
    pub fn failing_auth(message: impl Into<String>) -> Self {
        Self {
            open_error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Requests received so far, in order.
    pub fn received(&self) -> Vec<CompletionRequest> {
        self.received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn open(&self, request: &CompletionRequest) -> Result<FragmentStream, UpstreamError> {
        if let Ok(mut received) = self.received.lock() {
            received.push(request.clone());
        }

        if let Some(message) = &self.open_error {
            return Err(UpstreamError::Auth(message.clone()));
        }

        let items: Vec<Result<Fragment, UpstreamError>> = self
            .steps
            .iter()
            .map(|step| match step {
                ScriptStep::Fragment(f) => Ok(f.clone()),
                ScriptStep::Fail(msg) => Err(UpstreamError::Stream(msg.clone())),
            })
            .collect();

        Ok(Box::pin(stream::iter(items)))
    }
}
