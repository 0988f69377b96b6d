//! The completion relay: drives one upstream stream and turns its fragments
//! into relay events.
//!
//! Each request runs its own loop:
//! 1. Opens the upstream stream with the canonical message list
//! 2. Polls the client connection before every fragment
//! 3. Forwards non-empty deltas as `Processing` events, pausing briefly after each
//! 4. Ends with exactly one `Complete` or `Error`, or with nothing if the
//!    client went away
//!
//! The upstream stream is owned by the loop and dropped on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::UpstreamError;
use crate::relay::normalizer::MessageList;
use crate::upstream::{CompletionBackend, CompletionRequest};

/// One unit of relay output, before wire serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A text delta from upstream.
    Processing { text: String },
    /// Upstream finished normally.
    Complete { text: String },
    /// Opening or reading the upstream stream failed.
    Error { message: String },
}

impl RelayEvent {
    /// Whether this event ends the sequence.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayEvent::Processing { .. })
    }
}

/// Terminal state of a relay loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed { forwarded: usize },
    Disconnected { forwarded: usize },
    Failed { forwarded: usize },
}

/// "Is the client still there?" as seen from the transport layer.
pub trait ConnectionState: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// The event channel closes when the response body is dropped.
impl<T: Send> ConnectionState for mpsc::Sender<T> {
    fn is_connected(&self) -> bool {
        !self.is_closed()
    }
}

impl ConnectionState for AtomicBool {
    fn is_connected(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

/// Per-process relay settings.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Model identifier sent upstream.
    pub model: String,

    /// Pause after each forwarded fragment.
    pub pacing_delay: Duration,

    /// Text carried by the `Complete` event.
    pub completion_marker: String,

    /// Event channel capacity per request.
    pub channel_capacity: usize,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.upstream.model.clone(),
            pacing_delay: config.relay.pacing_delay(),
            completion_marker: config.relay.completion_marker.clone(),
            channel_capacity: config.relay.channel_capacity,
        }
    }
}

/// Relays completions from a shared backend.
pub struct CompletionRelay {
    backend: Arc<dyn CompletionBackend>,
    settings: RelaySettings,
}

impl CompletionRelay {
    pub fn new(backend: Arc<dyn CompletionBackend>, settings: RelaySettings) -> Self {
        Self { backend, settings }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Run the relay on its own task, streaming events to the returned receiver.
    ///
    /// Dropping the receiver is how the client signals disconnection.
    pub fn spawn(
        self: &Arc<Self>,
        request_id: String,
        messages: MessageList,
    ) -> (mpsc::Receiver<RelayEvent>, JoinHandle<RelayOutcome>) {
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let relay = Arc::clone(self);

        let handle = tokio::spawn(async move { relay.run(&request_id, messages, &tx, &tx).await });

        (rx, handle)
    }

    /// Drive one upstream stream to a terminal state, sending events to `sink`.
    pub async fn run<C>(
        &self,
        request_id: &str,
        messages: MessageList,
        connection: &C,
        sink: &mpsc::Sender<RelayEvent>,
    ) -> RelayOutcome
    where
        C: ConnectionState + ?Sized,
    {
        let request = CompletionRequest::streaming(self.settings.model.as_str(), messages);

        info!(
            request_id,
            backend = self.backend.name(),
            model = request.model,
            messages = request.messages.len(),
            "Opening upstream stream"
        );

        let mut stream = match self.backend.open(&request).await {
            Ok(stream) => stream,
            Err(e) => return self.fail(request_id, e, 0, connection, sink).await,
        };

        let mut forwarded = 0;

        while let Some(item) = stream.next().await {
            if !connection.is_connected() {
                info!(request_id, forwarded, "Client disconnected, stopping generation");
                return RelayOutcome::Disconnected { forwarded };
            }

            let fragment = match item {
                Ok(fragment) => fragment,
                Err(e) => return self.fail(request_id, e, forwarded, connection, sink).await,
            };

            let Some(text) = fragment.into_text() else {
                continue;
            };

            if sink.send(RelayEvent::Processing { text }).await.is_err() {
                info!(request_id, forwarded, "Client disconnected, stopping generation");
                return RelayOutcome::Disconnected { forwarded };
            }
            forwarded += 1;

            if !self.settings.pacing_delay.is_zero() {
                tokio::time::sleep(self.settings.pacing_delay).await;
            }
        }

        drop(stream);

        if !connection.is_connected() {
            info!(request_id, forwarded, "Client disconnected before completion");
            return RelayOutcome::Disconnected { forwarded };
        }

        let complete = RelayEvent::Complete {
            text: self.settings.completion_marker.clone(),
        };
        if sink.send(complete).await.is_err() {
            debug!(request_id, "Receiver dropped before completion event");
            return RelayOutcome::Disconnected { forwarded };
        }

        info!(request_id, forwarded, "Generation complete");
        RelayOutcome::Completed { forwarded }
    }

    async fn fail<C>(
        &self,
        request_id: &str,
        error: UpstreamError,
        forwarded: usize,
        connection: &C,
        sink: &mpsc::Sender<RelayEvent>,
    ) -> RelayOutcome
    where
        C: ConnectionState + ?Sized,
    {
        warn!(request_id, forwarded, error = %error, "Upstream failure");

        if connection.is_connected() {
            let event = RelayEvent::Error {
                message: error.to_string(),
            };
            if sink.send(event).await.is_err() {
                debug!(request_id, "Receiver dropped before error event");
            }
        }

        RelayOutcome::Failed { forwarded }
    }
}
