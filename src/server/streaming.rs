//! SSE (Server-Sent Events) framing for relay events.
//!
//! Every relay event becomes one `data:` record carrying
//! `{"status": ..., "data": ...}`. A completed relay is additionally
//! followed by a named `event: complete` record carrying the same payload;
//! browsers drop records whose data buffer is empty.

use std::convert::Infallible;
use std::time::Duration;

use axum::http::header::{CACHE_CONTROL, CONNECTION};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::relay::RelayEvent;

/// Status tag of a wire record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireStatus {
    Processing,
    Complete,
    Error,
}

/// JSON body of a `data:` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePayload {
    pub status: WireStatus,
    pub data: String,
}

impl From<RelayEvent> for WirePayload {
    fn from(event: RelayEvent) -> Self {
        match event {
            RelayEvent::Processing { text } => Self {
                status: WireStatus::Processing,
                data: text,
            },
            RelayEvent::Complete { text } => Self {
                status: WireStatus::Complete,
                data: text,
            },
            RelayEvent::Error { message } => Self {
                status: WireStatus::Error,
                data: message,
            },
        }
    }
}

/// SSE records for one relay event.
pub fn frame_event(event: RelayEvent, named_complete: bool) -> Vec<Event> {
    let completes = matches!(event, RelayEvent::Complete { .. });

    // serde_json leaves non-ASCII text as is and escapes embedded newlines,
    // so each payload fits on a single data line.
    let payload = WirePayload::from(event);
    let data = serde_json::to_string(&payload).unwrap_or_default();

    if completes && named_complete {
        let named = Event::default().event("complete").data(&data);
        vec![Event::default().data(data), named]
    } else {
        vec![Event::default().data(data)]
    }
}

/// Convert a relay event receiver into an SSE stream.
///
/// The stream ends when the relay task drops its sender.
pub fn relay_to_sse_stream(
    rx: mpsc::Receiver<RelayEvent>,
    named_complete: bool,
) -> impl Stream<Item = Result<Event, Infallible>> {
    ReceiverStream::new(rx)
        .flat_map(move |event| stream::iter(frame_event(event, named_complete)))
        .map(Ok::<_, Infallible>)
}

/// Wrap an SSE stream in a response with relay headers.
pub fn sse_response<S>(stream: S, keep_alive: Option<Duration>) -> Response
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    let headers = [(CACHE_CONTROL, "no-cache"), (CONNECTION, "keep-alive")];

    match keep_alive {
        Some(interval) => (
            headers,
            Sse::new(stream).keep_alive(KeepAlive::new().interval(interval)),
        )
            .into_response(),
        None => (headers, Sse::new(stream)).into_response(),
    }
}
