//! chat-relay: streams chat completions to browsers over Server-Sent Events.
//!
//! A prompt or message history is normalized into a conversation, sent to an
//! OpenAI-compatible completion API, and every text fragment of the reply is
//! forwarded to the caller as an SSE record until the upstream finishes,
//! fails, or the client goes away.

pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod upstream;
