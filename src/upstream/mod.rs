//! Upstream chat-completion services.
//!
//! - [`backend`]: The `CompletionBackend` trait and request/fragment types
//! - [`openai`]: OpenAI-compatible HTTP streaming backend
//! - [`mock`]: Offline backends for demos and tests

pub mod backend;
pub mod mock;
pub mod openai;

pub use backend::{CompletionBackend, CompletionRequest, Fragment, FragmentStream};
