//! HTTP server relaying completions over SSE.
//!
//! - [`routes`]: Request types, route handlers and router assembly
//! - [`streaming`]: SSE framing of relay events

pub mod routes;
pub mod streaming;
