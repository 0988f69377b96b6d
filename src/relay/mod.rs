//! Prompt relay core.
//!
//! - [`normalizer`]: Prompt / message history → canonical message list
//! - [`completion`]: Upstream stream → relay events, with disconnect handling

pub mod completion;
pub mod normalizer;

pub use completion::{CompletionRelay, ConnectionState, RelayEvent, RelayOutcome, RelaySettings};
pub use normalizer::{normalize, Message, MessageList, RequestInput, Role};
