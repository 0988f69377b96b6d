//! Request normalization: turns a prompt or a message history into the
//! canonical conversation sent upstream.
//!
//! The only mutation ever applied is prepending a system message when the
//! conversation has none. Content is not trimmed and unknown roles are kept
//! verbatim so newer upstream roles pass through.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Author of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Any role string the relay does not know about.
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Other(role) => role.as_str(),
        }
    }
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        match role.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Other(role),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Canonical conversation: ordered, with a system message present.
pub type MessageList = Vec<Message>;

/// The two request shapes the relay accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestInput {
    /// A single free-text prompt.
    Prompt(String),
    /// A pre-built conversation in order.
    Messages(Vec<Message>),
}

impl RequestInput {
    /// Pick the input shape from the optional parts of an HTTP request.
    ///
    /// A non-empty message list takes precedence over a prompt.
    pub fn from_parts(
        prompt: Option<String>,
        messages: Vec<Message>,
    ) -> Result<Self, ValidationError> {
        if !messages.is_empty() {
            return Ok(RequestInput::Messages(messages));
        }
        match prompt {
            Some(prompt) => Ok(RequestInput::Prompt(prompt)),
            None => Err(ValidationError::EmptyRequest),
        }
    }
}

/// Produce the canonical message list for `input`.
pub fn normalize(input: RequestInput, system_prompt: &str) -> Result<MessageList, ValidationError> {
    match input {
        RequestInput::Prompt(prompt) => {
            Ok(vec![Message::system(system_prompt), Message::user(prompt)])
        }
        RequestInput::Messages(messages) if messages.is_empty() => {
            Err(ValidationError::EmptyRequest)
        }
        RequestInput::Messages(mut messages) => {
            if !messages.iter().any(|m| m.role == Role::System) {
                messages.insert(0, Message::system(system_prompt));
            }
            Ok(messages)
        }
    }
}
