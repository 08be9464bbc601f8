//! Platform client interface
//!
//! The session never talks to a chat API directly. Each platform implements
//! [`PlatformClient`] and maps a [`MessageBody`] onto its own wire format
//! (embed, blocks, plain content, ...).

pub mod recording;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::render::RenderedBody;

pub use recording::{PlatformCall, RecordingClient};

/// Opaque reference to a message posted on the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    /// Channel (or chat) the message lives in
    pub channel: String,
    /// Platform message id
    pub id: String,
}

impl MessageHandle {
    pub fn new(channel: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.id)
    }
}

/// Payload of a post or edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    /// Structured body with named fields
    Rich(RenderedBody),
    /// Plain text content, used for fallback posts
    Plain { text: String },
}

impl MessageBody {
    pub fn plain(text: impl Into<String>) -> Self {
        MessageBody::Plain { text: text.into() }
    }

    /// Display text of the body, ignoring fields
    pub fn text(&self) -> &str {
        match self {
            MessageBody::Rich(body) => &body.text,
            MessageBody::Plain { text } => text,
        }
    }
}

/// Chat platform operations used by a streaming session
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Platform name, used in logs
    fn name(&self) -> &str;

    /// Post a new message to `target` and return its handle
    async fn post_message(
        &self,
        target: &str,
        body: &MessageBody,
    ) -> Result<MessageHandle, TransportError>;

    /// Replace the body of an existing message
    async fn edit_message(
        &self,
        handle: &MessageHandle,
        body: &MessageBody,
    ) -> Result<(), TransportError>;

    /// Show the "typing" indicator on `target`
    async fn send_presence(&self, target: &str) -> Result<(), TransportError>;

    /// Add a reaction to a message (optional, defaults to no-op)
    async fn add_reaction(
        &self,
        _handle: &MessageHandle,
        _symbol: &str,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}
