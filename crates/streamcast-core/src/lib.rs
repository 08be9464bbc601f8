//! Streamcast core library
//!
//! Renders an incrementally produced response as a live-updating chat message.
//! A [`StreamSession`] owns the text buffer and task cards, paces edits
//! through a debounced queue, rolls over into continuation messages when the
//! platform body limit is reached and keeps a typing indicator alive while
//! the response is streaming.

pub mod config;
pub mod error;
pub mod platform;
pub mod render;
pub mod session;

pub use config::StreamConfig;
pub use error::{SessionError, TransportError};
pub use platform::{MessageBody, MessageHandle, PlatformClient};
pub use render::{RenderedBody, RenderedField, Tone};
pub use session::{
    SessionState, SessionStats, StreamSession, TaskCard, TaskStatus, TaskUpdate,
};
