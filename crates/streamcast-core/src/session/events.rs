//! Session events
//!
//! Lifecycle events are logged via tracing and folded into counters.

use parking_lot::Mutex;
use serde::Serialize;

use super::state::SessionState;
use crate::platform::MessageHandle;

/// Events during a streaming session
#[derive(Debug, Clone, Serialize)]
pub enum SessionEvent {
    /// Primary message posted
    Started { handle: MessageHandle },
    /// Primary message could not be posted
    StartFailed { error: String },
    /// Current message edited
    Flushed { handle: MessageHandle, chars: usize },
    /// Edit failed, next flush will try again
    FlushFailed { handle: MessageHandle, error: String },
    /// Continuation message became current
    Rolled {
        from: MessageHandle,
        to: MessageHandle,
        committed: usize,
    },
    /// Continuation message could not be posted
    RollFailed { error: String },
    /// No message existed at finalization, plain message posted instead
    FallbackPosted { handle: MessageHandle },
    /// Operation refused in the current state
    Rejected {
        operation: &'static str,
        state: SessionState,
    },
    /// Terminal transition completed
    Finalized { state: SessionState, messages: usize },
}

/// Counters accumulated over a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub flushes: usize,
    pub failed_flushes: usize,
    pub continuations: usize,
    pub failed_continuations: usize,
    pub fallback_posts: usize,
    pub rejected_calls: usize,
}

/// Event sink for one session
#[derive(Debug, Default)]
pub struct EventLog {
    stats: Mutex<SessionStats>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an event (logged via tracing)
    pub fn emit(&self, event: SessionEvent) {
        tracing::debug!("Session event: {:?}", event);

        let mut stats = self.stats.lock();
        match event {
            SessionEvent::Flushed { .. } => stats.flushes += 1,
            SessionEvent::FlushFailed { .. } => stats.failed_flushes += 1,
            SessionEvent::Rolled { .. } => stats.continuations += 1,
            SessionEvent::RollFailed { .. } => stats.failed_continuations += 1,
            SessionEvent::FallbackPosted { .. } => stats.fallback_posts += 1,
            SessionEvent::Rejected { .. } => stats.rejected_calls += 1,
            SessionEvent::Started { .. }
            | SessionEvent::StartFailed { .. }
            | SessionEvent::Finalized { .. } => {}
        }
    }

    pub fn stats(&self) -> SessionStats {
        *self.stats.lock()
    }
}
