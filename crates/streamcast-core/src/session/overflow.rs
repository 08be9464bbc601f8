//! Overflow into continuation messages
//!
//! Decides at each flush whether the uncommitted text still fits the current
//! message or whether the message must be frozen and a continuation started.

use crate::config::StreamConfig;
use crate::platform::MessageHandle;
use crate::render::text::{byte_offset, char_len};

/// Messages belonging to one response. The last one is current; earlier ones
/// are frozen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageChain {
    handles: Vec<MessageHandle>,
}

impl MessageChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primary(&self) -> Option<&MessageHandle> {
        self.handles.first()
    }

    /// The only message still eligible for edits
    pub fn current(&self) -> Option<&MessageHandle> {
        self.handles.last()
    }

    pub fn push(&mut self, handle: MessageHandle) {
        self.handles.push(handle);
    }

    pub fn handles(&self) -> &[MessageHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// What a flush should do with the uncommitted text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPlan {
    /// Edit the current message with everything uncommitted
    InPlace,
    /// Write the first `head_bytes` into the current message, then continue
    /// in a new one
    Roll { head_bytes: usize },
}

#[derive(Debug, Clone)]
pub struct OverflowController {
    /// Chars a streaming message may hold before rolling over
    budget: usize,
}

impl OverflowController {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            budget: config.rollover_budget().max(1),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Final flushes never roll: no further edits follow, so the renderer
    /// hard-truncates instead.
    pub fn plan(&self, uncommitted: &str, is_final: bool) -> FlushPlan {
        if is_final || char_len(uncommitted) <= self.budget {
            return FlushPlan::InPlace;
        }
        FlushPlan::Roll {
            head_bytes: self.split_point(uncommitted),
        }
    }

    /// Byte offset to split at. Prefers a line break in the back quarter of
    /// the budget so paragraphs are not cut mid-line.
    fn split_point(&self, uncommitted: &str) -> usize {
        let hard = byte_offset(uncommitted, self.budget);
        let floor = byte_offset(uncommitted, self.budget - self.budget / 4);

        match uncommitted[..hard].rfind('\n') {
            Some(newline) if newline >= floor => newline + 1,
            _ => hard,
        }
    }
}
