//! Console platform client
//!
//! Stands in for a chat platform: every call is written as one JSON line,
//! so a replay can be inspected or piped into another tool.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use streamcast_core::{MessageBody, MessageHandle, PlatformClient, TransportError};

#[derive(Debug, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
enum ConsoleRecord<'a> {
    Post {
        target: &'a str,
        message: String,
        body: &'a MessageBody,
    },
    Edit {
        message: String,
        body: &'a MessageBody,
    },
    Presence {
        target: &'a str,
    },
    Reaction {
        message: String,
        symbol: &'a str,
    },
}

pub struct ConsoleClient<W> {
    out: Mutex<W>,
    next_id: AtomicUsize,
}

impl ConsoleClient<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleClient<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            next_id: AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn emit(&self, record: &ConsoleRecord<'_>) -> Result<(), TransportError> {
        let json = serde_json::to_string(record)
            .map_err(|e| TransportError::Connection(format!("failed to encode call: {}", e)))?;

        let mut out = self.out.lock();
        writeln!(out, "{}", json)
            .and_then(|()| out.flush())
            .map_err(|e| TransportError::Connection(e.to_string()))
    }
}

#[async_trait]
impl<W: Write + Send> PlatformClient for ConsoleClient<W> {
    fn name(&self) -> &str {
        "console"
    }

    async fn post_message(
        &self,
        target: &str,
        body: &MessageBody,
    ) -> Result<MessageHandle, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = MessageHandle::new(target, id.to_string());
        self.emit(&ConsoleRecord::Post {
            target,
            message: handle.to_string(),
            body,
        })?;
        Ok(handle)
    }

    async fn edit_message(
        &self,
        handle: &MessageHandle,
        body: &MessageBody,
    ) -> Result<(), TransportError> {
        self.emit(&ConsoleRecord::Edit {
            message: handle.to_string(),
            body,
        })
    }

    async fn send_presence(&self, target: &str) -> Result<(), TransportError> {
        self.emit(&ConsoleRecord::Presence { target })
    }

    async fn add_reaction(&self, handle: &MessageHandle, symbol: &str) -> Result<(), TransportError> {
        self.emit(&ConsoleRecord::Reaction {
            message: handle.to_string(),
            symbol,
        })
    }
}
