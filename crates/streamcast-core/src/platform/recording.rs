//! In-memory platform client
//!
//! Records every successful call and can be told to fail posts, edits or
//! presence signals. Used by the session tests and by downstream crates
//! that want to assert on what would have been sent.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{MessageBody, MessageHandle, PlatformClient};
use crate::error::TransportError;

/// Value for a failure budget that never runs out
const ALWAYS: usize = usize::MAX;

/// A call that reached the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Post {
        target: String,
        handle: MessageHandle,
        body: MessageBody,
    },
    Edit {
        handle: MessageHandle,
        body: MessageBody,
    },
    Presence {
        target: String,
    },
    Reaction {
        handle: MessageHandle,
        symbol: String,
    },
}

/// Number of upcoming calls of one kind that should fail
#[derive(Default)]
struct FailureBudget(AtomicUsize);

impl FailureBudget {
    fn set(&self, count: usize) {
        self.0.store(count, Ordering::SeqCst);
    }

    /// Consume one failure if any are left
    fn take(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                ALWAYS => Some(ALWAYS),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[derive(Default)]
pub struct RecordingClient {
    calls: Mutex<Vec<PlatformCall>>,
    next_id: AtomicUsize,
    post_failures: FailureBudget,
    edit_failures: FailureBudget,
    presence_failures: FailureBudget,
    presence_attempts: AtomicUsize,
    edits_in_flight: AtomicUsize,
    max_edits_in_flight: AtomicUsize,
    edit_latency: Mutex<Option<Duration>>,
    post_latency: Mutex<Option<Duration>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` posts
    pub fn fail_next_posts(&self, count: usize) {
        self.post_failures.set(count);
    }

    /// Fail the next `count` edits
    pub fn fail_next_edits(&self, count: usize) {
        self.edit_failures.set(count);
    }

    /// Fail every presence signal from now on
    pub fn fail_presence_always(&self) {
        self.presence_failures.set(ALWAYS);
    }

    /// Fail the next `count` presence signals
    pub fn fail_next_presence(&self, count: usize) {
        self.presence_failures.set(count);
    }

    /// Make every edit take `latency` before it completes
    pub fn with_edit_latency(self, latency: Duration) -> Self {
        *self.edit_latency.lock() = Some(latency);
        self
    }

    /// Make every post take `latency` before it completes or fails
    pub fn with_post_latency(self, latency: Duration) -> Self {
        *self.post_latency.lock() = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().clone()
    }

    /// Successful posts as (target, body)
    pub fn posts(&self) -> Vec<(String, MessageBody)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PlatformCall::Post { target, body, .. } => Some((target.clone(), body.clone())),
                _ => None,
            })
            .collect()
    }

    /// Successful edits as (handle, body)
    pub fn edits(&self) -> Vec<(MessageHandle, MessageBody)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PlatformCall::Edit { handle, body } => Some((handle.clone(), body.clone())),
                _ => None,
            })
            .collect()
    }

    /// Last body successfully written to `handle`, by post or edit
    pub fn latest_body(&self, handle: &MessageHandle) -> Option<MessageBody> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            PlatformCall::Edit { handle: h, body } if h == handle => Some(body.clone()),
            PlatformCall::Post { handle: h, body, .. } if h == handle => Some(body.clone()),
            _ => None,
        })
    }

    pub fn reactions(&self) -> Vec<(MessageHandle, String)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PlatformCall::Reaction { handle, symbol } => Some((handle.clone(), symbol.clone())),
                _ => None,
            })
            .collect()
    }

    /// Presence signals attempted, including failed ones
    pub fn presence_attempts(&self) -> usize {
        self.presence_attempts.load(Ordering::SeqCst)
    }

    /// Highest number of edits that were running at the same time
    pub fn max_concurrent_edits(&self) -> usize {
        self.max_edits_in_flight.load(Ordering::SeqCst)
    }

    fn rejected(operation: &str) -> TransportError {
        TransportError::Rejected {
            status: 503,
            message: format!("{} failure injected", operation),
        }
    }
}

#[async_trait]
impl PlatformClient for RecordingClient {
    fn name(&self) -> &str {
        "recording"
    }

    async fn post_message(
        &self,
        target: &str,
        body: &MessageBody,
    ) -> Result<MessageHandle, TransportError> {
        let latency = *self.post_latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.post_failures.take() {
            return Err(Self::rejected("post"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = MessageHandle::new(target, format!("msg-{}", id));
        self.calls.lock().push(PlatformCall::Post {
            target: target.to_string(),
            handle: handle.clone(),
            body: body.clone(),
        });
        Ok(handle)
    }

    async fn edit_message(
        &self,
        handle: &MessageHandle,
        body: &MessageBody,
    ) -> Result<(), TransportError> {
        let in_flight = self.edits_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_edits_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let latency = *self.edit_latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.edits_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.edit_failures.take() {
            return Err(Self::rejected("edit"));
        }
        self.calls.lock().push(PlatformCall::Edit {
            handle: handle.clone(),
            body: body.clone(),
        });
        Ok(())
    }

    async fn send_presence(&self, target: &str) -> Result<(), TransportError> {
        self.presence_attempts.fetch_add(1, Ordering::SeqCst);
        if self.presence_failures.take() {
            return Err(TransportError::Timeout);
        }
        self.calls.lock().push(PlatformCall::Presence {
            target: target.to_string(),
        });
        Ok(())
    }

    async fn add_reaction(&self, handle: &MessageHandle, symbol: &str) -> Result<(), TransportError> {
        self.calls.lock().push(PlatformCall::Reaction {
            handle: handle.clone(),
            symbol: symbol.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_budget_runs_out() {
        let client = RecordingClient::new();
        client.fail_next_posts(1);

        assert!(client.post_message("chan", &MessageBody::plain("a")).await.is_err());
        let handle = client.post_message("chan", &MessageBody::plain("b")).await.unwrap();

        assert_eq!(handle, MessageHandle::new("chan", "msg-1"));
        assert_eq!(client.posts().len(), 1);
    }

    #[tokio::test]
    async fn test_always_failing_presence_counts_attempts() {
        let client = RecordingClient::new();
        client.fail_presence_always();

        for _ in 0..3 {
            assert!(client.send_presence("chan").await.is_err());
        }
        assert_eq!(client.presence_attempts(), 3);
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_latest_body_prefers_edits() {
        let client = RecordingClient::new();
        let handle = client.post_message("chan", &MessageBody::plain("first")).await.unwrap();
        client.edit_message(&handle, &MessageBody::plain("second")).await.unwrap();

        assert_eq!(client.latest_body(&handle), Some(MessageBody::plain("second")));
    }
}
