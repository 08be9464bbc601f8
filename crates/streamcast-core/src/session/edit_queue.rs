//! Debounced, strictly ordered edit queue
//!
//! Bursts of flush requests collapse into one flush per debounce window.
//! Each flush runs in its own task that first awaits the previous flush's
//! task, so two edits are never in flight at once and they reach the
//! platform in request order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Result of one scheduled flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing to write (no message yet, or session no longer streaming)
    Skipped,
    /// Current message edited
    Written,
    /// Platform call failed; the next flush retries with fresher content
    Failed,
    /// A continuation message became current; `pending` when text is still
    /// waiting to be written into it
    Rolled { pending: bool },
}

impl FlushOutcome {
    fn needs_followup(self) -> bool {
        matches!(self, FlushOutcome::Rolled { pending: true })
    }
}

/// Performs a scheduled flush
#[async_trait]
pub trait Flusher: Send + Sync + 'static {
    async fn flush(&self) -> FlushOutcome;
}

#[derive(Default)]
struct Slots {
    /// Armed debounce timer, if any
    timer: Option<JoinHandle<()>>,
    /// Most recently enqueued flush
    tail: Option<JoinHandle<()>>,
    /// Set by `drain`; no timer is armed afterwards
    closed: bool,
}

struct QueueInner {
    flusher: Arc<dyn Flusher>,
    debounce: Duration,
    slots: Mutex<Slots>,
}

impl QueueInner {
    /// Debounce timer fired: chain a flush behind the current tail
    fn fire(inner: &Arc<QueueInner>) {
        let mut slots = inner.slots.lock();
        slots.timer = None;
        if slots.closed {
            return;
        }

        let previous = slots.tail.take();
        let job = Arc::clone(inner);
        slots.tail = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    warn!(error = %e, "Previous flush task did not complete");
                }
            }
            let outcome = job.flusher.flush().await;
            debug!(?outcome, "Scheduled flush finished");
            if outcome.needs_followup() {
                EditQueue { inner: job }.request_flush();
            }
        }));
    }
}

/// Rate-limited queue of edits against the current message
#[derive(Clone)]
pub struct EditQueue {
    inner: Arc<QueueInner>,
}

impl EditQueue {
    pub fn new(flusher: Arc<dyn Flusher>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                flusher,
                debounce,
                slots: Mutex::new(Slots::default()),
            }),
        }
    }

    /// Arm the debounce timer unless one is already pending.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn request_flush(&self) {
        let mut slots = self.inner.slots.lock();
        if slots.closed || slots.timer.is_some() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        slots.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            QueueInner::fire(&inner);
        }));
    }

    /// Whether a debounce timer is armed
    pub fn is_pending(&self) -> bool {
        self.inner.slots.lock().timer.is_some()
    }

    /// Close the queue, cancel the un-fired timer and wait for every flush
    /// already enqueued.
    pub async fn drain(&self) {
        let tail = {
            let mut slots = self.inner.slots.lock();
            slots.closed = true;
            if let Some(timer) = slots.timer.take() {
                timer.abort();
                debug!("Cancelled pending flush");
            }
            slots.tail.take()
        };

        if let Some(tail) = tail {
            if let Err(e) = tail.await {
                warn!(error = %e, "Flush task did not complete");
            }
        }
    }
}
