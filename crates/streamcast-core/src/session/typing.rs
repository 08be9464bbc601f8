//! Typing presence keepalive
//!
//! Keeps the "typing" indicator alive while a response streams. The task
//! stops on its own after a hard TTL or after too many consecutive failed
//! signals; presence errors never affect the stream itself.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::platform::PlatformClient;

struct Keepalive {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of the keepalive task for one session
pub struct TypingPresence {
    client: Arc<dyn PlatformClient>,
    interval: Duration,
    ttl: Duration,
    max_failures: u32,
    failures: Arc<AtomicU32>,
    keepalive: Mutex<Option<Keepalive>>,
}

impl TypingPresence {
    pub fn new(client: Arc<dyn PlatformClient>, config: &StreamConfig) -> Self {
        Self {
            client,
            interval: config.typing_interval(),
            ttl: config.typing_ttl(),
            max_failures: config.typing_max_failures,
            failures: Arc::new(AtomicU32::new(0)),
            keepalive: Mutex::new(None),
        }
    }

    /// Signal immediately, then every interval until stopped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, target: &str) {
        let mut keepalive = self.keepalive.lock();
        if keepalive.as_ref().is_some_and(|k| !k.handle.is_finished()) {
            debug!(target = %target, "Typing keepalive already running");
            return;
        }

        self.failures.store(0, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_keepalive(
            Arc::clone(&self.client),
            target.to_string(),
            cancel.clone(),
            self.interval,
            self.ttl,
            self.max_failures,
            Arc::clone(&self.failures),
        ));
        *keepalive = Some(Keepalive { cancel, handle });
    }

    /// Stop signalling. Safe to call any number of times.
    pub fn stop(&self) {
        if let Some(keepalive) = self.keepalive.lock().take() {
            keepalive.cancel.cancel();
        }
        self.failures.store(0, Ordering::SeqCst);
    }

    /// Whether the keepalive task is still signalling
    pub fn is_running(&self) -> bool {
        self.keepalive
            .lock()
            .as_ref()
            .is_some_and(|k| !k.cancel.is_cancelled() && !k.handle.is_finished())
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}

impl Drop for TypingPresence {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_keepalive(
    client: Arc<dyn PlatformClient>,
    target: String,
    cancel: CancellationToken,
    interval: Duration,
    ttl: Duration,
    max_failures: u32,
    failures: Arc<AtomicU32>,
) {
    let started = Instant::now();
    // First tick completes immediately
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if started.elapsed() >= ttl {
                    warn!(target = %target, ttl_ms = ttl.as_millis() as u64, "Typing indicator hit its TTL, stopping");
                    break;
                }

                match client.send_presence(&target).await {
                    Ok(()) => {
                        failures.store(0, Ordering::SeqCst);
                    }
                    Err(e) => {
                        let count = failures.fetch_add(1, Ordering::SeqCst) + 1;
                        debug!(target = %target, error = %e, failures = count, "Typing signal failed");
                        if count >= max_failures {
                            warn!(
                                target = %target,
                                platform = client.name(),
                                failures = count,
                                "Typing signal keeps failing, giving up on the indicator"
                            );
                            break;
                        }
                    }
                }
            }
        }
    }

    info!(target = %target, "Typing keepalive stopped");
}
