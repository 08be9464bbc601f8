//! Drives a streaming session from a parsed script

use std::sync::Arc;
use std::time::Duration;

use streamcast_core::{PlatformClient, SessionState, SessionStats, StreamConfig, StreamSession};
use tracing::{debug, warn};

use crate::script::{self, Step};

/// How script text is fed into the session
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct ReplaySummary {
    pub state: SessionState,
    pub messages: usize,
    pub stats: SessionStats,
}

pub struct Replay {
    session: StreamSession,
    pacing: Pacing,
    feedback: bool,
}

impl Replay {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        target: impl Into<String>,
        config: StreamConfig,
        pacing: Pacing,
        feedback: bool,
    ) -> Self {
        Self {
            session: StreamSession::new(client, target, config),
            pacing,
            feedback,
        }
    }

    pub async fn run(self, steps: Vec<Step>) -> ReplaySummary {
        // A failed start still lets `stop` deliver the text as a plain message
        if let Err(e) = self.session.start().await {
            warn!(error = %e, "Continuing without a live message");
        }

        let mut failed = false;
        for step in steps {
            match step {
                Step::Text(text) => {
                    for chunk in script::chunks(&text, self.pacing.chunk_size) {
                        self.session.append_text(chunk);
                        tokio::time::sleep(self.pacing.chunk_delay).await;
                    }
                }
                Step::Task(update) => {
                    debug!(task = %update.id, status = ?update.status, "Task update");
                    self.session.update_task(update);
                }
                Step::Sleep(duration) => tokio::time::sleep(duration).await,
                Step::Error(message) => {
                    self.session.stop_with_error(&message).await;
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            self.session.stop(None, self.feedback).await;
        }

        ReplaySummary {
            state: self.session.state(),
            messages: self.session.chain().len(),
            stats: self.session.stats(),
        }
    }
}
