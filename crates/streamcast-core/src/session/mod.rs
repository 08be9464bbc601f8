//! Streaming session
//!
//! Ties the edit queue, overflow controller, renderer and typing indicator
//! together behind the public start / append / update / stop API.
//!
//! ## Module Structure
//! - `state`: lifecycle state and task cards
//! - `edit_queue`: debounced, strictly ordered flushes
//! - `overflow`: continuation messages and the message chain
//! - `typing`: typing indicator keepalive
//! - `events`: lifecycle events and counters

pub mod edit_queue;
pub mod events;
pub mod overflow;
pub mod state;
pub mod typing;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::error::SessionError;
use crate::platform::{MessageBody, MessageHandle, PlatformClient};
use crate::render::{char_len, ResponseRenderer, Tone};

use edit_queue::{EditQueue, FlushOutcome, Flusher};
use events::{EventLog, SessionEvent};
use overflow::{FlushPlan, MessageChain, OverflowController};
use typing::TypingPresence;

pub use events::SessionStats;
pub use state::{SessionState, TaskBoard, TaskCard, TaskStatus, TaskUpdate};

/// Details given to tasks still running when a session fails
const INTERRUPTED: &str = "Interrupted";

/// How a session ended
enum Finish<'a> {
    Complete,
    Error(&'a str),
}

fn error_footer(message: &str) -> String {
    format!("⚠️ Error: {}", message)
}

/// Mutable session data. Never held across an await.
struct SessionData {
    state: SessionState,
    text: String,
    /// Byte length of the prefix written into frozen messages
    committed_len: usize,
    tasks: TaskBoard,
    chain: MessageChain,
}

/// What a flush works from, captured under the lock
struct FlushSnapshot {
    current: MessageHandle,
    committed_len: usize,
    uncommitted: String,
    tasks: Vec<TaskCard>,
    is_continuation: bool,
}

/// Shared state and platform I/O; the edit queue flushes through this
struct SessionCore {
    client: Arc<dyn PlatformClient>,
    target: String,
    config: StreamConfig,
    renderer: ResponseRenderer,
    overflow: OverflowController,
    data: Mutex<SessionData>,
    /// True while the primary post is in flight
    starting: watch::Sender<bool>,
    events: EventLog,
}

impl SessionCore {
    fn snapshot(&self, is_final: bool) -> Option<FlushSnapshot> {
        let data = self.data.lock();
        let current = data.chain.current()?.clone();
        if !is_final && data.state != SessionState::Streaming {
            return None;
        }

        Some(FlushSnapshot {
            current,
            committed_len: data.committed_len,
            uncommitted: data.text[data.committed_len..].to_string(),
            tasks: data.tasks.cards().to_vec(),
            is_continuation: data.chain.len() > 1,
        })
    }

    /// Wait for an in-flight primary post to land in the chain (or fail)
    async fn wait_for_start(&self) {
        let mut starting = self.starting.subscribe();
        if starting.wait_for(|in_flight| !*in_flight).await.is_err() {
            debug!("Start signal closed");
        }
    }

    fn reject(&self, operation: &'static str, state: SessionState) {
        warn!(operation, %state, "Session already finalized, ignoring call");
        self.events.emit(SessionEvent::Rejected { operation, state });
    }

    async fn write(&self, handle: &MessageHandle, body: MessageBody) -> FlushOutcome {
        let chars = char_len(body.text());
        match self.client.edit_message(handle, &body).await {
            Ok(()) => {
                self.events.emit(SessionEvent::Flushed {
                    handle: handle.clone(),
                    chars,
                });
                FlushOutcome::Written
            }
            Err(e) => {
                warn!(
                    platform = self.client.name(),
                    message = %handle,
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to edit message, next flush will retry"
                );
                self.events.emit(SessionEvent::FlushFailed {
                    handle: handle.clone(),
                    error: e.to_string(),
                });
                FlushOutcome::Failed
            }
        }
    }

    async fn scheduled_flush(&self) -> FlushOutcome {
        let Some(snapshot) = self.snapshot(false) else {
            debug!("No message to flush into yet");
            return FlushOutcome::Skipped;
        };

        match self.overflow.plan(&snapshot.uncommitted, false) {
            FlushPlan::InPlace => {
                let display = if !snapshot.uncommitted.is_empty() {
                    snapshot.uncommitted.as_str()
                } else if snapshot.is_continuation {
                    self.config.continuation_text.as_str()
                } else {
                    self.config.placeholder_text.as_str()
                };
                let body = self
                    .renderer
                    .render(display, &snapshot.tasks, Tone::Streaming, None);
                self.write(&snapshot.current, MessageBody::Rich(body)).await
            }
            FlushPlan::Roll { head_bytes } => self.roll(snapshot, head_bytes).await,
        }
    }

    /// Freeze the current message with the head of the uncommitted text and
    /// make a fresh continuation message current.
    ///
    /// The commit only advances once both platform calls succeeded, so a
    /// failure leaves the text to be written by a later flush.
    async fn roll(&self, snapshot: FlushSnapshot, head_bytes: usize) -> FlushOutcome {
        let head = &snapshot.uncommitted[..head_bytes];
        let frozen = self.renderer.render(head, [], Tone::Streaming, None);
        if self.write(&snapshot.current, MessageBody::Rich(frozen)).await == FlushOutcome::Failed {
            return FlushOutcome::Failed;
        }

        let placeholder =
            self.renderer
                .render(&self.config.continuation_text, [], Tone::Streaming, None);
        match self
            .client
            .post_message(&self.target, &MessageBody::Rich(placeholder))
            .await
        {
            Ok(next) => {
                let mut data = self.data.lock();
                data.committed_len = data
                    .committed_len
                    .max(snapshot.committed_len + head_bytes);
                data.chain.push(next.clone());
                let pending = data.text.len() > data.committed_len;

                info!(
                    from = %snapshot.current,
                    to = %next,
                    committed = data.committed_len,
                    budget = self.overflow.budget(),
                    "Rolled over to a continuation message"
                );
                self.events.emit(SessionEvent::Rolled {
                    from: snapshot.current,
                    to: next,
                    committed: data.committed_len,
                });
                FlushOutcome::Rolled { pending }
            }
            Err(e) => {
                warn!(
                    platform = self.client.name(),
                    error = %e,
                    "Failed to post continuation message"
                );
                self.events.emit(SessionEvent::RollFailed {
                    error: e.to_string(),
                });
                FlushOutcome::Failed
            }
        }
    }

    /// Last write of the session, bypassing debounce and overflow splitting.
    /// Returns the message written to, or `None` when no message exists.
    async fn final_flush(&self, finish: &Finish<'_>) -> Option<MessageHandle> {
        let snapshot = self.snapshot(true)?;
        let (tone, footer) = match finish {
            Finish::Complete => (Tone::Complete, None),
            Finish::Error(message) => (Tone::Error, Some(error_footer(message))),
        };

        let body = self.renderer.render(
            &snapshot.uncommitted,
            &snapshot.tasks,
            tone,
            footer.as_deref(),
        );
        self.write(&snapshot.current, MessageBody::Rich(body)).await;
        Some(snapshot.current)
    }

    /// Post the buffered text as a plain message when streaming never got a
    /// message onto the platform.
    async fn post_fallback(&self, finish: &Finish<'_>) -> Option<MessageHandle> {
        let text = self.data.lock().text.trim().to_string();
        let content = match finish {
            Finish::Complete if text.is_empty() => {
                debug!("Nothing buffered, skipping fallback message");
                return None;
            }
            Finish::Complete => text,
            Finish::Error(message) if text.is_empty() => error_footer(message),
            Finish::Error(message) => format!("{}\n\n{}", text, error_footer(message)),
        };

        let body = MessageBody::plain(self.renderer.render_plain(&content));
        match self.client.post_message(&self.target, &body).await {
            Ok(handle) => {
                info!(message = %handle, "Posted fallback message");
                self.events.emit(SessionEvent::FallbackPosted {
                    handle: handle.clone(),
                });
                Some(handle)
            }
            Err(e) => {
                error!(
                    platform = self.client.name(),
                    error = %e,
                    "Failed to post fallback message, response is lost"
                );
                None
            }
        }
    }

    async fn add_feedback(&self, handle: &MessageHandle) {
        for symbol in &self.config.feedback_reactions {
            if let Err(e) = self.client.add_reaction(handle, symbol).await {
                debug!(message = %handle, symbol = %symbol, error = %e, "Failed to add reaction");
            }
        }
    }

    fn finalized(&self) {
        let (state, messages, primary) = {
            let data = self.data.lock();
            (data.state, data.chain.len(), data.chain.primary().cloned())
        };
        info!(%state, messages, primary = ?primary, "Session finalized");
        self.events.emit(SessionEvent::Finalized { state, messages });
    }
}

#[async_trait]
impl Flusher for SessionCore {
    async fn flush(&self) -> FlushOutcome {
        self.scheduled_flush().await
    }
}

/// One streamed response rendered as a chain of platform messages.
///
/// Drive it with [`start`](Self::start), any number of
/// [`append_text`](Self::append_text) / [`update_task`](Self::update_task)
/// calls, then exactly one of [`stop`](Self::stop) or
/// [`stop_with_error`](Self::stop_with_error). Mutating calls must be made
/// from within a Tokio runtime.
pub struct StreamSession {
    core: Arc<SessionCore>,
    queue: EditQueue,
    typing: TypingPresence,
}

impl StreamSession {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        target: impl Into<String>,
        config: StreamConfig,
    ) -> Self {
        let core = Arc::new(SessionCore {
            client: Arc::clone(&client),
            target: target.into(),
            renderer: ResponseRenderer::new(&config),
            overflow: OverflowController::new(&config),
            data: Mutex::new(SessionData {
                state: SessionState::Idle,
                text: String::new(),
                committed_len: 0,
                tasks: TaskBoard::new(),
                chain: MessageChain::new(),
            }),
            starting: watch::Sender::new(false),
            events: EventLog::new(),
            config,
        });

        let queue = EditQueue::new(core.clone(), core.config.debounce());
        let typing = TypingPresence::new(client, &core.config);

        Self {
            core,
            queue,
            typing,
        }
    }

    /// Post the primary message and start the typing indicator.
    ///
    /// Only a failed primary post is reported; the session then stays idle so
    /// a later [`stop`](Self::stop) can still deliver the buffered text.
    pub async fn start(&self) -> Result<(), SessionError> {
        {
            let mut data = self.core.data.lock();
            if data.state != SessionState::Idle || *self.core.starting.borrow() {
                warn!(state = %data.state, "start() called more than once, ignoring");
                return Ok(());
            }
            self.core.starting.send_replace(true);
        }

        self.typing.start(&self.core.target);

        let placeholder =
            self.core
                .renderer
                .render(&self.core.config.placeholder_text, [], Tone::Streaming, None);
        let posted = self
            .core
            .client
            .post_message(&self.core.target, &MessageBody::Rich(placeholder))
            .await;

        match posted {
            Ok(handle) => {
                let (state, has_content) = {
                    let mut data = self.core.data.lock();
                    data.chain.push(handle.clone());
                    if data.state == SessionState::Idle {
                        data.state = SessionState::Streaming;
                    }
                    self.core.starting.send_replace(false);
                    (data.state, !data.text.is_empty() || !data.tasks.is_empty())
                };

                // A concurrent stop finalizes into this message
                if state.is_terminal() {
                    debug!(
                        %state,
                        message = %handle,
                        "Session finalized while the primary post was in flight"
                    );
                    return Ok(());
                }

                info!(target = %self.core.target, message = %handle, "Streaming session started");
                self.core.events.emit(SessionEvent::Started { handle });
                if has_content {
                    self.queue.request_flush();
                }
                Ok(())
            }
            Err(e) => {
                self.typing.stop();
                self.core.starting.send_replace(false);
                error!(
                    platform = self.core.client.name(),
                    target = %self.core.target,
                    error = %e,
                    "Failed to post primary message"
                );
                self.core.events.emit(SessionEvent::StartFailed {
                    error: e.to_string(),
                });
                Err(SessionError::StartFailed(e))
            }
        }
    }

    /// Buffer more response text and schedule a flush.
    ///
    /// Text is buffered even before `start` succeeds so `stop` can still
    /// deliver it.
    pub fn append_text(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        {
            let mut data = self.core.data.lock();
            if data.state.is_terminal() {
                let state = data.state;
                drop(data);
                self.core.reject("append_text", state);
                return;
            }
            data.text.push_str(text);
        }
        self.queue.request_flush();
    }

    /// Insert or replace a task card
    pub fn update_task(&self, update: TaskUpdate) {
        let streaming = {
            let mut data = self.core.data.lock();
            if data.state.is_terminal() {
                let state = data.state;
                drop(data);
                self.core.reject("update_task", state);
                return;
            }
            data.tasks.upsert(update);
            data.state == SessionState::Streaming
        };
        if streaming {
            self.queue.request_flush();
        }
    }

    /// Finish the response.
    ///
    /// Appends `final_text`, waits for in-flight edits, then writes the final
    /// body once. Without a message on the platform the buffered text is
    /// posted as a plain message instead. `include_feedback` adds the
    /// configured reactions to the final message.
    pub async fn stop(&self, final_text: Option<&str>, include_feedback: bool) {
        {
            let mut data = self.core.data.lock();
            if data.state.is_terminal() {
                let state = data.state;
                drop(data);
                self.core.reject("stop", state);
                return;
            }
            if let Some(text) = final_text {
                data.text.push_str(text);
            }
            data.state = SessionState::Stopped;
        }

        self.core.wait_for_start().await;
        self.queue.drain().await;
        self.typing.stop();

        let finish = Finish::Complete;
        let last = match self.core.final_flush(&finish).await {
            Some(handle) => Some(handle),
            None => self.core.post_fallback(&finish).await,
        };
        if let Some(handle) = last.filter(|_| include_feedback) {
            self.core.add_feedback(&handle).await;
        }

        self.core.finalized();
    }

    /// Fail the response.
    ///
    /// Unfinished tasks are marked as interrupted and the final body shows the
    /// accumulated text followed by `message`.
    pub async fn stop_with_error(&self, message: &str) {
        {
            let mut data = self.core.data.lock();
            if data.state.is_terminal() {
                let state = data.state;
                drop(data);
                self.core.reject("stop_with_error", state);
                return;
            }
            let interrupted = data.tasks.interrupt_unfinished(INTERRUPTED);
            if interrupted > 0 {
                debug!(interrupted, "Marked unfinished tasks as interrupted");
            }
            data.state = SessionState::Error;
        }

        self.core.wait_for_start().await;
        self.typing.stop();
        self.queue.drain().await;

        let finish = Finish::Error(message);
        if self.core.final_flush(&finish).await.is_none() {
            self.core.post_fallback(&finish).await;
        }

        self.core.finalized();
    }

    pub fn state(&self) -> SessionState {
        self.core.data.lock().state
    }

    /// Everything appended so far
    pub fn text(&self) -> String {
        self.core.data.lock().text.clone()
    }

    /// Byte length of the text prefix frozen into earlier messages
    pub fn committed_len(&self) -> usize {
        self.core.data.lock().committed_len
    }

    /// All task cards in insertion order, including ones not rendered
    pub fn tasks(&self) -> Vec<TaskCard> {
        self.core.data.lock().tasks.cards().to_vec()
    }

    pub fn task(&self, id: &str) -> Option<TaskCard> {
        self.core.data.lock().tasks.get(id).cloned()
    }

    /// Messages of this response, primary first
    pub fn chain(&self) -> Vec<MessageHandle> {
        self.core.data.lock().chain.handles().to_vec()
    }

    pub fn stats(&self) -> SessionStats {
        self.core.events.stats()
    }

    pub fn target(&self) -> &str {
        &self.core.target
    }

    pub fn is_typing(&self) -> bool {
        self.typing.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::RecordingClient;
    use crate::render::RenderedBody;
    use std::time::Duration;

    fn session_with(client: &Arc<RecordingClient>, config: StreamConfig) -> StreamSession {
        StreamSession::new(client.clone(), "chan", config)
    }

    fn session(client: &Arc<RecordingClient>) -> StreamSession {
        session_with(client, StreamConfig::default())
    }

    fn small_config() -> StreamConfig {
        StreamConfig {
            body_limit: 100,
            safety_margin: 20,
            ..StreamConfig::default()
        }
    }

    fn rich(body: MessageBody) -> RenderedBody {
        match body {
            MessageBody::Rich(body) => body,
            other => panic!("expected rich body, got {:?}", other),
        }
    }

    fn chain_text(client: &RecordingClient, session: &StreamSession) -> String {
        session
            .chain()
            .iter()
            .map(|handle| client.latest_body(handle).unwrap().text().to_string())
            .collect()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(600)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_stop_writes_once() {
        let client = Arc::new(RecordingClient::new());
        let session = session(&client);

        session.start().await.unwrap();
        session.append_text("Hel");
        session.append_text("lo world");
        session.stop(None, false).await;

        let edits = client.edits();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].0, session.chain()[0]);
        let body = rich(edits[0].1.clone());
        assert_eq!(body.text, "Hello world");
        assert_eq!(body.tone, Tone::Complete);
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_primary_shows_placeholder() {
        let client = Arc::new(RecordingClient::new());
        let session = session(&client);

        session.start().await.unwrap();

        let posts = client.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "chan");
        assert_eq!(posts[0].1.text(), "Thinking…");
        assert_eq!(session.state(), SessionState::Streaming);
        assert!(session.is_typing());

        session.stop(None, false).await;
        assert!(!session.is_typing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_edit() {
        let client = Arc::new(RecordingClient::new());
        let session = session(&client);

        session.start().await.unwrap();
        for word in ["one ", "two ", "three ", "four ", "five"] {
            session.append_text(word);
        }
        settle().await;

        let edits = client.edits();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].1.text(), "one two three four five");
        assert_eq!(rich(edits[0].1.clone()).tone, Tone::Streaming);

        session.stop(None, false).await;
        assert_eq!(client.edits().len(), 2);
        assert_eq!(session.stats().flushes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_appends_before_start_flush_after_start() {
        let client = Arc::new(RecordingClient::new());
        let session = session(&client);

        session.append_text("early");
        session.start().await.unwrap();
        settle().await;

        let primary = session.chain()[0].clone();
        assert_eq!(client.latest_body(&primary).unwrap().text(), "early");
        session.stop(None, false).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_rolls_into_continuation() {
        let client = Arc::new(RecordingClient::new());
        let session = session_with(&client, small_config());

        session.start().await.unwrap();
        session.append_text(&"a".repeat(50));
        settle().await;
        session.append_text(&"b".repeat(40));
        settle().await;

        assert_eq!(session.chain().len(), 2);
        assert_eq!(session.committed_len(), 80);
        assert_eq!(client.posts()[1].1.text(), "Continuing…");

        session.stop(None, false).await;

        assert_eq!(client.posts().len(), 2);
        assert_eq!(chain_text(&client, &session), session.text());
        assert_eq!(session.stats().continuations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frozen_message_has_no_fields() {
        let client = Arc::new(RecordingClient::new());
        let session = session_with(&client, small_config());

        session.start().await.unwrap();
        session.update_task(TaskUpdate::new("t1", "Search", TaskStatus::InProgress));
        session.append_text(&"x".repeat(90));
        settle().await;
        session.stop(None, false).await;

        let chain = session.chain();
        assert_eq!(chain.len(), 2);
        assert!(rich(client.latest_body(&chain[0]).unwrap()).fields.is_empty());
        assert_eq!(rich(client.latest_body(&chain[1]).unwrap()).fields.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_continuation_retries_without_loss() {
        let client = Arc::new(RecordingClient::new());
        let session = session_with(&client, small_config());

        session.start().await.unwrap();
        client.fail_next_posts(1);
        session.append_text(&"a".repeat(90));
        settle().await;

        assert_eq!(session.committed_len(), 0);
        assert_eq!(session.chain().len(), 1);
        assert_eq!(session.stats().failed_continuations, 1);

        session.append_text("z");
        settle().await;
        assert_eq!(session.committed_len(), 80);
        assert_eq!(session.chain().len(), 2);

        session.stop(None, false).await;
        assert_eq!(chain_text(&client, &session), session.text());
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_never_moves_backwards() {
        let client = Arc::new(RecordingClient::new());
        let session = session_with(&client, small_config());

        session.start().await.unwrap();
        let mut last = 0;
        for _ in 0..6 {
            session.append_text(&"c".repeat(45));
            settle().await;
            let committed = session.committed_len();
            assert!(committed >= last);
            last = committed;
        }
        session.stop(None, false).await;

        assert!(session.committed_len() >= last);
        assert_eq!(chain_text(&client, &session), session.text());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_falls_back_to_plain_message() {
        let client = Arc::new(RecordingClient::new());
        client.fail_next_posts(1);
        let session = session(&client);

        session.append_text("hello");
        let result = session.start().await;
        assert!(matches!(result, Err(SessionError::StartFailed(_))));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_typing());

        session.stop(None, false).await;

        let posts = client.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1, MessageBody::plain("hello"));
        assert!(client.edits().is_empty());
        assert_eq!(session.stats().fallback_posts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_start_finalizes_primary() {
        let client =
            Arc::new(RecordingClient::new().with_post_latency(Duration::from_millis(300)));
        let session = session(&client);

        session.append_text("hello");
        let (started, ()) = tokio::join!(session.start(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.stop(None, false).await;
        });

        assert!(started.is_ok());
        assert_eq!(session.state(), SessionState::Stopped);

        let posts = client.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].1.text(), "Thinking…");

        let primary = session.chain()[0].clone();
        let body = rich(client.latest_body(&primary).unwrap());
        assert_eq!(body.text, "hello");
        assert_eq!(body.tone, Tone::Complete);
        assert_eq!(session.stats().fallback_posts, 0);
        assert!(!session.is_typing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_during_start_finalizes_primary() {
        let client =
            Arc::new(RecordingClient::new().with_post_latency(Duration::from_millis(300)));
        let session = session(&client);

        session.append_text("half");
        let (started, ()) = tokio::join!(session.start(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.stop_with_error("cancelled").await;
        });

        assert!(started.is_ok());
        assert_eq!(client.posts().len(), 1);
        let body = rich(client.latest_body(&session.chain()[0]).unwrap());
        assert_eq!(body.text, "half\n\n⚠️ Error: cancelled");
        assert_eq!(body.tone, Tone::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_during_stop_falls_back() {
        let client =
            Arc::new(RecordingClient::new().with_post_latency(Duration::from_millis(300)));
        client.fail_next_posts(1);
        let session = session(&client);

        session.append_text("hello");
        let (started, ()) = tokio::join!(session.start(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.stop(None, false).await;
        });

        assert!(started.is_err());
        assert_eq!(client.posts(), vec![("chan".to_string(), MessageBody::plain("hello"))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_text_or_message_posts_nothing() {
        let client = Arc::new(RecordingClient::new());
        let session = session(&client);

        session.stop(None, false).await;

        assert!(client.calls().is_empty());
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let client = Arc::new(RecordingClient::new());
        let session = session(&client);

        session.start().await.unwrap();
        session.append_text("done");
        session.stop(None, false).await;
        let calls = client.calls().len();

        session.stop(Some("again"), true).await;
        session.stop_with_error("late").await;

        assert_eq!(client.calls().len(), calls);
        assert_eq!(session.text(), "done");
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.stats().rejected_calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutations_after_stop_are_rejected() {
        let client = Arc::new(RecordingClient::new());
        let session = session(&client);

        session.start().await.unwrap();
        session.stop(Some("final"), false).await;
        session.append_text(" more");
        session.update_task(TaskUpdate::new("t1", "Late", TaskStatus::Pending));
        settle().await;

        assert_eq!(session.text(), "final");
        assert!(session.tasks().is_empty());
        assert_eq!(client.edits().len(), 1);
        assert_eq!(session.stats().rejected_calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_posts_once() {
        let client = Arc::new(RecordingClient::new());
        let session = session(&client);

        session.start().await.unwrap();
        session.start().await.unwrap();

        assert_eq!(client.posts().len(), 1);
        session.stop(None, false).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_field_cap_keeps_all_tasks() {
        let client = Arc::new(RecordingClient::new());
        let session = session(&client);

        session.start().await.unwrap();
        for i in 0..30 {
            session.update_task(TaskUpdate::new(
                format!("t{}", i),
                format!("Step {}", i),
                TaskStatus::Complete,
            ));
        }
        session.stop(None, false).await;

        let body = rich(client.latest_body(&session.chain()[0]).unwrap());
        assert_eq!(body.fields.len(), 25);
        assert_eq!(body.fields[0].name, "✅ Step 0");
        assert_eq!(session.tasks().len(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_update_replaces_in_place() {
        let client = Arc::new(RecordingClient::new());
        let session = session(&client);

        session.start().await.unwrap();
        session.update_task(TaskUpdate::new("a", "First", TaskStatus::InProgress));
        session.append_text("working");
        session.update_task(TaskUpdate::new("b", "Second", TaskStatus::Pending));
        session.update_task(
            TaskUpdate::new("a", "First", TaskStatus::Complete).with_output("ok"),
        );
        settle().await;

        // Text and task updates in one window share a single edit
        assert_eq!(client.edits().len(), 1);

        let tasks = session.tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, "a");
        assert_eq!(tasks[0].status, TaskStatus::Complete);

        let body = rich(client.latest_body(&session.chain()[0]).unwrap());
        assert_eq!(body.text, "working");
        assert_eq!(body.fields.len(), 2);
        assert!(body.fields[0].value.contains("ok"));
        session.stop(None, false).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_with_error_interrupts_tasks() {
        let client = Arc::new(RecordingClient::new());
        let session = session(&client);

        session.start().await.unwrap();
        session.update_task(TaskUpdate::new("t1", "Fetch", TaskStatus::InProgress));
        session.update_task(TaskUpdate::new("t2", "Parse", TaskStatus::Complete));
        session.append_text("partial");
        session.stop_with_error("boom").await;

        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(session.task("t1").unwrap().status, TaskStatus::Error);
        assert_eq!(session.task("t2").unwrap().status, TaskStatus::Complete);

        let body = rich(client.latest_body(&session.chain()[0]).unwrap());
        assert_eq!(body.tone, Tone::Error);
        assert_eq!(body.text, "partial\n\n⚠️ Error: boom");
        assert!(body.fields[0].value.contains("Interrupted"));
        assert!(!session.is_typing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_before_start_posts_plain_error() {
        let client = Arc::new(RecordingClient::new());
        let session = session(&client);

        session.append_text("half");
        session.stop_with_error("model unavailable").await;

        let posts = client.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(
            posts[0].1,
            MessageBody::plain("half\n\n⚠️ Error: model unavailable")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_feedback_reactions_on_final_message() {
        let client = Arc::new(RecordingClient::new());
        let session = session_with(&client, small_config());

        session.start().await.unwrap();
        session.append_text(&"r".repeat(90));
        settle().await;
        session.stop(Some(" end"), true).await;

        let last = session.chain().last().cloned().unwrap();
        let reactions = client.reactions();
        assert_eq!(reactions.len(), 2);
        assert!(reactions.iter().all(|(handle, _)| *handle == last));
        assert_eq!(reactions[0].1, "👍");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_edit_heals_on_next_flush() {
        let client = Arc::new(RecordingClient::new());
        let session = session(&client);

        session.start().await.unwrap();
        client.fail_next_edits(1);
        session.append_text("one");
        settle().await;
        assert!(client.edits().is_empty());

        session.append_text(" two");
        settle().await;

        assert_eq!(client.edits()[0].1.text(), "one two");
        let stats = session.stats();
        assert_eq!(stats.failed_flushes, 1);
        assert_eq!(stats.flushes, 1);
        session.stop(None, false).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_edits_never_overlap() {
        let client =
            Arc::new(RecordingClient::new().with_edit_latency(Duration::from_millis(1_500)));
        let session = session(&client);

        session.start().await.unwrap();
        for i in 0..8 {
            session.append_text(&format!("chunk {} ", i));
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        session.stop(None, false).await;

        assert_eq!(client.max_concurrent_edits(), 1);
        assert_eq!(
            client.latest_body(&session.chain()[0]).unwrap().text(),
            session.text()
        );
    }
}
