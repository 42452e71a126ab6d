//! SyncSession - the main interface for lpsync.
//!
//! This module provides [`SyncSession`], which turns three request/response
//! collaborators into one ordered stream of messages: the backlog first, then
//! live messages as they arrive.
//!
//! # Architecture
//!
//! SyncSession uses a pure state machine (from sync-core) for lifecycle logic
//! and a single background worker that interprets its actions to perform the
//! actual I/O via the Transport trait.
//!
//! ```text
//! Application ◄── MessageStream ◄── broadcast ◄── worker → Transport
//!                                                   ↓
//!                                       sync-core (pure state machine)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use lpsync_client::{Credentials, SessionConfig, SyncSession};
//!
//! let credentials = Credentials::new(UserId::new(42), Permissions::MESSAGES);
//! let session = SyncSession::new(transport, &credentials, SessionConfig::default())?;
//!
//! let mut stream = session.subscribe();
//! while let Some(item) = stream.next().await {
//!     let message = item?;
//!     println!("{} {}: {}", message.id, message.from_user_id, message.body);
//!     if let Some(resume) = stream.resume_point() {
//!         store.save(resume)?;
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lpsync_core::{CursorTracker, Event, ResumePoint, RetryPolicy, SessionState, SyncCursor};
use lpsync_types::{MessageId, Permissions, PollMode, UserId};
use tokio::sync::{broadcast, watch};

use crate::error::SessionError;
use crate::history::HistoryConfig;
use crate::poll::DEFAULT_WAIT_SECS;
use crate::stream::{MessageStream, StreamItem};
use crate::transport::Transport;
use crate::worker::{Outlet, Worker};

/// Default number of messages buffered per subscriber.
pub const DEFAULT_STREAM_CAPACITY: usize = 1024;

/// Who the session runs as.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Authenticated user, `None` when not signed in.
    pub user_id: Option<UserId>,
    /// Permissions granted to the access token.
    pub permissions: Permissions,
}

impl Credentials {
    /// Credentials for a signed-in user.
    pub fn new(user_id: UserId, permissions: Permissions) -> Self {
        Self {
            user_id: Some(user_id),
            permissions,
        }
    }

    /// Credentials that are not signed in.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Configuration for SyncSession.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Seconds the poll server may hold a request open.
    pub wait_secs: u32,
    /// Extra data requested with each poll.
    pub mode: PollMode,
    /// History page parameters.
    pub history: HistoryConfig,
    /// Retry budget for each history page.
    pub retry: RetryPolicy,
    /// Where to continue from, if this is not the first run.
    pub resume: Option<ResumePoint>,
    /// Messages buffered per subscriber before it lags.
    pub stream_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            wait_secs: DEFAULT_WAIT_SECS,
            mode: PollMode::default(),
            history: HistoryConfig::default(),
            retry: RetryPolicy::default(),
            resume: None,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Set the server wait timeout.
    pub fn with_wait_secs(mut self, wait_secs: u32) -> Self {
        self.wait_secs = wait_secs;
        self
    }

    /// Set the poll mode flags.
    pub fn with_mode(mut self, mode: PollMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the history page parameters.
    pub fn with_history(mut self, history: HistoryConfig) -> Self {
        self.history = history;
        self
    }

    /// Set the history retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Continue from a persisted resume point.
    pub fn with_resume(mut self, resume: ResumePoint) -> Self {
        self.resume = Some(resume);
        self
    }

    /// Set the per-subscriber buffer size.
    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity;
        self
    }
}

/// A long-poll message sync session.
///
/// The background worker starts on the first [`subscribe`](Self::subscribe)
/// or on [`start`](Self::start), whichever comes first, and must be created
/// inside a tokio runtime.
pub struct SyncSession<T: Transport + 'static> {
    transport: Arc<T>,
    config: SessionConfig,
    messages: broadcast::Sender<StreamItem>,
    state: Arc<watch::Sender<SessionState>>,
    cursor: Arc<watch::Sender<CursorTracker>>,
    cancel: watch::Sender<bool>,
    started: AtomicBool,
}

impl<T: Transport + 'static> SyncSession<T> {
    /// Create a new session.
    ///
    /// Fails without any I/O if the credentials are not signed in or lack
    /// the messages permission, or if the configuration is unusable.
    pub fn new(
        transport: T,
        credentials: &Credentials,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        if credentials.user_id.is_none() {
            return Err(SessionError::Precondition(
                "credentials carry no user id".into(),
            ));
        }
        if !credentials.permissions.contains(Permissions::MESSAGES) {
            return Err(SessionError::Precondition(
                "credentials lack the messages permission".into(),
            ));
        }
        if config.stream_capacity == 0 {
            return Err(SessionError::Config(
                "stream capacity must be at least 1".into(),
            ));
        }

        let tracker = match config.resume {
            Some(resume) => CursorTracker::with_resume(resume),
            None => CursorTracker::new(),
        };
        let (messages, _) = broadcast::channel(config.stream_capacity);
        let (state, _) = watch::channel(SessionState::Idle);
        let (cursor, _) = watch::channel(tracker);
        let (cancel, _) = watch::channel(false);

        Ok(Self {
            transport: Arc::new(transport),
            config,
            messages,
            state: Arc::new(state),
            cursor: Arc::new(cursor),
            cancel,
            started: AtomicBool::new(false),
        })
    }

    /// Subscribe to the message stream, starting the worker if needed.
    ///
    /// A subscriber sees messages published after it subscribed; there is no
    /// replay. Subscribing to an ended session yields an empty stream.
    pub fn subscribe(&self) -> MessageStream {
        let receiver = self.messages.subscribe();
        if self.state().is_terminated() {
            return MessageStream::ended(receiver);
        }
        self.start();
        MessageStream::new(receiver)
    }

    /// Start the worker. Starting twice is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let outlet = Outlet {
            messages: self.messages.clone(),
            state: Arc::clone(&self.state),
            cursor: Arc::clone(&self.cursor),
        };
        let worker = Worker::new(
            Arc::clone(&self.transport),
            self.config.clone(),
            outlet,
            self.cancel.subscribe(),
        );
        tokio::spawn(worker.run());
    }

    /// Cancel the session. The stream ends cleanly after any in-flight
    /// message; no further collaborator calls are made.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);

        // Never started: end here, no worker will
        if !self.started.swap(true, Ordering::SeqCst) {
            let (state, _) = SessionState::Idle.on_event(Event::Cancel);
            self.state.send_replace(state);
            let _ = self.messages.send(StreamItem::Completed);
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Watch cursor updates. Each value is a snapshot taken by the worker.
    pub fn watch_cursor(&self) -> watch::Receiver<CursorTracker> {
        self.cursor.subscribe()
    }

    /// Wait until the session has terminated and return the final state.
    pub async fn finished(&self) -> SessionState {
        let mut state = self.state.subscribe();
        let terminated = state
            .wait_for(SessionState::is_terminated)
            .await
            .map(|final_state| *final_state);
        terminated.unwrap_or_else(|_| self.state())
    }

    /// Snapshot of both cursors.
    pub fn cursor(&self) -> SyncCursor {
        self.cursor.borrow().snapshot()
    }

    /// Highest message id delivered so far.
    pub fn max_message_id(&self) -> Option<MessageId> {
        self.cursor.borrow().max_message_id()
    }

    /// The worker's current position.
    ///
    /// This can run ahead of what a subscriber has handled. To persist after
    /// each processed message, use [`MessageStream::resume_point`] instead.
    pub fn resume_point(&self) -> ResumePoint {
        self.cursor.borrow().resume_point()
    }

    /// The configuration this session runs with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl<T: Transport + 'static> Drop for SyncSession<T> {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, StreamError};
    use crate::transport::{MockTransport, TransportError};
    use lpsync_core::Termination;
    use lpsync_types::{Message, SequenceCursor, TimeCursor};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn credentials() -> Credentials {
        Credentials::new(UserId::new(42), Permissions::MESSAGES | Permissions::FRIENDS)
    }

    fn fast_config() -> SessionConfig {
        SessionConfig::default().with_retry(
            RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40))
                .with_jitter(Duration::ZERO),
        )
    }

    fn server(pts: u64) -> Value {
        json!({ "key": "k", "server": "im.example/nim1", "ts": 1700, "pts": pts })
    }

    fn page(pts: u64, more: bool, ids: &[u64]) -> Value {
        let messages: Vec<Value> = ids
            .iter()
            .map(|id| {
                json!({ "id": id, "user_id": 7, "date": 1000 + id, "body": format!("m{}", id) })
            })
            .collect();
        json!({ "new_pts": pts, "more": if more { 1 } else { 0 }, "messages": messages })
    }

    fn session(transport: &MockTransport, config: SessionConfig) -> SyncSession<MockTransport> {
        SyncSession::new(transport.clone(), &credentials(), config).unwrap()
    }

    async fn next_id(stream: &mut MessageStream) -> u64 {
        match stream.next().await {
            Some(Ok(message)) => message.id.value(),
            other => panic!("Expected message, got {:?}", other),
        }
    }

    async fn wait_for_state(session: &SyncSession<MockTransport>, wanted: SessionState) {
        let mut state = session.watch_state();
        state.wait_for(|s| *s == wanted).await.unwrap();
    }

    async fn wait_for_polls(transport: &MockTransport, count: usize) {
        while transport.poll_requests().len() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    // ===========================================
    // Precondition Tests
    // ===========================================

    #[test]
    fn rejects_missing_user_id() {
        let result = SyncSession::new(
            MockTransport::new(),
            &Credentials {
                user_id: None,
                permissions: Permissions::MESSAGES,
            },
            SessionConfig::default(),
        );
        let err = result.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn rejects_missing_messages_permission() {
        let transport = MockTransport::new();
        let result = SyncSession::new(
            transport.clone(),
            &Credentials::new(UserId::new(1), Permissions::FRIENDS | Permissions::WALL),
            SessionConfig::default(),
        );
        assert!(matches!(result, Err(SessionError::Precondition(_))));
        // No I/O happened
        assert!(transport.server_requests().is_empty());
    }

    #[test]
    fn rejects_anonymous_and_zero_capacity() {
        assert!(SyncSession::new(
            MockTransport::new(),
            &Credentials::anonymous(),
            SessionConfig::default()
        )
        .is_err());

        let result = SyncSession::new(
            MockTransport::new(),
            &credentials(),
            SessionConfig::default().with_stream_capacity(0),
        );
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[test]
    fn starts_idle_without_io() {
        let transport = MockTransport::new();
        let session = session(&transport, SessionConfig::default());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.resume_point(), ResumePoint::default());
        assert!(transport.server_requests().is_empty());
    }

    // ===========================================
    // Catch-Up Scenario Tests
    // ===========================================

    #[tokio::test]
    async fn single_page_backlog_then_polling() {
        let transport = MockTransport::new();
        transport.queue_server(server(10));
        transport.queue_history(page(11, false, &[10]));
        transport.hold_polls();
        let session = session(&transport, fast_config());

        let mut stream = session.subscribe();
        assert_eq!(next_id(&mut stream).await, 10);
        wait_for_state(&session, SessionState::Polling).await;

        session.cancel();
        assert!(stream.next().await.is_none());
        assert_eq!(
            session.finished().await,
            SessionState::Terminated(Termination::Completed)
        );
    }

    #[tokio::test]
    async fn two_pages_advance_cursor_and_max_id() {
        let transport = MockTransport::new();
        transport.queue_server(server(90));
        transport.queue_history(page(100, true, &[5]));
        transport.queue_history(page(101, false, &[6]));
        transport.hold_polls();
        let session = session(&transport, fast_config());

        let mut stream = session.subscribe();
        assert_eq!(next_id(&mut stream).await, 5);
        assert_eq!(next_id(&mut stream).await, 6);
        wait_for_state(&session, SessionState::Polling).await;

        assert_eq!(session.cursor().sequence_number, SequenceCursor::new(101));
        assert_eq!(session.max_message_id(), Some(MessageId::new(6)));

        let requests = transport.history_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].pts, SequenceCursor::new(90));
        assert_eq!(requests[0].max_message_id, None);
        assert_eq!(requests[1].pts, SequenceCursor::new(100));
        assert_eq!(requests[1].max_message_id, Some(MessageId::new(5)));
        assert_eq!(requests[1].ts, TimeCursor::from(1700u64));

        session.cancel();
    }

    #[tokio::test]
    async fn catch_up_emits_union_of_pages_once() {
        let transport = MockTransport::new();
        transport.queue_server(server(0));
        transport.queue_history(page(10, true, &[1, 2]));
        transport.queue_history(page(20, true, &[2, 3]));
        transport.queue_history(page(20, true, &[]));
        transport.queue_history(page(30, false, &[4]));
        transport.hold_polls();
        let session = session(&transport, fast_config());

        let mut stream = session.subscribe();
        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(next_id(&mut stream).await);
        }
        wait_for_state(&session, SessionState::Polling).await;

        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(session.max_message_id(), Some(MessageId::new(4)));
        assert_eq!(session.resume_point().sequence_number, SequenceCursor::new(30));
        session.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn absent_page_is_retried_not_looped() {
        let transport = MockTransport::new();
        transport.queue_server(server(0));
        transport.queue_history(Value::Null);
        transport.queue_history(page(5, false, &[3]));
        transport.hold_polls();
        let session = session(&transport, fast_config());

        let mut stream = session.subscribe();
        assert_eq!(next_id(&mut stream).await, 3);
        assert_eq!(transport.history_requests().len(), 2);
        session.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_history_retries_fail_session() {
        let transport = MockTransport::new();
        transport.queue_server(server(0));
        for _ in 0..3 {
            transport.queue_history(Value::Null);
        }
        let session = session(&transport, fast_config());

        let mut stream = session.subscribe();
        let err = stream.next().await.unwrap().unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::Transport));
        assert!(stream.next().await.is_none());
        assert_eq!(transport.history_requests().len(), 3);
        assert_eq!(
            session.state(),
            SessionState::Terminated(Termination::Failed)
        );
    }

    #[tokio::test]
    async fn resume_point_takes_precedence() {
        let transport = MockTransport::new();
        transport.queue_server(json!({ "key": "k", "server": "im.example", "ts": 1700 }));
        transport.queue_history(page(45, false, &[7, 8]));
        transport.hold_polls();
        let config = fast_config().with_resume(ResumePoint {
            sequence_number: SequenceCursor::new(40),
            max_message_id: Some(MessageId::new(7)),
        });
        let session = session(&transport, config);

        let mut stream = session.subscribe();
        // 7 was delivered by a previous run
        assert_eq!(next_id(&mut stream).await, 8);
        wait_for_state(&session, SessionState::Polling).await;

        assert_eq!(transport.server_requests(), vec![false]);
        let request = &transport.history_requests()[0];
        assert_eq!(request.pts, SequenceCursor::new(40));
        assert_eq!(request.max_message_id, Some(MessageId::new(7)));
        session.cancel();
    }

    #[tokio::test]
    async fn slow_consumer_resume_point_covers_only_handled_messages() {
        let transport = MockTransport::new();
        transport.queue_server(server(90));
        transport.queue_history(page(100, true, &[5]));
        transport.queue_history(page(101, false, &[6]));
        transport.hold_polls();
        let session = session(&transport, fast_config());

        let mut stream = session.subscribe();
        wait_for_state(&session, SessionState::Polling).await;

        // The worker is done with both pages, this subscriber has seen one
        assert_eq!(next_id(&mut stream).await, 5);
        assert_eq!(session.max_message_id(), Some(MessageId::new(6)));
        let handled = stream.resume_point().unwrap();
        assert_eq!(
            handled,
            ResumePoint {
                sequence_number: SequenceCursor::new(90),
                max_message_id: Some(MessageId::new(5)),
            }
        );
        session.cancel();
        drop(session);

        // A new session started from it delivers 6 again
        let transport = MockTransport::new();
        transport.queue_server(json!({ "key": "k", "server": "im.example/nim1", "ts": 1800 }));
        transport.queue_history(page(100, true, &[5]));
        transport.queue_history(page(101, false, &[6]));
        transport.hold_polls();
        let resumed = SyncSession::new(
            transport.clone(),
            &credentials(),
            fast_config().with_resume(handled),
        )
        .unwrap();

        let mut stream = resumed.subscribe();
        assert_eq!(next_id(&mut stream).await, 6);
        assert_eq!(
            stream.resume_point(),
            Some(ResumePoint {
                sequence_number: SequenceCursor::new(100),
                max_message_id: Some(MessageId::new(6)),
            })
        );
        resumed.cancel();
    }

    #[tokio::test]
    async fn cancel_interrupts_history_backoff() {
        let transport = MockTransport::new();
        transport.queue_server(server(0));
        transport.queue_history(Value::Null);
        transport.queue_history(page(5, false, &[3]));
        let config = SessionConfig::default().with_retry(
            RetryPolicy::new(3, Duration::from_secs(60), Duration::from_secs(60))
                .with_jitter(Duration::ZERO),
        );
        let session = session(&transport, config);

        let mut stream = session.subscribe();
        while transport.history_requests().is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        session.cancel();
        let item = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap();

        assert!(item.is_none());
        assert_eq!(transport.history_requests().len(), 1);
        assert_eq!(
            session.finished().await,
            SessionState::Terminated(Termination::Completed)
        );
    }

    #[tokio::test]
    async fn dropping_the_session_cancels_it() {
        let transport = MockTransport::new();
        transport.queue_server(server(0));
        transport.queue_history(page(0, false, &[]));
        transport.hold_polls();
        let session = session(&transport, fast_config());

        let mut stream = session.subscribe();
        wait_for_polls(&transport, 1).await;

        drop(session);
        let item = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap();

        assert!(item.is_none());
        assert_eq!(transport.poll_requests().len(), 1);
    }

    // ===========================================
    // Live Poll Scenario Tests
    // ===========================================

    #[tokio::test]
    async fn live_batch_emits_message_and_adopts_cursor() {
        let transport = MockTransport::new();
        transport.queue_server(server(0));
        transport.queue_history(page(0, false, &[]));
        transport.queue_poll(json!({
            "ts": 1701,
            "updates": [[4, 1, 0, 55, 1000, "t", "hi"], [8, -3, 0]]
        }));
        transport.hold_polls();
        let session = session(&transport, fast_config());

        let mut stream = session.subscribe();
        let message: Message = stream.next().await.unwrap().unwrap();
        assert_eq!(message.id, MessageId::new(1));
        assert_eq!(message.body, "hi");

        let mut cursor = session.watch_cursor();
        cursor
            .wait_for(|t| t.time_cursor() == &TimeCursor::from(1701u64))
            .await
            .unwrap();
        wait_for_polls(&transport, 2).await;
        assert_eq!(transport.poll_requests()[1].ts, TimeCursor::from(1701u64));
        assert_eq!(transport.poll_requests()[0].ts, TimeCursor::from(1700u64));
        session.cancel();
    }

    #[tokio::test]
    async fn cancel_mid_poll_stops_everything() {
        let transport = MockTransport::new();
        transport.queue_server(server(0));
        transport.queue_history(page(0, false, &[]));
        transport.hold_polls();
        let session = session(&transport, fast_config());

        let mut stream = session.subscribe();
        wait_for_polls(&transport, 1).await;

        session.cancel();
        assert!(stream.next().await.is_none());

        // A batch arriving after cancel is never requested or delivered
        transport.queue_poll(json!({ "ts": 1701, "updates": [[4, 9, 0, 55, 1000, "", "late"]] }));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(transport.poll_requests().len(), 1);
        assert_eq!(session.max_message_id(), None);
        assert_eq!(
            session.state(),
            SessionState::Terminated(Termination::Completed)
        );
    }

    #[tokio::test]
    async fn unknown_event_code_fails_session() {
        let transport = MockTransport::new();
        transport.queue_server(server(0));
        transport.queue_history(page(0, false, &[]));
        transport.queue_poll(json!({
            "ts": 1701,
            "updates": [[4, 1, 0, 55, 1000, "t", "hi"], [999, 1, 2]]
        }));
        let session = session(&transport, fast_config());

        let mut stream = session.subscribe();
        assert_eq!(next_id(&mut stream).await, 1);
        let err = stream.next().await.unwrap().unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::Decode));
        assert!(err.to_string().contains("999"));
        assert!(stream.next().await.is_none());
        // The batch's time cursor was never committed
        assert_eq!(session.cursor().server_time_cursor, TimeCursor::from(1700u64));
    }

    #[tokio::test]
    async fn poll_transport_error_is_not_retried() {
        let transport = MockTransport::new();
        transport.queue_server(server(0));
        transport.queue_history(page(0, false, &[]));
        transport.fail_next_poll(TransportError::RequestFailed("connection reset".into()));
        transport.queue_poll(json!({ "ts": 1701, "updates": [] }));
        let session = session(&transport, fast_config());

        let mut stream = session.subscribe();
        let err = stream.next().await.unwrap().unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::Transport));
        assert_eq!(transport.poll_requests().len(), 1);
        assert_eq!(transport.pending_polls(), 1);
    }

    #[tokio::test]
    async fn resolver_failure_fails_session() {
        let transport = MockTransport::new();
        transport.queue_server(json!({ "server": "im.example", "ts": 1 }));
        let session = session(&transport, fast_config());

        let mut stream = session.subscribe();
        let err = stream.next().await.unwrap().unwrap_err();

        assert!(matches!(
            err,
            StreamError::Failed {
                kind: ErrorKind::Transport,
                ..
            }
        ));
        assert!(transport.history_requests().is_empty());
    }

    // ===========================================
    // Fan-out Tests
    // ===========================================

    #[tokio::test]
    async fn every_subscriber_sees_the_same_sequence() {
        let transport = MockTransport::new();
        transport.queue_server(server(0));
        transport.queue_history(page(2, false, &[1, 2]));
        transport.hold_polls();
        let session = session(&transport, fast_config());

        let mut first = session.subscribe();
        let mut second = session.subscribe();

        for stream in [&mut first, &mut second] {
            assert_eq!(next_id(stream).await, 1);
            assert_eq!(next_id(stream).await, 2);
        }
        // One producer, no re-execution per subscriber
        assert_eq!(transport.server_requests().len(), 1);
        assert_eq!(transport.history_requests().len(), 1);
        session.cancel();
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_replay() {
        let transport = MockTransport::new();
        transport.queue_server(server(0));
        transport.queue_history(page(2, false, &[1, 2]));
        transport.hold_polls();
        let session = session(&transport, fast_config());

        session.start();
        session.start();
        wait_for_polls(&transport, 1).await;

        let mut late = session.subscribe();
        transport.queue_poll(json!({ "ts": 1701, "updates": [[4, 20, 0, 55, 1000, "", "live"]] }));

        assert_eq!(next_id(&mut late).await, 20);
        assert_eq!(transport.server_requests().len(), 1);
        session.cancel();
    }

    #[tokio::test]
    async fn slow_subscriber_is_told_it_lagged() {
        let transport = MockTransport::new();
        transport.queue_server(server(0));
        transport.queue_history(page(5, false, &[1, 2, 3, 4, 5]));
        transport.hold_polls();
        let session = session(&transport, fast_config().with_stream_capacity(2));

        let mut stream = session.subscribe();
        wait_for_state(&session, SessionState::Polling).await;

        assert_eq!(stream.next().await, Some(Err(StreamError::Lagged(3))));
        assert_eq!(next_id(&mut stream).await, 4);
        assert_eq!(next_id(&mut stream).await, 5);
        session.cancel();
    }

    #[tokio::test]
    async fn cancel_before_start_ends_immediately() {
        let transport = MockTransport::new();
        let session = session(&transport, fast_config());

        session.cancel();
        let mut stream = session.subscribe();

        assert!(stream.next().await.is_none());
        assert_eq!(
            session.state(),
            SessionState::Terminated(Termination::Completed)
        );
        assert!(transport.server_requests().is_empty());
    }
}
