//! The background task that drives one session.
//!
//! The worker owns the cursors and interprets the actions produced by the
//! pure state machine in `lpsync-core`:
//!
//! ```text
//! Resolve ──► DrainHistory ──► Poll ──► Poll ──► ...
//!    │              │            │
//!    └──────────────┴────────────┴──► EmitFailure | EmitCompletion
//! ```
//!
//! Cancellation is cooperative. Every collaborator call and retry sleep races
//! the cancel signal, and the signal is checked again after a call returns,
//! so nothing from a response is emitted once the caller has cancelled.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use lpsync_core::{Action, CursorTracker, DecodeError, DomainEvent, Event, SessionState};
use lpsync_types::Message;
use tokio::sync::{broadcast, watch};

use crate::error::SessionError;
use crate::history::CatchUp;
use crate::poll::LivePoll;
use crate::resolver;
use crate::session::SessionConfig;
use crate::stream::StreamItem;
use crate::transport::{Transport, TransportError};

/// Channels the worker publishes through.
pub(crate) struct Outlet {
    pub messages: broadcast::Sender<StreamItem>,
    pub state: Arc<watch::Sender<SessionState>>,
    pub cursor: Arc<watch::Sender<CursorTracker>>,
}

impl Outlet {
    /// Publish `message` with the resume point that covers it. The tracker
    /// must already have observed the message and not yet moved past its page.
    fn send_message(&self, message: Message, tracker: &CursorTracker) {
        let resume = tracker.resume_point();
        // No subscribers is fine; late subscribers get no replay
        let _ = self.messages.send(StreamItem::Message { message, resume });
    }

    fn publish_cursor(&self, tracker: &CursorTracker) {
        self.cursor.send_replace(tracker.clone());
    }
}

/// Why a step stopped early.
enum Interrupt {
    Cancelled,
    Failed(SessionError),
}

impl From<SessionError> for Interrupt {
    fn from(e: SessionError) -> Self {
        Self::Failed(e)
    }
}

impl From<TransportError> for Interrupt {
    fn from(e: TransportError) -> Self {
        Self::Failed(e.into())
    }
}

impl From<DecodeError> for Interrupt {
    fn from(e: DecodeError) -> Self {
        Self::Failed(e.into())
    }
}

pub(crate) struct Worker<T: ?Sized> {
    transport: Arc<T>,
    config: SessionConfig,
    tracker: CursorTracker,
    state: SessionState,
    live: Option<LivePoll>,
    failure: Option<SessionError>,
    outlet: Outlet,
    cancel: watch::Receiver<bool>,
}

impl<T: Transport + ?Sized> Worker<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        config: SessionConfig,
        outlet: Outlet,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        let tracker = match config.resume {
            Some(resume) => CursorTracker::with_resume(resume),
            None => CursorTracker::new(),
        };
        Self {
            transport,
            config,
            tracker,
            state: SessionState::Idle,
            live: None,
            failure: None,
            outlet,
            cancel,
        }
    }

    /// Run until the session terminates.
    pub(crate) async fn run(mut self) {
        let mut pending: VecDeque<Action> = self.apply(Event::Start).into();

        while let Some(action) = pending.pop_front() {
            let outcome = match action {
                Action::Resolve => self.resolve().await,
                Action::DrainHistory => self.drain_history().await,
                Action::Poll => self.poll_once().await,
                Action::EmitFailure => {
                    self.emit_failure();
                    continue;
                }
                Action::EmitCompletion => {
                    tracing::info!("Sync session cancelled");
                    let _ = self.outlet.messages.send(StreamItem::Completed);
                    continue;
                }
            };

            let event = match outcome {
                Ok(event) => event,
                Err(Interrupt::Cancelled) => Event::Cancel,
                Err(Interrupt::Failed(error)) => {
                    self.failure = Some(error);
                    Event::Failed
                }
            };
            pending.extend(self.apply(event));
        }
    }

    fn apply(&mut self, event: Event) -> Vec<Action> {
        let (next, actions) = self.state.on_event(event);
        if next != self.state {
            tracing::debug!("Session {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        // Terminal state is visible before the terminal stream item is sent
        self.outlet.state.send_replace(next);
        actions
    }

    async fn resolve(&mut self) -> Result<Event, Interrupt> {
        // A resume point brings its own sequence cursor
        let want_sequence_cursor = self.config.resume.is_none();

        let descriptor = until_cancelled(
            &mut self.cancel,
            resolver::resolve(self.transport.as_ref(), want_sequence_cursor),
        )
        .await
        .ok_or(Interrupt::Cancelled)??;

        self.tracker.seed(
            descriptor.initial_time_cursor.clone(),
            descriptor.initial_sequence_number,
        );
        self.outlet.publish_cursor(&self.tracker);
        self.live = Some(LivePoll::new(
            &descriptor,
            self.config.wait_secs,
            self.config.mode,
        ));

        tracing::info!(
            "Resolved {}, catching up from pts={}",
            descriptor.host,
            self.tracker.sequence()
        );
        Ok(Event::Resolved)
    }

    async fn drain_history(&mut self) -> Result<Event, Interrupt> {
        let transport = Arc::clone(&self.transport);
        let catch_up = CatchUp::new(
            transport.as_ref(),
            &self.config.history,
            self.config.retry,
            self.tracker.time_cursor().clone(),
        );

        let mut pages = 0;
        loop {
            let page = until_cancelled(
                &mut self.cancel,
                catch_up.fetch_page(self.tracker.sequence(), self.tracker.max_message_id()),
            )
            .await
            .ok_or(Interrupt::Cancelled)??;

            let total = page.messages.len();
            let mut emitted = 0;
            for message in page.messages {
                if self.tracker.observe(message.id) {
                    self.outlet.publish_cursor(&self.tracker);
                    self.outlet.send_message(message, &self.tracker);
                    emitted += 1;
                }
            }

            self.tracker
                .advance_sequence(page.next_sequence_number)
                .map_err(|regression| TransportError::Malformed(regression.to_string()))?;
            self.outlet.publish_cursor(&self.tracker);
            pages += 1;

            tracing::debug!(
                "History page {}: {} new, {} already seen, pts={}",
                pages,
                emitted,
                total - emitted,
                self.tracker.sequence()
            );

            if !page.has_more {
                break;
            }
        }

        tracing::info!(
            "Backlog drained after {} page(s), live polling from ts={}",
            pages,
            self.tracker.time_cursor()
        );
        Ok(Event::BacklogDrained)
    }

    async fn poll_once(&mut self) -> Result<Event, Interrupt> {
        let live = self.live.as_ref().ok_or_else(|| {
            SessionError::Config("live polling requested before the server was resolved".into())
        })?;
        let ts = self.tracker.time_cursor().clone();

        let batch = until_cancelled(
            &mut self.cancel,
            live.next_batch(self.transport.as_ref(), &ts),
        )
        .await
        .ok_or(Interrupt::Cancelled)??;

        for event in batch.events {
            match event {
                DomainEvent::NewMessage(message) => {
                    if self.tracker.observe(message.id) {
                        self.outlet.publish_cursor(&self.tracker);
                        self.outlet.send_message(message, &self.tracker);
                    } else {
                        tracing::debug!("Dropping already delivered message {}", message.id);
                    }
                }
                DomainEvent::Ignored(code) => {
                    tracing::trace!("Ignoring {:?} event", code);
                }
                DomainEvent::DecodeError(error) => return Err(error.into()),
            }
        }

        self.tracker.adopt_time_cursor(batch.ts);
        self.outlet.publish_cursor(&self.tracker);
        Ok(Event::PollCompleted)
    }

    fn emit_failure(&mut self) {
        let error = self
            .failure
            .take()
            .unwrap_or_else(|| SessionError::Config("session failed without a cause".into()));
        tracing::error!("Sync session failed: {}", error);
        let _ = self
            .outlet
            .messages
            .send(StreamItem::Failed(error.to_stream_error()));
    }
}

/// Run `fut` unless the session is cancelled first.
///
/// Returns `None` when cancelled, including when the cancel arrived while
/// `fut` was completing.
async fn until_cancelled<F: Future>(
    cancel: &mut watch::Receiver<bool>,
    fut: F,
) -> Option<F::Output> {
    let output = tokio::select! {
        biased;
        _ = cancelled(cancel) => return None,
        output = fut => output,
    };

    if *cancel.borrow() {
        return None;
    }
    Some(output)
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // A dropped sender means the session handle is gone
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}
