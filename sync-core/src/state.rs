//! Session state machine for lpsync.
//!
//! This module provides a pure, side-effect-free state machine for the sync
//! session lifecycle. The state machine takes events as input and produces a
//! new state plus a list of actions to execute.
//!
//! ```text
//! Idle → Resolving → CatchingUp → Polling ⟲
//!   └──────────┴──────────┴──────────┴──→ Terminated(Completed | Failed)
//! ```
//!
//! The actual I/O (resolving, paging history, long-polling) is performed by
//! sync-client, not by this module.

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The caller cancelled.
    Completed,
    /// A transport or decode error ended the session.
    Failed,
}

/// Session state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, worker not started.
    Idle,
    /// Fetching the server descriptor.
    Resolving,
    /// Draining history pages.
    CatchingUp,
    /// Long-polling for live events.
    Polling,
    /// Finished; no further transitions.
    Terminated(Termination),
}

impl SessionState {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::Idle
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// Invalid transitions leave the state unchanged and produce no actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        match (self, event) {
            (Self::Idle, Event::Start) => (Self::Resolving, vec![Action::Resolve]),

            (Self::Resolving, Event::Resolved) => (Self::CatchingUp, vec![Action::DrainHistory]),

            // Catch-up finishing is never terminal
            (Self::CatchingUp, Event::BacklogDrained) => (Self::Polling, vec![Action::Poll]),

            (Self::Polling, Event::PollCompleted) => (Self::Polling, vec![Action::Poll]),

            (state, Event::Failed) if !state.is_terminated() => (
                Self::Terminated(Termination::Failed),
                vec![Action::EmitFailure],
            ),

            (state, Event::Cancel) if !state.is_terminated() => (
                Self::Terminated(Termination::Completed),
                vec![Action::EmitCompletion],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Whether the session has ended.
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }

    /// Whether the worker is running (between start and termination).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Resolving | Self::CatchingUp | Self::Polling)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that drive the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Worker started.
    Start,
    /// Server descriptor obtained and cursors seeded.
    Resolved,
    /// The last history page reported no more backlog.
    BacklogDrained,
    /// One long-poll round trip finished and its events were published.
    PollCompleted,
    /// An unrecoverable error occurred.
    Failed,
    /// The caller cancelled.
    Cancel,
}

/// Actions to be executed by the sync-client worker.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Call the server descriptor collaborator.
    Resolve,
    /// Run history catch-up to completion.
    DrainHistory,
    /// Issue one long-poll request.
    Poll,
    /// Close the stream with an error.
    EmitFailure,
    /// Close the stream cleanly.
    EmitCompletion,
}
