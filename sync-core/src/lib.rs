//! # sync-core
//!
//! Pure logic for lpsync (no I/O, instant tests).
//!
//! This crate implements the state machine and algorithms for long-poll
//! message sync without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (resolving the poll server, paging history, long-polling)
//! is performed by `sync-client`, which interprets the actions produced by
//! these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod decoder;
pub mod retry;
pub mod state;

pub use cursor::{CursorRegression, CursorTracker, ResumePoint, SyncCursor};
pub use decoder::{decode, DecodeError, DomainEvent};
pub use retry::RetryPolicy;
pub use state::{Action, Event, SessionState, Termination};
