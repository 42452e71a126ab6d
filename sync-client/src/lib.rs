//! # sync-client
//!
//! Long-poll message sync session for lpsync.
//!
//! This is the main library that applications use to receive messages.
//!
//! ## Features
//!
//! - **Catch-Up Then Live**: pages through the backlog before switching to
//!   long-polling, with no gap and no duplicates between the two
//! - **Bounded Retries**: absent or failed history pages back off
//!   exponentially within a fixed budget
//! - **Transport Abstraction**: pluggable collaborators (HTTP, fixtures, mock)
//! - **Pure State Machine**: uses sync-core for side-effect-free logic
//! - **Fan-out**: any number of subscribers share one worker, each reading a
//!   [`MessageStream`] that implements `Stream`
//!
//! ## Example
//!
//! ```ignore
//! use lpsync_client::{Credentials, SessionConfig, SyncSession};
//!
//! let session = SyncSession::new(transport, &credentials, SessionConfig::default())?;
//! let mut stream = session.subscribe();
//!
//! while let Some(message) = stream.next().await {
//!     println!("{:?}", message?);
//!
//!     // Persist what has been handled so far
//!     if let Some(resume) = stream.resume_point() {
//!         store.save(resume)?;
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod history;
pub mod poll;
pub mod resolver;
pub mod session;
pub mod stream;
pub mod transport;
mod worker;

pub use error::{ErrorKind, SessionError, StreamError};
pub use history::{CatchUp, HistoryConfig, MIN_EVENTS_LIMIT, MIN_MESSAGES_LIMIT};
pub use poll::{LiveBatch, LivePoll, DEFAULT_WAIT_SECS};
pub use session::{Credentials, SessionConfig, SyncSession, DEFAULT_STREAM_CAPACITY};
pub use stream::MessageStream;
pub use transport::{MockTransport, Transport, TransportError};

pub use lpsync_core::{ResumePoint, RetryPolicy, SessionState, SyncCursor, Termination};
