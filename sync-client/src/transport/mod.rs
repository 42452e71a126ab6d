//! Transport abstraction for lpsync.
//!
//! The session never talks to the network directly. It calls three
//! collaborators through the [`Transport`] trait and validates whatever comes
//! back through `lpsync-types`:
//!
//! - `get_server()` returns the long-poll server descriptor
//! - `get_history()` returns one page of backlog (or `null`)
//! - `poll()` blocks until the server has events or its wait expires
//!
//! Responses are raw JSON so that structural validation happens in one place
//! regardless of how a transport was implemented (HTTP client, fixture file,
//! mock).
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.queue_server(json!({ "key": "k", "server": "s", "ts": 1, "pts": 10 }));
//! let value = transport.get_server(true).await?;
//! ```

mod mock;

pub use mock::MockTransport;

use async_trait::async_trait;
use lpsync_types::{HistoryRequest, PollRequest, WireError};
use serde_json::Value;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The call failed before producing a response.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The response was structurally invalid.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The service rejected the credentials.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The call did not complete in time.
    #[error("request timeout")]
    Timeout,

    /// The collaborator has gone away.
    #[error("connection closed")]
    ConnectionClosed,
}

impl TransportError {
    /// Whether repeating the same request can succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NotAuthorized(_))
    }
}

impl From<WireError> for TransportError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::PollFailed(_) => Self::RequestFailed(e.to_string()),
            other => Self::Malformed(other.to_string()),
        }
    }
}

/// Transport trait for the three sync collaborators.
///
/// Implementations handle the underlying request mechanism. The `act`,
/// `access_token` and URL construction details of a real service belong
/// here, not in the session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the long-poll server descriptor.
    ///
    /// `want_sequence_cursor` asks the service to include `pts`.
    async fn get_server(&self, want_sequence_cursor: bool) -> Result<Value, TransportError>;

    /// Fetch one page of history. `Value::Null` means the service had
    /// nothing usable for this request.
    async fn get_history(&self, request: &HistoryRequest) -> Result<Value, TransportError>;

    /// Wait for live events after `request.ts`.
    ///
    /// May block for up to `request.wait_secs` seconds.
    async fn poll(&self, request: &PollRequest) -> Result<Value, TransportError>;
}
