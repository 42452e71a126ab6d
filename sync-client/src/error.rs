//! Session and stream errors.

use lpsync_core::DecodeError;
use std::fmt;
use thiserror::Error;

use crate::transport::TransportError;

/// Which part of the taxonomy an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Credentials or configuration rejected before any I/O.
    Precondition,
    /// A collaborator call failed or returned invalid data.
    Transport,
    /// A live event could not be decoded.
    Decode,
    /// The session configuration is unusable.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Precondition => "precondition",
            Self::Transport => "transport",
            Self::Decode => "decode",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The credentials cannot run a message session.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Decode error.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SessionError {
    /// The taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn to_stream_error(&self) -> StreamError {
        StreamError::Failed {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// An error item on a [`MessageStream`](crate::MessageStream).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The session terminated with an error. No further items follow.
    #[error("{message}")]
    Failed {
        /// Taxonomy bucket of the cause.
        kind: ErrorKind,
        /// Rendered cause.
        message: String,
    },

    /// This subscriber fell behind and `n` messages were dropped for it.
    /// The stream continues with the oldest message still buffered.
    #[error("subscriber lagged, {0} message(s) skipped")]
    Lagged(u64),
}

impl StreamError {
    /// Taxonomy bucket, or `None` for lag.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            Self::Lagged(_) => None,
        }
    }
}
