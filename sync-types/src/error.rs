//! Error types for lpsync wire payloads.

use thiserror::Error;

/// Errors raised while interpreting a collaborator response.
#[derive(Debug, Error)]
pub enum WireError {
    /// JSON payload did not match the expected shape
    #[error("malformed payload: {0}")]
    Json(#[source] serde_json::Error),

    /// A required field was absent
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field was present but unusable
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The poll server rejected the request instead of returning events
    #[error("poll server reported failure code {0}")]
    PollFailed(i64),
}

impl From<serde_json::Error> for WireError {
    fn from(err: serde_json::Error) -> Self {
        WireError::Json(err)
    }
}
