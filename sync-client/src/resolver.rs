//! Server descriptor resolution.

use lpsync_types::ServerDescriptor;

use crate::transport::{Transport, TransportError};

/// Ask the "get server" collaborator where to long-poll.
///
/// Called once per session. Failures are not retried: without a descriptor
/// there is nothing to catch up against.
pub async fn resolve<T: Transport + ?Sized>(
    transport: &T,
    want_sequence_cursor: bool,
) -> Result<ServerDescriptor, TransportError> {
    let value = transport.get_server(want_sequence_cursor).await?;
    let descriptor = ServerDescriptor::from_value(value, want_sequence_cursor)?;

    tracing::debug!(
        "Resolved long-poll server {} (ts={}, pts={:?})",
        descriptor.host,
        descriptor.initial_time_cursor,
        descriptor.initial_sequence_number
    );
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use lpsync_types::{SequenceCursor, TimeCursor};
    use serde_json::json;

    #[tokio::test]
    async fn resolves_valid_descriptor() {
        let transport = MockTransport::new();
        transport.queue_server(json!({ "key": "k", "server": "im.example", "ts": 17, "pts": 40 }));

        let descriptor = resolve(&transport, true).await.unwrap();

        assert_eq!(descriptor.host, "im.example");
        assert_eq!(descriptor.initial_time_cursor, TimeCursor::from(17u64));
        assert_eq!(descriptor.initial_sequence_number, Some(SequenceCursor::new(40)));
        assert_eq!(transport.server_requests(), vec![true]);
    }

    #[tokio::test]
    async fn malformed_descriptor_is_transport_error() {
        let transport = MockTransport::new();
        transport.queue_server(json!({ "server": "im.example", "ts": 17 }));

        let err = resolve(&transport, false).await.unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
    }

    #[tokio::test]
    async fn missing_requested_pts_is_transport_error() {
        let transport = MockTransport::new();
        transport.queue_server(json!({ "key": "k", "server": "im.example", "ts": 17 }));

        let err = resolve(&transport, true).await.unwrap_err();
        assert_eq!(err, TransportError::Malformed("missing field: pts".into()));
    }

    #[tokio::test]
    async fn call_failure_is_not_retried() {
        let transport = MockTransport::new();
        transport.fail_next_server(TransportError::Timeout);
        transport.queue_server(json!({ "key": "k", "server": "im.example", "ts": 17 }));

        let err = resolve(&transport, false).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout);
        assert_eq!(transport.server_requests().len(), 1);
    }
}
