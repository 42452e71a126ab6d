//! Live long-polling.
//!
//! One request per iteration, bound to the current time cursor. The server
//! holds the request open for up to `wait_secs` and answers with a new time
//! cursor and zero or more positional events. Errors are not retried here;
//! they end the session.

use lpsync_core::{decode, DomainEvent};
use lpsync_types::{PollBatch, PollMode, PollRequest, ServerDescriptor, TimeCursor};

use crate::transport::{Transport, TransportError};

/// Default number of seconds the server may hold a poll open.
pub const DEFAULT_WAIT_SECS: u32 = 25;

/// A decoded poll response.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveBatch {
    /// Cursor to wait after on the next request.
    pub ts: TimeCursor,
    /// Decoded events in server order.
    pub events: Vec<DomainEvent>,
}

/// Issues long-poll requests against one resolved server.
#[derive(Debug, Clone)]
pub struct LivePoll {
    server: String,
    key: String,
    wait_secs: u32,
    mode: PollMode,
}

impl LivePoll {
    /// Bind to the server named by `descriptor`.
    pub fn new(descriptor: &ServerDescriptor, wait_secs: u32, mode: PollMode) -> Self {
        Self {
            server: descriptor.host.clone(),
            key: descriptor.access_key.clone(),
            wait_secs,
            mode,
        }
    }

    /// Build the request that waits after `ts`.
    pub fn request(&self, ts: &TimeCursor) -> PollRequest {
        PollRequest {
            server: self.server.clone(),
            key: self.key.clone(),
            ts: ts.clone(),
            wait_secs: self.wait_secs,
            mode: self.mode,
        }
    }

    /// Run one poll iteration and decode every event it returned.
    pub async fn next_batch<T: Transport + ?Sized>(
        &self,
        transport: &T,
        ts: &TimeCursor,
    ) -> Result<LiveBatch, TransportError> {
        let value = transport.poll(&self.request(ts)).await?;
        let batch = PollBatch::from_value(value)?;

        tracing::debug!(
            "Poll after ts={} returned {} update(s), next ts={}",
            ts,
            batch.updates.len(),
            batch.ts
        );

        Ok(LiveBatch {
            ts: batch.ts,
            events: batch.updates.iter().map(decode).collect(),
        })
    }
}
