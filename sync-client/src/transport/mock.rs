//! Mock transport for testing.
//!
//! Allows queueing responses per collaborator and capturing the requests the
//! session made for verification.

use super::{Transport, TransportError};
use async_trait::async_trait;
use lpsync_types::{HistoryRequest, PollRequest};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Mock transport for testing.
///
/// Each collaborator has its own response queue. An empty queue answers with
/// [`TransportError::ConnectionClosed`], except for polls when
/// [`hold_polls`](Self::hold_polls) is set: those wait until a batch is
/// queued, like a real long-poll with nothing to report.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    poll_ready: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    server_queue: VecDeque<Value>,
    history_queue: VecDeque<Value>,
    poll_queue: VecDeque<Value>,
    server_requests: Vec<bool>,
    history_requests: Vec<HistoryRequest>,
    poll_requests: Vec<PollRequest>,
    fail_next_server: Option<TransportError>,
    fail_next_history: Option<TransportError>,
    fail_next_poll: Option<TransportError>,
    hold_polls: bool,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next `get_server()` call.
    pub fn queue_server(&self, response: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner.server_queue.push_back(response);
    }

    /// Queue a response for the next `get_history()` call.
    pub fn queue_history(&self, response: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner.history_queue.push_back(response);
    }

    /// Queue a response for the next `poll()` call.
    pub fn queue_poll(&self, response: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner.poll_queue.push_back(response);
        drop(inner);
        self.poll_ready.notify_one();
    }

    /// Make polls on an empty queue wait instead of failing.
    pub fn hold_polls(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.hold_polls = true;
    }

    /// Cause the next get_server() to fail with the given error.
    pub fn fail_next_server(&self, error: TransportError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_server = Some(error);
    }

    /// Cause the next get_history() to fail with the given error.
    pub fn fail_next_history(&self, error: TransportError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_history = Some(error);
    }

    /// Cause the next poll() to fail with the given error.
    pub fn fail_next_poll(&self, error: TransportError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_poll = Some(error);
    }

    /// Get the `want_sequence_cursor` flag of every get_server() call.
    pub fn server_requests(&self) -> Vec<bool> {
        let inner = self.inner.lock().unwrap();
        inner.server_requests.clone()
    }

    /// Get every history request that was made.
    pub fn history_requests(&self) -> Vec<HistoryRequest> {
        let inner = self.inner.lock().unwrap();
        inner.history_requests.clone()
    }

    /// Get every poll request that was made.
    pub fn poll_requests(&self) -> Vec<PollRequest> {
        let inner = self.inner.lock().unwrap();
        inner.poll_requests.clone()
    }

    /// Number of poll batches still queued.
    pub fn pending_polls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.poll_queue.len()
    }

    /// Clear all state (queues, recorded requests, injected failures).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            poll_ready: Arc::clone(&self.poll_ready),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get_server(&self, want_sequence_cursor: bool) -> Result<Value, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.server_requests.push(want_sequence_cursor);

        // Check for forced failure
        if let Some(error) = inner.fail_next_server.take() {
            return Err(error);
        }

        inner
            .server_queue
            .pop_front()
            .ok_or(TransportError::ConnectionClosed)
    }

    async fn get_history(&self, request: &HistoryRequest) -> Result<Value, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.history_requests.push(request.clone());

        // Check for forced failure
        if let Some(error) = inner.fail_next_history.take() {
            return Err(error);
        }

        inner
            .history_queue
            .pop_front()
            .ok_or(TransportError::ConnectionClosed)
    }

    async fn poll(&self, request: &PollRequest) -> Result<Value, TransportError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.poll_requests.push(request.clone());

            // Check for forced failure
            if let Some(error) = inner.fail_next_poll.take() {
                return Err(error);
            }
        }

        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(response) = inner.poll_queue.pop_front() {
                    return Ok(response);
                }
                if !inner.hold_polls {
                    return Err(TransportError::ConnectionClosed);
                }
            }
            self.poll_ready.notified().await;
        }
    }
}
