//! History catch-up.
//!
//! Fetches the backlog one page at a time. Each page request carries the
//! current sequence cursor and the highest message id already held, so the
//! server only returns what the session has not seen.
//!
//! A failed call and an absent (`null`) page are both transient: they share
//! one bounded retry budget per page, with exponential backoff between
//! attempts. A page that claims more backlog but neither moves the cursor nor
//! brings a new message counts against the same budget. The budget is reset
//! by every successful page.

use lpsync_core::{CursorRegression, RetryPolicy};
use lpsync_types::{HistoryPage, HistoryRequest, MessageId, SequenceCursor, TimeCursor};

use crate::transport::{Transport, TransportError};

/// Smallest page size the service accepts.
pub const MIN_MESSAGES_LIMIT: u32 = 200;

/// Smallest event budget the service accepts.
pub const MIN_EVENTS_LIMIT: u32 = 1000;

/// Parameters carried on every history page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    messages_limit: u32,
    events_limit: u32,
    preview_length: Option<u32>,
    onlines_only: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            messages_limit: MIN_MESSAGES_LIMIT,
            events_limit: MIN_EVENTS_LIMIT,
            preview_length: None,
            onlines_only: false,
        }
    }
}

impl HistoryConfig {
    /// Set the page size. Values below [`MIN_MESSAGES_LIMIT`] are raised to it.
    pub fn with_messages_limit(mut self, limit: u32) -> Self {
        self.messages_limit = limit.max(MIN_MESSAGES_LIMIT);
        self
    }

    /// Set the event budget. Values below [`MIN_EVENTS_LIMIT`] are raised to it.
    pub fn with_events_limit(mut self, limit: u32) -> Self {
        self.events_limit = limit.max(MIN_EVENTS_LIMIT);
        self
    }

    /// Truncate message bodies to `length` characters (0 = no truncation).
    pub fn with_preview_length(mut self, length: u32) -> Self {
        self.preview_length = Some(length);
        self
    }

    /// Only fetch history from users currently online.
    pub fn with_onlines_only(mut self, onlines_only: bool) -> Self {
        self.onlines_only = onlines_only;
        self
    }

    /// Messages per page.
    pub fn messages_limit(&self) -> u32 {
        self.messages_limit
    }

    /// Event budget per page.
    pub fn events_limit(&self) -> u32 {
        self.events_limit
    }
}

/// Pages through the backlog for one session.
pub struct CatchUp<'a, T: ?Sized> {
    transport: &'a T,
    config: &'a HistoryConfig,
    retry: RetryPolicy,
    ts: TimeCursor,
}

impl<'a, T: Transport + ?Sized> CatchUp<'a, T> {
    /// `ts` is the time cursor from the server descriptor.
    pub fn new(
        transport: &'a T,
        config: &'a HistoryConfig,
        retry: RetryPolicy,
        ts: TimeCursor,
    ) -> Self {
        Self {
            transport,
            config,
            retry,
            ts,
        }
    }

    /// Build the request for the page after `pts`.
    pub fn request(
        &self,
        pts: SequenceCursor,
        max_message_id: Option<MessageId>,
    ) -> HistoryRequest {
        HistoryRequest {
            ts: self.ts.clone(),
            pts,
            max_message_id,
            messages_limit: self.config.messages_limit,
            events_limit: self.config.events_limit,
            preview_length: self.config.preview_length,
            onlines: self.config.onlines_only,
        }
    }

    /// Fetch one page, retrying transient failures within the budget.
    ///
    /// Returns the last error once the budget is spent. A page whose cursor
    /// would move backwards is rejected without retrying.
    pub async fn fetch_page(
        &self,
        pts: SequenceCursor,
        max_message_id: Option<MessageId>,
    ) -> Result<HistoryPage, TransportError> {
        let request = self.request(pts, max_message_id);
        let mut failures = 0;

        loop {
            let error = match self.try_fetch(&request).await {
                Ok(page) => {
                    let page = check_cursor(&request, page)?;
                    if makes_progress(&request, &page) {
                        return Ok(page);
                    }
                    TransportError::RequestFailed(format!(
                        "history page at pts={} made no progress",
                        request.pts
                    ))
                }
                Err(e) => e,
            };

            failures += 1;
            if !error.is_transient() || !self.retry.should_retry(failures) {
                tracing::warn!(
                    "History page at pts={} failed after {} attempt(s): {}",
                    request.pts,
                    failures,
                    error
                );
                return Err(error);
            }

            let delay = self.retry.delay_for_attempt(failures);
            tracing::warn!(
                "History page at pts={} failed ({}), retrying in {:?}",
                request.pts,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn try_fetch(&self, request: &HistoryRequest) -> Result<HistoryPage, TransportError> {
        let value = self.transport.get_history(request).await?;
        HistoryPage::from_value(value)?
            .ok_or_else(|| TransportError::RequestFailed("history page absent".into()))
    }
}

fn check_cursor(
    request: &HistoryRequest,
    page: HistoryPage,
) -> Result<HistoryPage, TransportError> {
    if page.next_sequence_number < request.pts {
        let regression = CursorRegression {
            current: request.pts,
            offered: page.next_sequence_number,
        };
        return Err(TransportError::Malformed(regression.to_string()));
    }
    Ok(page)
}

/// A page that promises more backlog must move the cursor or bring a new
/// message, otherwise asking again would return the same page.
fn makes_progress(request: &HistoryRequest, page: &HistoryPage) -> bool {
    !page.has_more
        || page.next_sequence_number > request.pts
        || page
            .messages
            .iter()
            .any(|message| Some(message.id) > request.max_message_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(10), Duration::from_millis(40))
            .with_jitter(Duration::ZERO)
    }

    fn page(pts: u64, more: bool, ids: &[u64]) -> Value {
        let messages: Vec<Value> = ids
            .iter()
            .map(|id| {
                json!({ "id": id, "user_id": 7, "date": 1000 + id, "body": format!("m{}", id) })
            })
            .collect();
        json!({ "new_pts": pts, "more": if more { 1 } else { 0 }, "messages": messages })
    }

    // ===========================================
    // Request Tests
    // ===========================================

    #[test]
    fn limits_are_clamped_to_service_minimums() {
        let config = HistoryConfig::default()
            .with_messages_limit(50)
            .with_events_limit(10);
        assert_eq!(config.messages_limit(), MIN_MESSAGES_LIMIT);
        assert_eq!(config.events_limit(), MIN_EVENTS_LIMIT);

        let config = HistoryConfig::default().with_messages_limit(500);
        assert_eq!(config.messages_limit(), 500);
    }

    #[test]
    fn request_carries_cursors_and_options() {
        let transport = MockTransport::new();
        let config = HistoryConfig::default()
            .with_preview_length(90)
            .with_onlines_only(true);
        let catch_up = CatchUp::new(&transport, &config, fast_retry(1), TimeCursor::from(77u64));

        let request = catch_up.request(SequenceCursor::new(12), Some(MessageId::new(4)));

        assert_eq!(request.ts, TimeCursor::from(77u64));
        assert_eq!(request.pts, SequenceCursor::new(12));
        assert_eq!(request.max_message_id, Some(MessageId::new(4)));
        assert_eq!(request.messages_limit, 200);
        assert_eq!(request.events_limit, 1000);
        assert_eq!(request.preview_length, Some(90));
        assert!(request.onlines);
    }

    // ===========================================
    // Fetch Tests
    // ===========================================

    #[tokio::test]
    async fn fetches_page_in_server_order() {
        let transport = MockTransport::new();
        transport.queue_history(page(100, true, &[5, 6]));
        let config = HistoryConfig::default();
        let catch_up = CatchUp::new(&transport, &config, fast_retry(3), TimeCursor::from(1u64));

        let page = catch_up.fetch_page(SequenceCursor::new(90), None).await.unwrap();

        assert!(page.has_more);
        assert_eq!(page.next_sequence_number, SequenceCursor::new(100));
        let ids: Vec<u64> = page.messages.iter().map(|m| m.id.value()).collect();
        assert_eq!(ids, vec![5, 6]);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_page_is_retried_with_backoff() {
        let transport = MockTransport::new();
        transport.queue_history(Value::Null);
        transport.queue_history(Value::Null);
        transport.queue_history(page(10, false, &[1]));
        let config = HistoryConfig::default();
        let catch_up = CatchUp::new(&transport, &config, fast_retry(5), TimeCursor::from(1u64));

        let started = tokio::time::Instant::now();
        let page = catch_up.fetch_page(SequenceCursor::new(0), None).await.unwrap();

        assert_eq!(page.messages.len(), 1);
        assert_eq!(transport.history_requests().len(), 3);
        // 10ms then 20ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_share_the_budget() {
        let transport = MockTransport::new();
        transport.fail_next_history(TransportError::Timeout);
        transport.queue_history(Value::Null);
        let config = HistoryConfig::default();
        let catch_up = CatchUp::new(&transport, &config, fast_retry(3), TimeCursor::from(1u64));

        // Attempt 1 times out, attempt 2 is absent, attempt 3 finds an empty queue
        let err = catch_up.fetch_page(SequenceCursor::new(0), None).await.unwrap_err();

        assert_eq!(err, TransportError::ConnectionClosed);
        assert_eq!(transport.history_requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_pages_exhaust_the_budget() {
        let transport = MockTransport::new();
        for _ in 0..4 {
            transport.queue_history(Value::Null);
        }
        let config = HistoryConfig::default();
        let catch_up = CatchUp::new(&transport, &config, fast_retry(4), TimeCursor::from(1u64));

        let err = catch_up.fetch_page(SequenceCursor::new(0), None).await.unwrap_err();

        assert!(matches!(err, TransportError::RequestFailed(_)));
        assert_eq!(transport.history_requests().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_page_is_retried_with_backoff() {
        let transport = MockTransport::new();
        // Same pts, only an already-held message, yet "more"
        transport.queue_history(page(20, true, &[4]));
        transport.queue_history(page(20, true, &[]));
        transport.queue_history(page(30, false, &[5]));
        let config = HistoryConfig::default();
        let catch_up = CatchUp::new(&transport, &config, fast_retry(5), TimeCursor::from(1u64));

        let started = tokio::time::Instant::now();
        let page = catch_up
            .fetch_page(SequenceCursor::new(20), Some(MessageId::new(4)))
            .await
            .unwrap();

        assert_eq!(page.next_sequence_number, SequenceCursor::new(30));
        assert_eq!(transport.history_requests().len(), 3);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn endless_stalled_pages_exhaust_the_budget() {
        let transport = MockTransport::new();
        for _ in 0..5 {
            transport.queue_history(page(20, true, &[]));
        }
        let config = HistoryConfig::default();
        let catch_up = CatchUp::new(&transport, &config, fast_retry(3), TimeCursor::from(1u64));

        let err = catch_up.fetch_page(SequenceCursor::new(20), None).await.unwrap_err();

        assert_eq!(
            err,
            TransportError::RequestFailed("history page at pts=20 made no progress".into())
        );
        assert_eq!(transport.history_requests().len(), 3);
    }

    #[tokio::test]
    async fn final_page_needs_no_progress() {
        let transport = MockTransport::new();
        transport.queue_history(page(20, false, &[]));
        let config = HistoryConfig::default();
        let catch_up = CatchUp::new(&transport, &config, fast_retry(1), TimeCursor::from(1u64));

        let page = catch_up.fetch_page(SequenceCursor::new(20), None).await.unwrap();

        assert!(!page.has_more);
        assert_eq!(transport.history_requests().len(), 1);
    }

    #[tokio::test]
    async fn authorization_failure_is_not_retried() {
        let transport = MockTransport::new();
        transport.fail_next_history(TransportError::NotAuthorized("revoked".into()));
        transport.queue_history(page(10, false, &[]));
        let config = HistoryConfig::default();
        let catch_up = CatchUp::new(&transport, &config, fast_retry(5), TimeCursor::from(1u64));

        let err = catch_up.fetch_page(SequenceCursor::new(0), None).await.unwrap_err();

        assert!(matches!(err, TransportError::NotAuthorized(_)));
        assert_eq!(transport.history_requests().len(), 1);
    }

    #[tokio::test]
    async fn regressing_cursor_is_rejected() {
        let transport = MockTransport::new();
        transport.queue_history(page(40, false, &[9]));
        let config = HistoryConfig::default();
        let catch_up = CatchUp::new(&transport, &config, fast_retry(5), TimeCursor::from(1u64));

        let err = catch_up.fetch_page(SequenceCursor::new(50), None).await.unwrap_err();

        assert_eq!(
            err,
            TransportError::Malformed("sequence cursor regressed from 50 to 40".into())
        );
        assert_eq!(transport.history_requests().len(), 1);
    }
}
