//! Subscriber side of the session's message fan-out.

use std::fmt;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use lpsync_core::ResumePoint;
use lpsync_types::Message;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;

use crate::error::StreamError;

/// What the worker publishes to every subscriber.
#[derive(Debug, Clone)]
pub(crate) enum StreamItem {
    /// A message, with the position that covers it and everything before.
    Message {
        message: Message,
        resume: ResumePoint,
    },
    Failed(StreamError),
    Completed,
}

/// Ordered stream of messages for one subscriber.
///
/// Yields `Some(Ok(message))` in server order, `Some(Err(_))` on lag or
/// terminal failure, and `None` once the session has ended. Implements
/// [`Stream`], so the usual combinators apply.
///
/// After each message, [`resume_point`](Self::resume_point) is the position
/// to persist once that message has been handled.
pub struct MessageStream {
    inner: BroadcastStream<StreamItem>,
    finished: bool,
    resume: Option<ResumePoint>,
}

impl MessageStream {
    pub(crate) fn new(receiver: broadcast::Receiver<StreamItem>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            finished: false,
            resume: None,
        }
    }

    /// A stream for a session that has already ended.
    pub(crate) fn ended(receiver: broadcast::Receiver<StreamItem>) -> Self {
        Self {
            finished: true,
            ..Self::new(receiver)
        }
    }

    /// Wait for the next item.
    pub async fn next(&mut self) -> Option<Result<Message, StreamError>> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }

    /// Where a new session should continue so that nothing after the last
    /// yielded message is lost. `None` until a message has been yielded.
    ///
    /// Unlike [`SyncSession::resume_point`](crate::SyncSession::resume_point),
    /// this never runs ahead of what this subscriber has seen.
    pub fn resume_point(&self) -> Option<ResumePoint> {
        self.resume
    }

    /// Whether the stream has yielded its last item.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Stream for MessageStream {
    type Item = Result<Message, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        let item = match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
            Some(Ok(StreamItem::Message { message, resume })) => {
                self.resume = Some(resume);
                Some(Ok(message))
            }
            Some(Ok(StreamItem::Failed(error))) => {
                self.finished = true;
                Some(Err(error))
            }
            Some(Ok(StreamItem::Completed)) | None => {
                self.finished = true;
                None
            }
            Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                Some(Err(StreamError::Lagged(skipped)))
            }
        };
        Poll::Ready(item)
    }
}

impl fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStream")
            .field("finished", &self.finished)
            .field("resume", &self.resume)
            .finish_non_exhaustive()
    }
}
