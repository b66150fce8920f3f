use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use futures::future::FutureExt;
use futures::stream::FusedStream;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::debug;

use super::error::LlmError;
use super::types::ChunkStream;

/// A single-pass stream of response text chunks.
///
/// Chunks are read from the network only as the stream is polled. The first error
/// ends the stream: it is yielded once, and every later poll returns `None`, as does
/// any poll after normal completion. Chunks delivered before an error stand.
///
/// When a cancellation token fires or the deadline passes, the underlying response
/// is dropped (releasing the connection) and the stream yields
/// [`LlmError::Cancelled`] or [`LlmError::Timeout`].
pub struct ChatStream {
    inner: Option<ChunkStream>,
    cancellation: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
    deadline: Option<(Pin<Box<Sleep>>, Duration)>,
}

impl ChatStream {
    pub fn new(inner: ChunkStream) -> Self {
        Self {
            inner: Some(inner),
            cancellation: None,
            deadline: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(Box::pin(token.cancelled_owned()));
        self
    }

    /// `timeout` is the budget the deadline was derived from, reported on expiry.
    pub fn with_deadline(mut self, deadline: Instant, timeout: Duration) -> Self {
        self.deadline = Some((Box::pin(tokio::time::sleep_until(deadline)), timeout));
        self
    }

    /// Whether the stream has ended, normally or not.
    pub fn is_finished(&self) -> bool {
        self.inner.is_none()
    }

    fn terminate(&mut self) {
        self.inner = None;
        self.cancellation = None;
        self.deadline = None;
    }
}

impl Stream for ChatStream {
    type Item = Result<String, LlmError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.inner.is_none() {
            return Poll::Ready(None);
        }

        if let Some(cancelled) = this.cancellation.as_mut()
            && cancelled.poll_unpin(cx).is_ready()
        {
            debug!("Chat stream cancelled");
            this.terminate();
            return Poll::Ready(Some(Err(LlmError::Cancelled)));
        }

        if let Some((sleep, timeout)) = this.deadline.as_mut()
            && sleep.poll_unpin(cx).is_ready()
        {
            let timeout = *timeout;
            debug!(?timeout, "Chat stream deadline reached");
            this.terminate();
            return Poll::Ready(Some(Err(LlmError::Timeout { timeout })));
        }

        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(e))) => {
                this.terminate();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.terminate();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for ChatStream {
    fn is_terminated(&self) -> bool {
        self.is_finished()
    }
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::stream;

    fn chunks(items: Vec<Result<String, LlmError>>) -> ChunkStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn test_yields_chunks_then_ends_for_good() {
        let mut stream = ChatStream::new(chunks(vec![
            Ok("a".to_string()),
            Ok("b".to_string()),
            Ok("c".to_string()),
        ]));

        let collected: Vec<String> = stream
            .by_ref()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(collected, vec!["a", "b", "c"]);
        assert!(stream.is_finished());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_error_is_terminal() {
        let mut stream = ChatStream::new(chunks(vec![
            Ok("a".to_string()),
            Err(LlmError::Stream {
                message: "connection reset".to_string(),
            }),
            Ok("never".to_string()),
        ]));

        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert!(matches!(
            stream.next().await,
            Some(Err(LlmError::Stream { .. }))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_stops_delivery() {
        let token = CancellationToken::new();
        let pending: ChunkStream = Box::pin(stream::pending::<Result<String, LlmError>>());
        let mut stream = ChatStream::new(pending).with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        assert!(matches!(stream.next().await, Some(Err(LlmError::Cancelled))));
        assert!(stream.next().await.is_none());
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_deadline_ends_stream() {
        let timeout = Duration::from_millis(20);
        let pending: ChunkStream = Box::pin(stream::pending::<Result<String, LlmError>>());
        let mut stream = ChatStream::new(pending).with_deadline(Instant::now() + timeout, timeout);

        match stream.next().await {
            Some(Err(LlmError::Timeout { timeout: reported })) => assert_eq!(reported, timeout),
            other => panic!("Expected timeout, got {other:?}"),
        }
        assert!(stream.is_terminated());
    }
}
