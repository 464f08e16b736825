//! Pull-based body streams.
//!
//! A [`BodyStream`] hands out elements only after its consumer has signalled
//! demand through [`BodyStream::request`]. Producers feeding a stream through a
//! [`BodySender`] wait until demand exists and until the bounded channel has
//! room, so a slow consumer never causes unbounded buffering.
//!
//! Failures travel as a terminal signal: after an `Err` item the stream is
//! exhausted, which keeps a truncated body distinguishable from a complete one.
//! Dropping the producer without calling [`BodySender::finish`] is reported as
//! [`BodyError::Cancelled`]; dropping the consumer makes any pending or future
//! [`BodySender::send`] fail with the same error.

use std::collections::VecDeque;
use std::fmt;
use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use fnroute_core::BodyError;
use futures_core::Stream;
use tokio::sync::{mpsc, Semaphore};

/// Largest outstanding demand a stream keeps track of; `request` saturates here.
pub const MAX_DEMAND: usize = Semaphore::MAX_PERMITS;

enum Signal<T> {
    Next(T),
    Error(BodyError),
    Complete,
}

enum Source<T> {
    Ready(VecDeque<Result<T, BodyError>>),
    Channel {
        rx: mpsc::Receiver<Signal<T>>,
        demand: Arc<Semaphore>,
    },
    Upstream(Pin<Box<dyn Stream<Item = Result<T, BodyError>> + Send>>),
    Done,
}

/// A lazy, single-consumer sequence of body elements with demand signalling.
///
/// Elements are usually [`Bytes`] chunks, but any already-framed record type
/// works. Calling [`next`](Self::next) with no outstanding demand requests one
/// element first, so simple consumers never have to call `request` directly.
///
/// # Examples
///
/// ```
/// use fnroute_http::body::BodyStream;
///
/// # tokio_test::block_on(async {
/// let (sender, mut stream) = BodyStream::<u32>::channel(4);
/// tokio::spawn(async move {
///     for n in 0..3 {
///         sender.send(n).await.unwrap();
///     }
///     sender.finish().await.unwrap();
/// });
///
/// stream.request(3);
/// let mut seen = Vec::new();
/// while let Some(item) = stream.next().await {
///     seen.push(item.unwrap());
/// }
/// assert_eq!(seen, vec![0, 1, 2]);
/// # });
/// ```
pub struct BodyStream<T = Bytes> {
    source: Source<T>,
    demand: usize,
}

impl<T> BodyStream<T> {
    /// Creates a stream that completes immediately.
    pub fn empty() -> Self {
        Self::ready(VecDeque::new())
    }

    /// Creates a stream whose only signal is the given error.
    pub fn failed(err: BodyError) -> Self {
        Self::ready(VecDeque::from([Err(err)]))
    }

    /// Creates a bounded channel and the stream reading from it.
    ///
    /// `capacity` is the number of elements the channel buffers (at least one).
    /// The sender additionally waits for consumer demand before every element.
    pub fn channel(capacity: usize) -> (BodySender<T>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let demand = Arc::new(Semaphore::new(0));
        let sender = BodySender {
            tx,
            demand: Arc::clone(&demand),
        };
        let stream = Self {
            source: Source::Channel { rx, demand },
            demand: 0,
        };
        (sender, stream)
    }

    /// Adapts an upstream fallible stream. The upstream is polled only when the
    /// consumer pulls, and its errors become [`BodyError::Stream`].
    pub fn from_stream<S, E>(upstream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: fmt::Display + 'static,
        T: 'static,
    {
        Self {
            source: Source::Upstream(Box::pin(MapErr {
                inner: Box::pin(upstream),
            })),
            demand: 0,
        }
    }

    fn ready(items: VecDeque<Result<T, BodyError>>) -> Self {
        Self {
            source: Source::Ready(items),
            demand: 0,
        }
    }

    /// Signals that the consumer is ready for `n` more elements.
    pub fn request(&mut self, n: usize) {
        let granted = n.min(MAX_DEMAND - self.demand);
        if granted == 0 {
            return;
        }
        self.demand += granted;
        if let Source::Channel { demand, .. } = &self.source {
            demand.add_permits(granted);
        }
    }

    /// Returns the demand that has been requested but not yet delivered.
    pub const fn demand(&self) -> usize {
        self.demand
    }

    /// Returns `true` once a terminal signal has been delivered.
    pub const fn is_terminated(&self) -> bool {
        matches!(self.source, Source::Done)
    }

    /// Pulls the next element, waiting for the producer if necessary.
    ///
    /// Returns `None` after successful completion and after a terminal error
    /// has been handed out.
    pub async fn next(&mut self) -> Option<Result<T, BodyError>> {
        poll_fn(|cx| self.poll_item(cx)).await
    }

    fn poll_item(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<T, BodyError>>> {
        if self.is_terminated() {
            return Poll::Ready(None);
        }
        if self.demand == 0 {
            self.request(1);
        }

        let item = match &mut self.source {
            Source::Ready(queue) => queue.pop_front(),
            Source::Channel { rx, .. } => match ready!(rx.poll_recv(cx)) {
                Some(Signal::Next(item)) => Some(Ok(item)),
                Some(Signal::Error(err)) => Some(Err(err)),
                Some(Signal::Complete) => None,
                None => Some(Err(BodyError::Cancelled)),
            },
            Source::Upstream(upstream) => ready!(upstream.as_mut().poll_next(cx)),
            Source::Done => None,
        };

        match item {
            Some(Ok(item)) => {
                self.demand -= 1;
                Poll::Ready(Some(Ok(item)))
            }
            Some(Err(err)) => {
                self.terminate();
                Poll::Ready(Some(Err(err)))
            }
            None => {
                self.terminate();
                Poll::Ready(None)
            }
        }
    }

    fn terminate(&mut self) {
        if let Source::Channel { demand, .. } = &self.source {
            demand.close();
        }
        self.source = Source::Done;
    }
}

impl BodyStream<Bytes> {
    /// Creates a stream holding a single chunk (or nothing, for empty input).
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            Self::empty()
        } else {
            Self::ready(VecDeque::from([Ok(bytes)]))
        }
    }

    /// Collects every chunk into one buffer, failing once `limit` bytes would
    /// be exceeded.
    pub async fn collect_bytes(mut self, limit: usize) -> Result<Bytes, BodyError> {
        self.request(MAX_DEMAND);
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            let chunk = chunk?;
            if buf.len() + chunk.len() > limit {
                return Err(BodyError::LimitExceeded { limit });
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

impl<T> FromIterator<T> for BodyStream<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::ready(iter.into_iter().map(Ok).collect())
    }
}

impl<T> Default for BodyStream<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Unpin for BodyStream<T> {}

impl<T> Stream for BodyStream<T> {
    type Item = Result<T, BodyError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_item(cx)
    }
}

impl<T> Drop for BodyStream<T> {
    fn drop(&mut self) {
        if let Source::Channel { demand, .. } = &self.source {
            demand.close();
        }
    }
}

impl<T> fmt::Debug for BodyStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Ready(queue) => format!("ready({})", queue.len()),
            Source::Channel { .. } => "channel".to_string(),
            Source::Upstream(_) => "upstream".to_string(),
            Source::Done => "done".to_string(),
        };
        f.debug_struct("BodyStream")
            .field("source", &source)
            .field("demand", &self.demand)
            .finish()
    }
}

/// The producing half of [`BodyStream::channel`].
pub struct BodySender<T = Bytes> {
    tx: mpsc::Sender<Signal<T>>,
    demand: Arc<Semaphore>,
}

impl<T> BodySender<T> {
    /// Sends one element once the consumer has demand for it and the channel
    /// has room. Fails with [`BodyError::Cancelled`] if the consumer is gone.
    pub async fn send(&self, item: T) -> Result<(), BodyError> {
        let permit = self
            .demand
            .acquire()
            .await
            .map_err(|_| BodyError::Cancelled)?;
        permit.forget();
        self.tx
            .send(Signal::Next(item))
            .await
            .map_err(|_| BodyError::Cancelled)
    }

    /// Ends the stream with a terminal error.
    pub async fn fail(self, err: BodyError) -> Result<(), BodyError> {
        self.tx
            .send(Signal::Error(err))
            .await
            .map_err(|_| BodyError::Cancelled)
    }

    /// Ends the stream successfully.
    pub async fn finish(self) -> Result<(), BodyError> {
        self.tx
            .send(Signal::Complete)
            .await
            .map_err(|_| BodyError::Cancelled)
    }

    /// Resolves once the consumer has dropped the stream or reached a terminal
    /// signal.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }

    /// Returns `true` if the consumer is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Returns the demand the producer may currently satisfy.
    pub fn demand(&self) -> usize {
        self.demand.available_permits()
    }
}

impl<T> fmt::Debug for BodySender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodySender")
            .field("demand", &self.demand.available_permits())
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

struct MapErr<S> {
    inner: Pin<Box<S>>,
}

impl<S, T, E> Stream for MapErr<S>
where
    S: Stream<Item = Result<T, E>>,
    E: fmt::Display,
{
    type Item = Result<T, BodyError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner
            .as_mut()
            .poll_next(cx)
            .map(|item| item.map(|res| res.map_err(|e| BodyError::Stream(e.to_string()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::task::spawn;
    use tokio_test::{assert_pending, assert_ready, assert_ready_err, assert_ready_ok};

    #[tokio::test]
    async fn test_from_bytes_yields_single_chunk() {
        let mut stream = BodyStream::from_bytes("hello");
        assert_eq!(stream.next().await, Some(Ok(Bytes::from("hello"))));
        assert_eq!(stream.next().await, None);
        assert!(stream.is_terminated());
    }

    #[tokio::test]
    async fn test_empty_bytes_is_empty_stream() {
        let mut stream = BodyStream::from_bytes(Vec::new());
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_from_iter_preserves_order() {
        let mut stream: BodyStream<&str> = ["a", "b", "c"].into_iter().collect();
        assert_eq!(stream.next().await, Some(Ok("a")));
        assert_eq!(stream.next().await, Some(Ok("b")));
        assert_eq!(stream.next().await, Some(Ok("c")));
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn test_sender_waits_for_demand() {
        let (sender, mut stream) = BodyStream::<u8>::channel(8);
        let mut send = spawn(sender.send(1));
        assert_pending!(send.poll());

        stream.request(1);
        assert!(send.is_woken());
        assert_ready_ok!(send.poll());
    }

    #[test]
    fn test_sender_never_exceeds_demand() {
        let (sender, mut stream) = BodyStream::<u8>::channel(8);
        stream.request(2);
        assert_eq!(sender.demand(), 2);

        assert_ready_ok!(spawn(sender.send(1)).poll());
        assert_ready_ok!(spawn(sender.send(2)).poll());
        let mut third = spawn(sender.send(3));
        assert_pending!(third.poll());
    }

    #[test]
    fn test_bounded_buffer_blocks_producer() {
        let (sender, mut stream) = BodyStream::<u8>::channel(1);
        stream.request(5);

        assert_ready_ok!(spawn(sender.send(1)).poll());
        let mut second = spawn(sender.send(2));
        assert_pending!(second.poll());

        let mut next = spawn(stream.next());
        assert_eq!(assert_ready!(next.poll()), Some(Ok(1)));
        drop(next);
        assert!(second.is_woken());
        assert_ready_ok!(second.poll());
    }

    #[tokio::test]
    async fn test_dropped_sender_is_cancellation() {
        let (sender, mut stream) = BodyStream::<u8>::channel(4);
        tokio::spawn(async move {
            sender.send(7).await.unwrap();
        });

        assert_eq!(stream.next().await, Some(Ok(7)));
        assert_eq!(stream.next().await, Some(Err(BodyError::Cancelled)));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_fail_is_terminal() {
        let (sender, mut stream) = BodyStream::<u8>::channel(4);
        tokio::spawn(async move {
            sender.send(1).await.unwrap();
            sender
                .fail(BodyError::Stream("connection reset".into()))
                .await
                .unwrap();
        });

        assert_eq!(stream.next().await, Some(Ok(1)));
        assert_eq!(
            stream.next().await,
            Some(Err(BodyError::Stream("connection reset".into())))
        );
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn test_dropping_consumer_cancels_pending_send() {
        let (sender, stream) = BodyStream::<u8>::channel(4);
        let mut send = spawn(sender.send(1));
        assert_pending!(send.poll());

        drop(stream);
        assert!(send.is_woken());
        assert_eq!(assert_ready_err!(send.poll()), BodyError::Cancelled);
        drop(send);

        assert!(sender.is_closed());
        assert_ready!(spawn(sender.closed()).poll());
    }

    struct Scripted(VecDeque<Result<Bytes, String>>);

    impl Stream for Scripted {
        type Item = Result<Bytes, String>;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Poll::Ready(self.0.pop_front())
        }
    }

    #[tokio::test]
    async fn test_from_stream_maps_upstream_errors() {
        let upstream = Scripted(VecDeque::from([
            Ok(Bytes::from("part")),
            Err("upstream broke".to_string()),
        ]));
        let mut stream = BodyStream::from_stream(upstream);

        assert_eq!(stream.next().await, Some(Ok(Bytes::from("part"))));
        assert_eq!(
            stream.next().await,
            Some(Err(BodyError::Stream("upstream broke".into())))
        );
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_collect_bytes_concatenates() {
        let (sender, stream) = BodyStream::channel(2);
        tokio::spawn(async move {
            sender.send(Bytes::from("Hello ")).await.unwrap();
            sender.send(Bytes::from("World")).await.unwrap();
            sender.finish().await.unwrap();
        });
        let body = stream.collect_bytes(1024).await.unwrap();
        assert_eq!(body, Bytes::from("Hello World"));
    }

    #[tokio::test]
    async fn test_collect_bytes_enforces_limit() {
        let stream = BodyStream::from_bytes("0123456789");
        let err = stream.collect_bytes(4).await.unwrap_err();
        assert_eq!(err, BodyError::LimitExceeded { limit: 4 });
    }

    #[test]
    fn test_request_saturates() {
        let mut stream = BodyStream::<u8>::empty();
        stream.request(MAX_DEMAND);
        stream.request(10);
        assert_eq!(stream.demand(), MAX_DEMAND);
    }

    #[tokio::test]
    async fn test_stream_trait_polls_with_implicit_demand() {
        let mut stream = BodyStream::from_bytes("x");
        let first = poll_fn(|cx| Pin::new(&mut stream).poll_next(cx)).await;
        assert_eq!(first, Some(Ok(Bytes::from("x"))));
        assert_eq!(stream.demand(), 0);
    }
}
