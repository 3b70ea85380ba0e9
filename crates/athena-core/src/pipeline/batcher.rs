//! Size- and time-bounded batching of pipeline items.
//!
//! The batcher is idle until the first item of a batch arrives, which starts
//! a countdown. It then accumulates until either `batch_size` items are held
//! or the countdown fires, whichever comes first, and emits the sealed batch.
//! A partial batch is flushed when the source ends. Dropping the batcher
//! discards any partial batch and stops pulling from upstream.
//!
//! Upstream item failures are forwarded immediately and do not disturb the
//! batch being accumulated. An error can therefore be emitted ahead of items
//! that were accepted before it but are still waiting in the open batch, so
//! consumers must not rely on errors and batches sharing one ordering.

use futures_util::stream::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep};

use crate::error::{ProcessingResult, ValidationError};
use crate::types::Batch;

use super::transformer::ItemStream;

enum BatchState<T> {
    Idle,
    Accumulating {
        items: Vec<T>,
        created_at: Instant,
        deadline: Pin<Box<Sleep>>,
    },
}

/// Groups a stream of items into [`Batch`]es.
pub struct RequestBatcher<T> {
    source: ItemStream<T>,
    batch_size: usize,
    timeout: Duration,
    state: BatchState<T>,
    exhausted: bool,
}

impl<T: Send + 'static> RequestBatcher<T> {
    /// Create a batcher over `source`.
    ///
    /// A zero `batch_size` or a zero `timeout` is rejected.
    pub fn new(
        source: ItemStream<T>,
        batch_size: usize,
        timeout: Duration,
    ) -> Result<Self, ValidationError> {
        Self::check_settings(batch_size, timeout)?;
        Ok(Self::with_checked_settings(source, batch_size, timeout))
    }

    pub(crate) fn check_settings(batch_size: usize, timeout: Duration) -> Result<(), ValidationError> {
        if batch_size == 0 {
            return Err(ValidationError::new("batch_size", "must be at least 1"));
        }
        if timeout.is_zero() {
            return Err(ValidationError::new("batch_timeout", "must be greater than zero"));
        }
        Ok(())
    }

    /// Caller has already run [`Self::check_settings`].
    pub(crate) fn with_checked_settings(
        source: ItemStream<T>,
        batch_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            batch_size,
            timeout,
            state: BatchState::Idle,
            exhausted: false,
        }
    }

    fn accept(&mut self, item: T) {
        match &mut self.state {
            BatchState::Idle => {
                let mut items = Vec::with_capacity(self.batch_size);
                items.push(item);
                self.state = BatchState::Accumulating {
                    items,
                    created_at: Instant::now(),
                    deadline: Box::pin(tokio::time::sleep(self.timeout)),
                };
            }
            BatchState::Accumulating { items, .. } => items.push(item),
        }
    }

    fn held(&self) -> usize {
        match &self.state {
            BatchState::Idle => 0,
            BatchState::Accumulating { items, .. } => items.len(),
        }
    }

    /// Seal the current batch and return to idle.
    fn flush(&mut self, reason: &str) -> Option<Batch<T>> {
        match std::mem::replace(&mut self.state, BatchState::Idle) {
            BatchState::Idle => None,
            BatchState::Accumulating {
                items, created_at, ..
            } => {
                tracing::debug!("Flushing batch of {} ({})", items.len(), reason);
                Some(Batch::new(items, created_at))
            }
        }
    }

    fn deadline_elapsed(&mut self, cx: &mut Context<'_>) -> bool {
        match &mut self.state {
            BatchState::Idle => false,
            BatchState::Accumulating { deadline, .. } => deadline.as_mut().poll(cx).is_ready(),
        }
    }
}

impl<T: Send + Unpin + 'static> Stream for RequestBatcher<T> {
    type Item = ProcessingResult<Batch<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.exhausted {
                return Poll::Ready(this.flush("source exhausted").map(Ok));
            }

            if this.deadline_elapsed(cx) {
                if let Some(batch) = this.flush("timeout") {
                    return Poll::Ready(Some(Ok(batch)));
                }
            }

            match this.source.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(item))) => {
                    this.accept(item);
                    if this.held() >= this.batch_size {
                        if let Some(batch) = this.flush("full") {
                            return Poll::Ready(Some(Ok(batch)));
                        }
                    }
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => this.exhausted = true,
                // The deadline was polled above, so both wakers are registered
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessingError;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// A source that stays open until the sender is dropped.
    fn channel_source(rx: mpsc::UnboundedReceiver<u32>) -> ItemStream<u32> {
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|n| (Ok(n), rx)) }).boxed()
    }

    fn finite_source(items: Vec<u32>) -> ItemStream<u32> {
        stream::iter(items.into_iter().map(Ok)).boxed()
    }

    fn items(batch: Batch<u32>) -> Vec<u32> {
        batch.into_items()
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_batch_then_timed_partial() {
        let (tx, rx) = mpsc::unbounded_channel();
        for n in 1..=5 {
            tx.send(n).unwrap();
        }
        let mut batcher =
            RequestBatcher::new(channel_source(rx), 3, Duration::from_secs(1)).unwrap();

        let start = tokio::time::Instant::now();
        let first = batcher.next().await.unwrap().unwrap();
        assert_eq!(items(first), vec![1, 2, 3]);
        assert_eq!(start.elapsed(), Duration::ZERO);

        let second = batcher.next().await.unwrap().unwrap();
        assert_eq!(items(second), vec![4, 5]);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_flushes_partial_batch_once() {
        let mut batcher =
            RequestBatcher::new(finite_source(vec![1, 2]), 10, Duration::from_millis(500))
                .unwrap();

        let start = tokio::time::Instant::now();
        let batch = batcher.next().await.unwrap().unwrap();
        assert_eq!(items(batch), vec![1, 2]);
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(batcher.next().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_source_yields_nothing() {
        let mut batcher =
            RequestBatcher::new(finite_source(vec![]), 4, Duration::from_secs(1)).unwrap();
        assert!(batcher.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_size_one_flushes_each_item() {
        let batches: Vec<_> =
            RequestBatcher::new(finite_source(vec![7, 8, 9]), 1, Duration::from_secs(60))
                .unwrap()
                .map(|b| items(b.unwrap()))
                .collect()
                .await;
        assert_eq!(batches, vec![vec![7], vec![8], vec![9]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_upstream_still_flushes_on_timeout() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut batcher =
            RequestBatcher::new(channel_source(rx), 10, Duration::from_secs(1)).unwrap();

        tx.send(1).unwrap();
        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            tx.send(2).unwrap();
        });

        let start = tokio::time::Instant::now();
        let batch = batcher.next().await.unwrap().unwrap();
        assert_eq!(items(batch), vec![1]);
        assert_eq!(start.elapsed(), Duration::from_secs(1));

        let batch = batcher.next().await.unwrap().unwrap();
        assert_eq!(items(batch), vec![2]);
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_upstream_error_forwarded_without_breaking_batch() {
        let source = stream::iter(vec![
            Ok(1u32),
            Err(ProcessingError::Decode {
                item: "bad".to_string(),
                message: "nope".to_string(),
            }),
            Ok(2u32),
        ])
        .boxed();
        let out: Vec<_> = RequestBatcher::new(source, 2, Duration::from_secs(1))
            .unwrap()
            .collect()
            .await;

        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0], Err(ProcessingError::Decode { .. })));
        assert_eq!(out[1].as_ref().unwrap().items(), &[1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_batcher_discards_partial_batch_and_stops_pulling() {
        let token = Arc::new(());
        let pulled = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel::<Arc<()>>();
        let counter = Arc::clone(&pulled);
        let source = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|n| (Ok(n), rx)) })
            .inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .boxed();

        tx.send(Arc::clone(&token)).unwrap();
        tx.send(Arc::clone(&token)).unwrap();
        let mut batcher = RequestBatcher::new(source, 10, Duration::from_secs(1)).unwrap();

        // Both items accepted, batch still open
        let pending = tokio::time::timeout(Duration::from_millis(100), batcher.next()).await;
        assert!(pending.is_err());
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
        assert_eq!(Arc::strong_count(&token), 3);

        drop(batcher);
        assert_eq!(Arc::strong_count(&token), 1);

        // Upstream was released along with the batcher
        assert!(tx.send(Arc::clone(&token)).is_err());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
        assert_eq!(Arc::strong_count(&token), 1);
    }

    #[tokio::test]
    async fn test_error_can_overtake_open_batch() {
        let source = stream::iter(vec![
            Ok(1u32),
            Ok(2u32),
            Err(ProcessingError::Decode {
                item: "bad".to_string(),
                message: "nope".to_string(),
            }),
        ])
        .boxed();
        let out: Vec<_> = RequestBatcher::new(source, 5, Duration::from_secs(1))
            .unwrap()
            .collect()
            .await;

        assert!(out[0].is_err());
        assert_eq!(out[1].as_ref().unwrap().items(), &[1, 2]);
    }

    #[test]
    fn test_zero_settings_rejected() {
        assert!(RequestBatcher::new(finite_source(vec![]), 0, Duration::from_secs(1)).is_err());
        assert!(RequestBatcher::new(finite_source(vec![]), 1, Duration::ZERO).is_err());
    }
}
