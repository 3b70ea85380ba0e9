//! Pull-based transform protocol shared by the pipeline stages.
//!
//! A stage is an [`AsyncTransformer`] wrapped in a [`TransformStage`], which
//! is itself a `Stream`. Nothing is read from the source until the consumer
//! polls, and a stage holds at most one item in flight, so backpressure
//! falls out of the polling order. Dropping a stage drops its in-flight work
//! and its source, which is how cancellation travels upstream.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use crate::error::ProcessingResult;
use crate::types::ImageData;

/// A stream of stage items. Item-scoped failures travel in-band as `Err`.
pub type ItemStream<T> = BoxStream<'static, ProcessingResult<T>>;

/// A single-input, single-output asynchronous transform.
///
/// Implementations document whether their failures are item-scoped (the
/// usual case, reported in place of the item) or stream-fatal (rejected at
/// construction, before any item is pulled).
#[async_trait]
pub trait AsyncTransformer<I, O>: Send + Sync + 'static
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Stage name used in logs.
    fn name(&self) -> &'static str;

    /// Transform one item.
    async fn transform(&self, input: I) -> ProcessingResult<O>;
}

/// Stream adapter that pulls from a source and applies a transformer.
///
/// Failed items from upstream are forwarded unchanged; the transformer only
/// sees successful ones. Order is preserved.
pub struct TransformStage<I, O> {
    source: ItemStream<I>,
    transformer: Arc<dyn AsyncTransformer<I, O>>,
    in_flight: Option<BoxFuture<'static, ProcessingResult<O>>>,
    finished: bool,
}

impl<I, O> TransformStage<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub fn new(source: ItemStream<I>, transformer: Arc<dyn AsyncTransformer<I, O>>) -> Self {
        tracing::trace!("Wiring stage: {}", transformer.name());
        Self {
            source,
            transformer,
            in_flight: None,
            finished: false,
        }
    }
}

impl<I, O> Stream for TransformStage<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    type Item = ProcessingResult<O>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(fut) = this.in_flight.as_mut() {
                let result = ready!(fut.as_mut().poll(cx));
                this.in_flight = None;
                if let Err(e) = &result {
                    tracing::warn!("{} stage: {}", this.transformer.name(), e);
                }
                return Poll::Ready(Some(result));
            }

            if this.finished {
                return Poll::Ready(None);
            }

            match ready!(this.source.poll_next_unpin(cx)) {
                Some(Ok(item)) => {
                    let transformer = Arc::clone(&this.transformer);
                    this.in_flight = Some(Box::pin(async move { transformer.transform(item).await }));
                }
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => {
                    this.finished = true;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

/// Chaining helper: `images.pipe(resizer).pipe(compressor)`.
pub trait TransformExt<I>: Stream<Item = ProcessingResult<I>> + Send + Sized + 'static
where
    I: Send + 'static,
{
    fn pipe<T, O>(self, transformer: Arc<T>) -> TransformStage<I, O>
    where
        T: AsyncTransformer<I, O>,
        O: Send + 'static,
    {
        TransformStage::new(self.boxed(), transformer)
    }
}

impl<S, I> TransformExt<I> for S
where
    S: Stream<Item = ProcessingResult<I>> + Send + Sized + 'static,
    I: Send + 'static,
{
}

/// Lift caller-supplied images into a stage source.
pub fn image_source<S>(images: S) -> ItemStream<ImageData>
where
    S: Stream<Item = ImageData> + Send + 'static,
{
    images.map(Ok).boxed()
}
