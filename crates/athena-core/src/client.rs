//! Session-scoped client that drives the pipeline into the transport.

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::auth::CredentialCache;
use crate::config::Config;
use crate::error::{AthenaError, ProcessingError, Result};
use crate::pipeline::{CorrelationProvider, ItemStream, Pipeline};
use crate::transport::{CallOptions, ChannelOptions, ClassifierTransport, ResponseStream};
use crate::error::TransportError;
use crate::types::{ClassificationOutput, ClassifyResponse, ImageData, WireRequest};

/// Something that happened on a classify call.
#[derive(Debug)]
pub enum ClassifyEvent {
    /// A response from the service
    Response(ClassifyResponse),
    /// An image failed in the pipeline and was never sent
    ItemFailed(ProcessingError),
}

/// Events of one classify call. An `Err` item ends the stream.
pub type EventStream = BoxStream<'static, Result<ClassifyEvent>>;

/// Client for the classification service.
///
/// Owns the validated pipeline and shares the credential cache with any
/// other clients of the same session.
pub struct AthenaClient {
    pipeline: Pipeline,
    channel: ChannelOptions,
    credentials: Arc<CredentialCache>,
    transport: Arc<dyn ClassifierTransport>,
}

impl AthenaClient {
    /// Create a client from configuration.
    ///
    /// Pipeline settings and the host are validated here; nothing touches
    /// the network until a call is made.
    pub fn new(
        config: &Config,
        credentials: Arc<CredentialCache>,
        transport: Arc<dyn ClassifierTransport>,
    ) -> Result<Self> {
        let pipeline = Pipeline::from_config(config)?;
        let channel = ChannelOptions::from_config(&config.client)?;
        Ok(Self::from_parts(pipeline, channel, credentials, transport))
    }

    /// Like [`AthenaClient::new`] with a caller-supplied correlation provider.
    pub fn with_correlation_provider(
        config: &Config,
        correlation: Arc<dyn CorrelationProvider>,
        credentials: Arc<CredentialCache>,
        transport: Arc<dyn ClassifierTransport>,
    ) -> Result<Self> {
        let pipeline = Pipeline::new(config, correlation)?;
        let channel = ChannelOptions::from_config(&config.client)?;
        Ok(Self::from_parts(pipeline, channel, credentials, transport))
    }

    pub fn from_parts(
        pipeline: Pipeline,
        channel: ChannelOptions,
        credentials: Arc<CredentialCache>,
        transport: Arc<dyn ClassifierTransport>,
    ) -> Self {
        Self {
            pipeline,
            channel,
            credentials,
            transport,
        }
    }

    /// Classify a stream of images.
    ///
    /// Credential failures are returned before the call is opened. Once
    /// open, the event stream carries service responses in order, with
    /// pipeline failures reported as [`ClassifyEvent::ItemFailed`]. The
    /// stream ends quietly if no response arrives within the response
    /// timeout while images are still being sent, and ends with an error if
    /// the service reports a global error.
    pub async fn classify_images<S>(&self, images: S) -> Result<EventStream>
    where
        S: Stream<Item = ImageData> + Send + 'static,
    {
        let authorization = self.credentials.authorization().await?;

        let (failed_tx, failed_rx) = mpsc::unbounded_channel();
        let input_active = Arc::new(AtomicBool::new(true));
        let requests = outgoing(self.pipeline.run(images), failed_tx, Arc::clone(&input_active));

        tracing::info!(
            "Starting classification on {} (response timeout: {:?})",
            self.channel.host,
            self.channel.response_timeout
        );
        let responses = self
            .transport
            .classify(
                requests,
                CallOptions {
                    authorization,
                    timeout: None,
                },
            )
            .await?;

        let session = Session {
            responses,
            failures: failed_rx,
            failures_open: true,
            input_active,
            response_timeout: self.channel.response_timeout,
            started: Instant::now(),
            last_response: Instant::now(),
            phase: Phase::Streaming,
        };
        Ok(stream::unfold(session, |mut session| async move {
            session.next_event().await.map(|event| (event, session))
        })
        .boxed())
    }

    /// Classify one image in a unary call.
    ///
    /// The image goes through the same resize and compression stages as a
    /// streamed one but is never batched. A caller-supplied correlation ID
    /// wins; otherwise the configured provider assigns one. The call is
    /// bounded by the response timeout, and an output that carries an
    /// error is returned as [`AthenaError::Output`].
    pub async fn classify_single(
        &self,
        image: ImageData,
        correlation_id: Option<String>,
    ) -> Result<ClassificationOutput> {
        let image = match correlation_id.filter(|id| !id.is_empty()) {
            Some(id) => image.with_correlation_id(id),
            None => image,
        };
        let input = self.pipeline.prepare_single(image).await?;
        let call = CallOptions {
            authorization: self.credentials.authorization().await?,
            timeout: self.channel.response_timeout,
        };

        tracing::debug!(
            "Classifying {} on {} ({} bytes, {} hash(es))",
            input.correlation_id,
            self.channel.host,
            input.data.len(),
            input.hashes.len()
        );
        let response = self.transport.classify_single(input, call.clone());
        let output = match call.timeout {
            Some(limit) => tokio::time::timeout(limit, response).await.map_err(|_| {
                TransportError::new(format!("no response within {:?}", limit))
            })??,
            None => response.await?,
        };

        if let Some(error) = output.failure() {
            tracing::warn!("Classification of {} failed: {}", error.correlation_id, error.message);
            return Err(error.into());
        }
        Ok(output)
    }
}

/// Requests for the transport. Failed items are diverted to `failed`; the
/// flag drops once the pipeline is exhausted.
fn outgoing(
    prepared: ItemStream<WireRequest>,
    failed: mpsc::UnboundedSender<ProcessingError>,
    input_active: Arc<AtomicBool>,
) -> BoxStream<'static, WireRequest> {
    stream::unfold(
        (prepared, failed, input_active),
        |(mut prepared, failed, input_active)| async move {
            while let Some(item) = prepared.next().await {
                match item {
                    Ok(request) => return Some((request, (prepared, failed, input_active))),
                    Err(e) => {
                        // The receiver is gone only if the caller dropped the call
                        let _ = failed.send(e);
                    }
                }
            }
            tracing::debug!("Input exhausted");
            input_active.store(false, Ordering::SeqCst);
            None
        },
    )
    .boxed()
}

enum Phase {
    Streaming,
    /// Responses are done; hand out failures already queued, then end
    Draining,
    Closed,
}

struct Session {
    responses: ResponseStream,
    failures: mpsc::UnboundedReceiver<ProcessingError>,
    failures_open: bool,
    input_active: Arc<AtomicBool>,
    response_timeout: Option<Duration>,
    started: Instant,
    last_response: Instant,
    phase: Phase,
}

impl Session {
    async fn next_event(&mut self) -> Option<Result<ClassifyEvent>> {
        loop {
            match self.phase {
                Phase::Streaming => {}
                Phase::Draining => {
                    if let Ok(e) = self.failures.try_recv() {
                        return Some(Ok(ClassifyEvent::ItemFailed(e)));
                    }
                    tracing::info!(
                        "Classification completed after {:?}",
                        self.started.elapsed()
                    );
                    self.phase = Phase::Closed;
                    return None;
                }
                Phase::Closed => return None,
            }

            let quench_at = self
                .response_timeout
                .filter(|_| self.input_active.load(Ordering::SeqCst))
                .map(|timeout| self.last_response + timeout);
            let quench = async move {
                match quench_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                failure = self.failures.recv(), if self.failures_open => match failure {
                    Some(e) => return Some(Ok(ClassifyEvent::ItemFailed(e))),
                    None => self.failures_open = false,
                },
                response = self.responses.next() => match response {
                    Some(Ok(response)) => {
                        self.last_response = Instant::now();
                        return Some(self.accept(response));
                    }
                    Some(Err(e)) => {
                        self.phase = Phase::Closed;
                        return Some(Err(AthenaError::Transport(e)));
                    }
                    None => {
                        tracing::debug!("Response stream ended");
                        self.phase = Phase::Draining;
                    }
                },
                _ = quench => {
                    if self.input_active.load(Ordering::SeqCst) {
                        tracing::info!(
                            "No response for {:?} while input active, ending stream",
                            self.last_response.elapsed()
                        );
                        self.phase = Phase::Draining;
                    }
                }
            }
        }
    }

    fn accept(&mut self, response: ClassifyResponse) -> Result<ClassifyEvent> {
        if let Some(error) = response.global_error.as_ref().filter(|e| !e.message.is_empty()) {
            tracing::error!("Service reported a global error: {}", error.message);
            self.phase = Phase::Closed;
            return Err(AthenaError::Service(error.message.clone()));
        }
        tracing::debug!("Received response with {} output(s)", response.outputs.len());
        Ok(ClassifyEvent::Response(response))
    }
}
