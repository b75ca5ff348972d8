use super::client::StreamTransport;
use super::stream::{FrameDecoder, WireFormat};
use crate::error::StreamError;
use crate::types::{Chunk, StreamRequest};
use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Receives decoded chunks from a running stream.
///
/// `on_event_chunk` is called synchronously per chunk in wire order.
/// `on_error` sees transport and protocol failures but never a user abort.
/// `on_end` runs exactly once, however the stream ended.
pub trait StreamHandler: Send + 'static {
    fn on_event_chunk(&mut self, chunk: Chunk);

    fn on_error(&mut self, _error: &StreamError) {}

    fn on_end(&mut self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Aborted,
    Failed(StreamError),
}

impl StreamOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StreamOutcome::Completed)
    }
}

pub enum ConsumerUpdate {
    Chunk(Chunk),
    Error(StreamError),
    End,
}

/// Forwards stream callbacks into a channel for a UI loop to drain.
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<ConsumerUpdate>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConsumerUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StreamHandler for ChannelHandler {
    fn on_event_chunk(&mut self, chunk: Chunk) {
        let _ = self.tx.send(ConsumerUpdate::Chunk(chunk));
    }

    fn on_error(&mut self, error: &StreamError) {
        let _ = self.tx.send(ConsumerUpdate::Error(error.clone()));
    }

    fn on_end(&mut self) {
        let _ = self.tx.send(ConsumerUpdate::End);
    }
}

/// Handle to a running stream.
pub struct StreamHandle<H> {
    cancel: CancellationToken,
    task: JoinHandle<(H, StreamOutcome)>,
}

impl<H> StreamHandle<H> {
    /// Requests a cooperative stop. The stream ends with
    /// `StreamOutcome::Aborted` unless it already finished.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the stream to end and hands the handler back.
    pub async fn finished(self) -> Result<(H, StreamOutcome)> {
        self.task.await.context("stream consumer task failed")
    }
}

/// Reads agent streams from a transport and feeds chunks to a handler.
pub struct StreamConsumer<T> {
    transport: Arc<T>,
    fallback_format: WireFormat,
}

impl<T> Clone for StreamConsumer<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            fallback_format: self.fallback_format,
        }
    }
}

impl<T: StreamTransport + 'static> StreamConsumer<T> {
    pub fn new(transport: T) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    pub fn from_arc(transport: Arc<T>) -> Self {
        Self {
            transport,
            fallback_format: WireFormat::default(),
        }
    }

    /// Format assumed when a response carries no content type.
    pub fn with_fallback_format(mut self, format: WireFormat) -> Self {
        self.fallback_format = format;
        self
    }

    pub fn start<H: StreamHandler>(&self, request: StreamRequest, handler: H) -> StreamHandle<H> {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_stream(
            Arc::clone(&self.transport),
            request,
            self.fallback_format,
            cancel.clone(),
            handler,
        ));
        StreamHandle { cancel, task }
    }
}

async fn run_stream<T, H>(
    transport: Arc<T>,
    request: StreamRequest,
    fallback_format: WireFormat,
    cancel: CancellationToken,
    mut handler: H,
) -> (H, StreamOutcome)
where
    T: StreamTransport + ?Sized,
    H: StreamHandler,
{
    let result = read_stream(
        transport.as_ref(),
        &request,
        fallback_format,
        &cancel,
        &mut handler,
    )
    .await;

    let outcome = match result {
        Ok(()) => StreamOutcome::Completed,
        Err(StreamError::Aborted) => {
            tracing::debug!("stream aborted by consumer");
            StreamOutcome::Aborted
        }
        Err(error) => {
            tracing::warn!(%error, "stream failed");
            handler.on_error(&error);
            StreamOutcome::Failed(error)
        }
    };

    handler.on_end();
    (handler, outcome)
}

async fn read_stream<T, H>(
    transport: &T,
    request: &StreamRequest,
    fallback_format: WireFormat,
    cancel: &CancellationToken,
    handler: &mut H,
) -> Result<(), StreamError>
where
    T: StreamTransport + ?Sized,
    H: StreamHandler,
{
    let response = transport.open(request, cancel).await?;
    let format = match response.content_type.as_deref() {
        Some(content_type) => WireFormat::from_content_type(content_type)?,
        None => fallback_format,
    };
    tracing::debug!(format = format.as_str(), "stream opened");

    let mut decoder = FrameDecoder::new(format);
    let mut body = response.body;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Aborted),
            next = body.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                for chunk in decoder.process(&bytes) {
                    handler.on_event_chunk(chunk);
                }
            }
            Some(Err(error)) => return Err(error),
            None => break,
        }
    }

    let discarded = decoder.finish();
    if discarded > 0 {
        tracing::warn!(
            bytes = discarded,
            format = format.as_str(),
            "stream ended inside a frame; discarding truncated tail"
        );
    }
    if decoder.skipped_frames() > 0 {
        tracing::debug!(
            skipped = decoder.skipped_frames(),
            "stream finished with skipped frames"
        );
    }

    Ok(())
}
