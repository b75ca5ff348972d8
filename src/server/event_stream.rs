use crate::api::stream::{encode_frame, WireFormat};
use crate::error::StreamError;
use crate::state::assembler::EventAssembler;
use crate::types::{Chunk, Event};
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type FrameSender = mpsc::UnboundedSender<Result<Bytes, StreamError>>;
type FrameReceiver = mpsc::UnboundedReceiver<Result<Bytes, StreamError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Closed,
    Errored,
}

/// Push-based producer side of an agent stream.
///
/// Every pushed chunk is folded into a local assembler so the transcript is
/// complete for persistence even after the consumer goes away. Cancellation
/// only suppresses outbound frames.
pub struct EventStream {
    assembler: EventAssembler,
    format: WireFormat,
    tx: Option<FrameSender>,
    state: StreamState,
    cancel: CancellationToken,
}

impl EventStream {
    pub fn new(format: WireFormat) -> (Self, EventStreamBody) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let stream = Self {
            assembler: EventAssembler::new(),
            format,
            tx: Some(tx),
            state: StreamState::Open,
            cancel: cancel.clone(),
        };
        let body = EventStreamBody {
            rx,
            format,
            cancel,
            finished: false,
        };
        (stream, body)
    }

    pub fn push(&mut self, chunk: Chunk) {
        let frame = if self.is_emitting() {
            match encode_frame(&chunk, self.format) {
                Ok(frame) => Some(frame),
                Err(error) => {
                    tracing::warn!(%error, chunk = chunk.kind(), "cannot encode chunk");
                    None
                }
            }
        } else {
            None
        };

        self.assembler.add_chunk(chunk);

        if let Some(frame) = frame {
            self.send(Ok(frame));
        }
    }

    /// Ends the body cleanly. No-op once cancelled or already terminal.
    pub fn close(&mut self) {
        if self.is_cancelled() || self.state != StreamState::Open {
            return;
        }
        self.state = StreamState::Closed;
        self.tx = None;
    }

    /// Delivers a terminal failure to the body. Allowed after cancellation
    /// because a consumer may still be attached.
    pub fn error(&mut self, error: StreamError) {
        if self.state != StreamState::Open {
            return;
        }
        self.state = StreamState::Errored;
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(error));
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that fires when the consumer disconnects. Upstream generators
    /// should watch it and stop producing.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Transcript assembled from every pushed chunk.
    pub fn events(&self) -> &[Event] {
        self.assembler.events()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.assembler.into_events()
    }

    fn is_emitting(&self) -> bool {
        self.state == StreamState::Open && !self.is_cancelled()
    }

    fn send(&mut self, item: Result<Bytes, StreamError>) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(item).is_err() {
            tracing::debug!("stream body dropped; suppressing further output");
            self.tx = None;
            self.cancel.cancel();
        }
    }
}

/// Byte stream half of an [`EventStream`], suitable as an HTTP response body.
///
/// Dropping it before the producer finished marks the stream cancelled.
pub struct EventStreamBody {
    rx: FrameReceiver,
    format: WireFormat,
    cancel: CancellationToken,
    finished: bool,
}

impl EventStreamBody {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }
}

impl Stream for EventStreamBody {
    type Item = Result<Bytes, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.rx.poll_recv(cx);
        if let Poll::Ready(None) = polled {
            this.finished = true;
        }
        polled
    }
}

impl Drop for EventStreamBody {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel.cancel();
        }
    }
}
