use super::client::{ByteStream, StreamResponse, StreamTransport};
use super::stream::WireFormat;
use crate::error::StreamError;
use crate::server::event_stream::EventStreamBody;
use crate::types::StreamRequest;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Scripted transport that replays fixed reads.
#[derive(Clone)]
pub struct MockTransport {
    content_type: Option<String>,
    reads: Vec<Vec<u8>>,
    failure: Option<StreamError>,
    never_ending: bool,
    requests: Arc<Mutex<Vec<StreamRequest>>>,
}

impl MockTransport {
    pub fn new(format: WireFormat, reads: Vec<Vec<u8>>) -> Self {
        Self {
            content_type: Some(format.content_type().to_string()),
            reads,
            failure: None,
            never_ending: false,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_content_type(mut self, content_type: Option<&str>) -> Self {
        self.content_type = content_type.map(ToOwned::to_owned);
        self
    }

    /// Ends the body with `error` after the scripted reads.
    pub fn failing_with(mut self, error: StreamError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Keeps the body open after the scripted reads, like a server still
    /// generating.
    pub fn never_ending(mut self) -> Self {
        self.never_ending = true;
        self
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    async fn open(
        &self,
        request: &StreamRequest,
        cancel: &CancellationToken,
    ) -> Result<StreamResponse, StreamError> {
        if cancel.is_cancelled() {
            return Err(StreamError::Aborted);
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let reads: Vec<Result<Bytes, StreamError>> = self
            .reads
            .iter()
            .cloned()
            .map(|read| Ok(Bytes::from(read)))
            .collect();
        let mut body: ByteStream = Box::pin(stream::iter(reads));
        if let Some(error) = self.failure.clone() {
            body = Box::pin(body.chain(stream::once(async move { Err(error) })));
        }
        if self.never_ending {
            body = Box::pin(body.chain(stream::pending()));
        }

        Ok(StreamResponse::new(self.content_type.clone(), body))
    }
}

type BodyFactory = dyn Fn(&StreamRequest) -> EventStreamBody + Send + Sync;

/// In-process transport wiring a consumer straight to a producer body.
///
/// Dropping the body on abort cancels the producer exactly as a closed HTTP
/// connection would.
#[derive(Clone)]
pub struct LoopbackTransport {
    factory: Arc<BodyFactory>,
}

impl LoopbackTransport {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&StreamRequest) -> EventStreamBody + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
        }
    }
}

#[async_trait]
impl StreamTransport for LoopbackTransport {
    async fn open(
        &self,
        request: &StreamRequest,
        cancel: &CancellationToken,
    ) -> Result<StreamResponse, StreamError> {
        if cancel.is_cancelled() {
            return Err(StreamError::Aborted);
        }
        let body = (self.factory)(request);
        let content_type = body.content_type().to_string();
        Ok(StreamResponse::new(Some(content_type), Box::pin(body)))
    }
}
