use crate::config::Config;
use crate::error::StreamError;
use crate::state::history::HistorySource;
use crate::types::{HistoryPage, HistoryQuery, StreamRequest};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// An opened stream: the declared content type plus the raw body.
pub struct StreamResponse {
    pub content_type: Option<String>,
    pub body: ByteStream,
}

impl StreamResponse {
    pub fn new(content_type: Option<String>, body: ByteStream) -> Self {
        Self { content_type, body }
    }
}

/// Opens the byte stream for one request.
///
/// Implementations must return `StreamError::Aborted` when `cancel` fires
/// before the response arrives.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open(
        &self,
        request: &StreamRequest,
        cancel: &CancellationToken,
    ) -> Result<StreamResponse, StreamError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    stream_url: String,
}

impl HttpTransport {
    pub fn new(stream_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            stream_url: stream_url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.stream_url.clone())
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    async fn open(
        &self,
        request: &StreamRequest,
        cancel: &CancellationToken,
    ) -> Result<StreamResponse, StreamError> {
        let send = self
            .http
            .post(&self.stream_url)
            .header("content-type", "application/json")
            .json(request)
            .send();

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StreamError::Aborted),
            response = send => response,
        };
        let response = sent
            .map_err(|error| map_request_error(error, &self.stream_url))?
            .error_for_status()
            .map_err(|error| map_request_error(error, &self.stream_url))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned);

        let url = self.stream_url.clone();
        let body = response
            .bytes_stream()
            .map(move |item| item.map_err(|error| map_request_error(error, &url)));

        Ok(StreamResponse::new(content_type, Box::pin(body)))
    }
}

/// Client for the paginated history endpoint.
#[derive(Clone)]
pub struct HistoryClient {
    http: reqwest::Client,
    history_url: String,
}

impl HistoryClient {
    pub fn new(history_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            history_url: history_url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.history_url.clone())
    }
}

#[async_trait]
impl HistorySource for HistoryClient {
    async fn fetch_page(&self, query: HistoryQuery) -> Result<HistoryPage, StreamError> {
        let response = self
            .http
            .get(&self.history_url)
            .query(&query)
            .send()
            .await
            .map_err(|error| map_request_error(error, &self.history_url))?
            .error_for_status()
            .map_err(|error| map_request_error(error, &self.history_url))?;

        response
            .json::<HistoryPage>()
            .await
            .map_err(|error| StreamError::Decode(format!("invalid history page: {error}")))
    }
}

fn map_request_error(error: reqwest::Error, request_url: &str) -> StreamError {
    let status = error.status().map(|status| status.as_u16());
    let message = if error.is_connect() {
        format!("cannot reach endpoint '{request_url}': {error}")
    } else if error.is_timeout() {
        format!("request to '{request_url}' timed out: {error}")
    } else if let Some(status) = status {
        format!("endpoint '{request_url}' returned HTTP {status}: {error}")
    } else {
        format!("request to '{request_url}' failed: {error}")
    };
    StreamError::Transport { message, status }
}
