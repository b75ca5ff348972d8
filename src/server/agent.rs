use super::event_stream::{EventStream, EventStreamBody};
use super::store::TranscriptStore;
use crate::api::stream::WireFormat;
use crate::error::StreamError;
use crate::types::{AgentDelta, Event};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub type DeltaStream = Pin<Box<dyn Stream<Item = anyhow::Result<AgentDelta>> + Send>>;

/// The model/tool runtime that produces deltas for one user message.
///
/// Sources receive the stream's cancellation token and are expected to stop
/// yielding once it fires; whatever they still yield is assembled into the
/// transcript but not sent.
pub trait DeltaSource: Send + 'static {
    fn deltas(self, message: String, cancel: CancellationToken) -> DeltaStream;
}

impl<F> DeltaSource for F
where
    F: FnOnce(String, CancellationToken) -> DeltaStream + Send + 'static,
{
    fn deltas(self, message: String, cancel: CancellationToken) -> DeltaStream {
        self(message, cancel)
    }
}

/// Starts producing the response to `message`.
///
/// Returns the body to hand to the HTTP layer and a task that resolves to
/// the persisted transcript: the user message followed by every assembled
/// event, stored however the stream ended.
pub fn stream_agent_response<S>(
    message: impl Into<String>,
    format: WireFormat,
    source: S,
    store: Arc<dyn TranscriptStore>,
) -> (EventStreamBody, JoinHandle<Vec<Event>>)
where
    S: DeltaSource,
{
    let message = message.into();
    let (mut stream, body) = EventStream::new(format);
    let deltas = source.deltas(message.clone(), stream.cancellation_token());

    let task = tokio::spawn(async move {
        drive(&mut stream, deltas).await;

        let mut transcript = Vec::with_capacity(stream.events().len() + 1);
        transcript.push(Event::user_message(message));
        transcript.extend(stream.into_events());

        if let Err(error) = store.append(transcript.clone()).await {
            tracing::error!(%error, "failed to persist transcript");
        }
        transcript
    });

    (body, task)
}

async fn drive(stream: &mut EventStream, mut deltas: DeltaStream) {
    while let Some(next) = deltas.next().await {
        match next {
            Ok(delta) => stream.push(delta.into_chunk()),
            Err(error) => {
                tracing::error!(error = %format!("{error:#}"), "upstream generation failed");
                stream.error(StreamError::upstream(format!("{error:#}")));
                return;
            }
        }
    }

    if stream.is_cancelled() {
        tracing::debug!(
            events = stream.events().len(),
            "consumer disconnected before the response finished"
        );
    }
    stream.close();
}
