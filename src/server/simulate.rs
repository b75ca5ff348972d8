use super::agent::{DeltaSource, DeltaStream};
use crate::types::{AgentDelta, Chunk, Event};
use futures::{stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TEXT_SLICE_CHARS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationOptions {
    /// Pause before the first delta.
    pub initial_delay: Duration,
    /// Pause after each text delta.
    pub text_delay: Duration,
    /// Pause after each tool delta.
    pub tool_delay: Duration,
    /// Fail the stream once this many deltas have been yielded.
    pub fail_after: Option<usize>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            text_delay: Duration::from_millis(30),
            tool_delay: Duration::from_millis(500),
            fail_after: None,
        }
    }
}

impl SimulationOptions {
    pub fn instant() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            text_delay: Duration::ZERO,
            tool_delay: Duration::ZERO,
            fail_after: None,
        }
    }

    pub fn with_fail_after(mut self, fail_after: Option<usize>) -> Self {
        self.fail_after = fail_after;
        self
    }
}

/// Replays a finished event as the chunks that would have produced it.
/// Messages are cut into short slices on char boundaries.
pub fn events_to_chunks(event: &Event) -> Vec<Chunk> {
    match event {
        Event::Message(message) => {
            let chars: Vec<char> = message.text.chars().collect();
            chars
                .chunks(TEXT_SLICE_CHARS)
                .map(|slice| Chunk::message_delta(slice.iter().collect::<String>()))
                .collect()
        }
        Event::Tool(tool) => vec![
            Chunk::tool_start(tool.id.clone(), tool.tool_name.clone()),
            Chunk::tool_input(tool.id.clone(), tool.input.clone()),
            Chunk::tool_output(tool.id.clone(), tool.output.clone()),
        ],
    }
}

fn payload(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

fn chunk_to_delta(chunk: Chunk) -> AgentDelta {
    match chunk {
        Chunk::MessageDelta { delta } => AgentDelta::TextDelta { text: delta },
        Chunk::ToolStart { id, tool_name } => AgentDelta::ToolStart { id, tool_name },
        Chunk::ToolInput { id, input } => AgentDelta::ToolCall {
            id,
            input: payload(input),
        },
        Chunk::ToolOutput { id, output } => AgentDelta::ToolResult {
            id,
            output: payload(output),
        },
    }
}

struct Replay {
    pending: VecDeque<AgentDelta>,
    options: SimulationOptions,
    yielded: usize,
    next_delay: Option<Duration>,
    failed: bool,
}

/// Paced delta stream replaying `events`. Stops as soon as `cancel` fires.
pub fn simulated_deltas(
    events: &[Event],
    options: SimulationOptions,
    cancel: CancellationToken,
) -> DeltaStream {
    let pending = events
        .iter()
        .flat_map(events_to_chunks)
        .map(chunk_to_delta)
        .collect();
    let replay = Replay {
        pending,
        options,
        yielded: 0,
        next_delay: Some(options.initial_delay),
        failed: false,
    };

    let deltas = stream::unfold(replay, |mut replay| async move {
        if let Some(delay) = replay.next_delay.take() {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        if replay.failed {
            return None;
        }
        if replay.options.fail_after == Some(replay.yielded) {
            replay.failed = true;
            return Some((
                Err(anyhow::anyhow!(
                    "simulated streaming error: connection interrupted"
                )),
                replay,
            ));
        }

        let delta = replay.pending.pop_front()?;
        replay.yielded += 1;
        replay.next_delay = Some(match delta {
            AgentDelta::TextDelta { .. } => replay.options.text_delay,
            _ => replay.options.tool_delay,
        });
        Some((Ok(delta), replay))
    });

    Box::pin(deltas.take_until(cancel.cancelled_owned()))
}

/// [`DeltaSource`] that ignores the user message and replays a fixed
/// transcript.
#[derive(Debug, Clone)]
pub struct SimulatedAgent {
    events: Vec<Event>,
    options: SimulationOptions,
}

impl SimulatedAgent {
    pub fn new(events: Vec<Event>, options: SimulationOptions) -> Self {
        Self { events, options }
    }

    pub fn demo(options: SimulationOptions) -> Self {
        Self::new(demo_transcript(), options)
    }
}

impl DeltaSource for SimulatedAgent {
    fn deltas(self, message: String, cancel: CancellationToken) -> DeltaStream {
        tracing::debug!(chars = message.chars().count(), "replaying simulated transcript");
        simulated_deltas(&self.events, self.options, cancel)
    }
}

/// Sample website performance investigation with several tool calls.
pub fn demo_transcript() -> Vec<Event> {
    vec![
        Event::agent_message(
            "I'll analyze the website performance for you. Let me start by checking the current status.",
        ),
        Event::tool(
            "call_metrics",
            "fetchWebsiteMetrics",
            r#"{"metrics":["load_time","size","requests"],"url":"https://example.com"}"#,
            r#"{"load_time":"3.2s","status":"ok","total_requests":47,"total_size":"2.1MB"}"#,
        ),
        Event::agent_message(
            "The page takes 3.2 seconds to load with 47 requests. Let me break down where the time is being spent.",
        ),
        Event::tool(
            "call_timeline",
            "analyzePerformanceTimeline",
            r#"{"url":"https://example.com"}"#,
            r#"{"breakdown":{"css":"0.5s","fonts":"0.2s","html":"0.8s","images":"0.3s","javascript":"1.4s"}}"#,
        ),
        Event::agent_message(
            "JavaScript takes the most time (1.4s). Let me find which scripts cause the bottleneck.",
        ),
        Event::tool(
            "call_assets",
            "identifyLargeAssets",
            r#"{"minSize":"50KB","type":"javascript","url":"https://example.com"}"#,
            r#"{"assets":[{"blocking":true,"name":"bundle.js","size":"450KB"},{"blocking":true,"name":"vendor.js","size":"380KB"}]}"#,
        ),
        Event::agent_message(
            "Two large blocking scripts: bundle.js (450KB) and vendor.js (380KB). Checking the caching strategy next.",
        ),
        Event::tool(
            "call_cache",
            "analyzeCacheHeaders",
            r#"{"url":"https://example.com"}"#,
            r#"{"images":{"cache_control":"no-cache"},"static_assets":{"cache_control":"public, max-age=3600"}}"#,
        ),
        Event::agent_message(
            "Enabling tree-shaking and longer cache lifetimes should cut load time noticeably.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::assembler::EventAssembler;
    use tokio::time::Instant;

    async fn collect(stream: DeltaStream) -> (Vec<AgentDelta>, Option<String>) {
        let mut stream = stream;
        let mut deltas = Vec::new();
        let mut failure = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(delta) => deltas.push(delta),
                Err(error) => failure = Some(error.to_string()),
            }
        }
        (deltas, failure)
    }

    #[test]
    fn test_message_is_sliced_on_char_boundaries() {
        let chunks = events_to_chunks(&Event::agent_message("héllo wörld✓"));
        assert_eq!(
            chunks,
            vec![
                Chunk::message_delta("héllo"),
                Chunk::message_delta(" wörl"),
                Chunk::message_delta("d✓"),
            ]
        );
        assert!(events_to_chunks(&Event::agent_message("")).is_empty());
    }

    #[test]
    fn test_tool_event_becomes_start_input_output() {
        let chunks = events_to_chunks(&Event::tool("t1", "lookup", "{}", "[]"));
        assert_eq!(
            chunks,
            vec![
                Chunk::tool_start("t1", "lookup"),
                Chunk::tool_input("t1", "{}"),
                Chunk::tool_output("t1", "[]"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_reassembles_demo_transcript() {
        let started = Instant::now();
        let stream = simulated_deltas(
            &demo_transcript(),
            SimulationOptions::default(),
            CancellationToken::new(),
        );
        let (deltas, failure) = collect(stream).await;

        assert!(failure.is_none());
        assert!(started.elapsed() >= Duration::from_millis(1000));

        let mut assembler = EventAssembler::new();
        for delta in deltas {
            assembler.add_chunk(delta.into_chunk());
        }
        assert_eq!(assembler.events(), demo_transcript().as_slice());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_after_yields_error_then_ends() {
        let options = SimulationOptions::default().with_fail_after(Some(4));
        let stream = simulated_deltas(&demo_transcript(), options, CancellationToken::new());
        let (deltas, failure) = collect(stream).await;

        assert_eq!(deltas.len(), 4);
        assert_eq!(
            failure.as_deref(),
            Some("simulated streaming error: connection interrupted")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_replay() {
        let cancel = CancellationToken::new();
        let mut stream = simulated_deltas(
            &demo_transcript(),
            SimulationOptions::default(),
            cancel.clone(),
        );

        assert!(stream.next().await.is_some());
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_non_json_tool_payload_is_replayed_as_json_string() {
        let delta = chunk_to_delta(Chunk::tool_input("t", "not json"));
        assert_eq!(delta.into_chunk(), Chunk::tool_input("t", "\"not json\""));
        let delta = chunk_to_delta(Chunk::tool_output("t", "{\"a\":1}"));
        assert_eq!(delta.into_chunk(), Chunk::tool_output("t", "{\"a\":1}"));
    }
}
