use crate::api::consumer::StreamHandler;
use crate::types::{Chunk, Event, ToolEvent};
use std::collections::HashMap;

/// Effect of folding one chunk, for callers that re-render per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Started(usize),
    Updated(usize),
    /// The chunk referenced a tool id with no matching `tool_start`.
    Dropped,
}

/// Deterministic reducer from an ordered chunk sequence to an ordered event
/// list.
///
/// The same type runs on the producer (to build the persisted transcript)
/// and on the consumer (to build renderable state), so both ends agree on
/// the canonical transcript for any chunk sequence.
#[derive(Debug, Clone, Default)]
pub struct EventAssembler {
    events: Vec<Event>,
    tool_index: HashMap<String, usize>,
    dropped_chunks: usize,
}

impl EventAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live view of the events assembled so far.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of tool input/output chunks discarded for lack of a matching
    /// tool event.
    pub fn dropped_chunks(&self) -> usize {
        self.dropped_chunks
    }

    /// Appends an already-complete event, such as the locally typed user
    /// message. Closes any open agent message.
    pub fn push_event(&mut self, event: Event) -> usize {
        let index = self.events.len();
        if let Event::Tool(tool) = &event {
            self.tool_index.entry(tool.id.clone()).or_insert(index);
        }
        self.events.push(event);
        index
    }

    pub fn add_chunk(&mut self, chunk: Chunk) -> ChunkOutcome {
        match chunk {
            Chunk::MessageDelta { delta } => {
                let open = self.events.last_mut().filter(|event| event.is_agent_message());
                if let Some(Event::Message(message)) = open {
                    message.text.push_str(&delta);
                    return ChunkOutcome::Updated(self.events.len() - 1);
                }
                ChunkOutcome::Started(self.push_event(Event::agent_message(delta)))
            }
            Chunk::ToolStart { id, tool_name } => {
                ChunkOutcome::Started(self.push_event(Event::tool(id, tool_name, "", "")))
            }
            Chunk::ToolInput { id, input } => self.update_tool(&id, "tool_input", |tool| {
                tool.input = input;
            }),
            Chunk::ToolOutput { id, output } => self.update_tool(&id, "tool_output", |tool| {
                tool.output = output;
            }),
        }
    }

    fn update_tool(
        &mut self,
        id: &str,
        kind: &'static str,
        apply: impl FnOnce(&mut ToolEvent),
    ) -> ChunkOutcome {
        let Some(&index) = self.tool_index.get(id) else {
            self.dropped_chunks += 1;
            tracing::warn!(tool_id = id, chunk = kind, "dropping chunk for unknown tool id");
            return ChunkOutcome::Dropped;
        };
        match self.events.get_mut(index) {
            Some(Event::Tool(tool)) => {
                apply(tool);
                ChunkOutcome::Updated(index)
            }
            _ => {
                self.dropped_chunks += 1;
                ChunkOutcome::Dropped
            }
        }
    }
}

impl StreamHandler for EventAssembler {
    fn on_event_chunk(&mut self, chunk: Chunk) {
        self.add_chunk(chunk);
    }
}
