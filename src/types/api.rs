use super::event::{Chunk, Event};
use serde::{Deserialize, Serialize};

/// Body of the `POST` that opens a stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamRequest {
    pub message: String,
}

impl StreamRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Query parameters of the history endpoint.
///
/// `anchor` pins the store length seen by the first page so that later
/// pages do not shift when new transcripts are appended in between.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryQuery {
    pub page: usize,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<usize>,
}

impl HistoryQuery {
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page,
            limit,
            anchor: None,
        }
    }

    pub fn anchored(mut self, anchor: Option<usize>) -> Self {
        self.anchor = anchor;
        self
    }
}

/// One newest-first window of persisted events, in forward order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryPage {
    pub events: Vec<Event>,
    pub page: usize,
    pub limit: usize,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
    pub total: usize,
}

/// Delta emitted by the model/tool runtime feeding a producer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentDelta {
    TextDelta {
        text: String,
    },
    ToolStart {
        id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
    },
    ToolCall {
        id: String,
        input: serde_json::Value,
    },
    ToolResult {
        id: String,
        output: serde_json::Value,
    },
}

impl AgentDelta {
    /// Maps the delta 1:1 onto the wire chunk, serializing tool payloads
    /// to JSON text.
    pub fn into_chunk(self) -> Chunk {
        match self {
            AgentDelta::TextDelta { text } => Chunk::MessageDelta { delta: text },
            AgentDelta::ToolStart { id, tool_name } => Chunk::ToolStart { id, tool_name },
            AgentDelta::ToolCall { id, input } => Chunk::ToolInput {
                id,
                input: input.to_string(),
            },
            AgentDelta::ToolResult { id, output } => Chunk::ToolOutput {
                id,
                output: output.to_string(),
            },
        }
    }
}
