use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEvent {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolEvent {
    pub id: String,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    /// Serialized tool arguments; empty until a `tool_input` chunk lands.
    #[serde(default)]
    pub input: String,
    /// Serialized tool result; non-empty output marks the call complete.
    #[serde(default)]
    pub output: String,
}

impl ToolEvent {
    pub fn is_complete(&self) -> bool {
        !self.output.is_empty()
    }
}

/// Materialized transcript unit, rebuilt from chunks and never sent as-is
/// during a live stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Message(MessageEvent),
    Tool(ToolEvent),
}

impl Event {
    pub fn user_message(text: impl Into<String>) -> Self {
        Self::Message(MessageEvent {
            role: Role::User,
            text: text.into(),
        })
    }

    pub fn agent_message(text: impl Into<String>) -> Self {
        Self::Message(MessageEvent {
            role: Role::Agent,
            text: text.into(),
        })
    }

    pub fn tool(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::Tool(ToolEvent {
            id: id.into(),
            tool_name: tool_name.into(),
            input: input.into(),
            output: output.into(),
        })
    }

    pub fn is_agent_message(&self) -> bool {
        matches!(
            self,
            Event::Message(MessageEvent {
                role: Role::Agent,
                ..
            })
        )
    }
}

/// Wire delta. The only unit a stream ever carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chunk {
    MessageDelta {
        delta: String,
    },
    ToolStart {
        id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
    },
    ToolInput {
        id: String,
        input: String,
    },
    ToolOutput {
        id: String,
        output: String,
    },
}

impl Chunk {
    pub fn message_delta(delta: impl Into<String>) -> Self {
        Self::MessageDelta {
            delta: delta.into(),
        }
    }

    pub fn tool_start(id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self::ToolStart {
            id: id.into(),
            tool_name: tool_name.into(),
        }
    }

    pub fn tool_input(id: impl Into<String>, input: impl Into<String>) -> Self {
        Self::ToolInput {
            id: id.into(),
            input: input.into(),
        }
    }

    pub fn tool_output(id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ToolOutput {
            id: id.into(),
            output: output.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Chunk::MessageDelta { .. } => "message_delta",
            Chunk::ToolStart { .. } => "tool_start",
            Chunk::ToolInput { .. } => "tool_input",
            Chunk::ToolOutput { .. } => "tool_output",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_json_uses_snake_case_tag_and_camel_tool_name() {
        let value = serde_json::to_value(Chunk::tool_start("t1", "getWeather")).unwrap();
        assert_eq!(
            value,
            json!({ "type": "tool_start", "id": "t1", "toolName": "getWeather" })
        );

        let value = serde_json::to_value(Chunk::message_delta("Hi")).unwrap();
        assert_eq!(value, json!({ "type": "message_delta", "delta": "Hi" }));
    }

    #[test]
    fn test_event_json_shape_matches_history_payload() {
        let parsed: Event = serde_json::from_value(json!({
            "type": "tool",
            "id": "call_1",
            "toolName": "getWeather",
            "input": "{\"location\":\"Oslo\"}",
            "output": ""
        }))
        .unwrap();
        assert_eq!(
            parsed,
            Event::tool("call_1", "getWeather", "{\"location\":\"Oslo\"}", "")
        );

        let value = serde_json::to_value(Event::user_message("hello")).unwrap();
        assert_eq!(
            value,
            json!({ "type": "message", "role": "user", "text": "hello" })
        );
    }

    #[test]
    fn test_tool_event_completion_follows_output() {
        let Event::Tool(mut tool) = Event::tool("a", "x", "{}", "") else {
            unreachable!()
        };
        assert!(!tool.is_complete());
        tool.output = "{\"ok\":true}".to_string();
        assert!(tool.is_complete());
    }
}
