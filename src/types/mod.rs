pub mod api;
pub mod event;

pub use api::{AgentDelta, HistoryPage, HistoryQuery, StreamRequest};
pub use event::{Chunk, Event, MessageEvent, Role, ToolEvent};
