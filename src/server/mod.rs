pub mod agent;
pub mod event_stream;
pub mod simulate;
pub mod store;

pub use agent::{stream_agent_response, DeltaSource, DeltaStream};
pub use event_stream::{EventStream, EventStreamBody, StreamState};
pub use simulate::{demo_transcript, SimulatedAgent, SimulationOptions};
pub use store::{MemoryEventStore, TranscriptStore, MAX_PAGE_LIMIT};
