pub mod assembler;
pub mod history;

pub use assembler::{ChunkOutcome, EventAssembler};
pub use history::{merge_history, EventHistory, HistorySource};
