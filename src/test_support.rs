use tokio::sync::Mutex as AsyncMutex;

/// Process-wide lock for tests that mutate environment variables.
/// Use `.blocking_lock()` in sync tests and `.lock().await` in async tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

pub mod strategies {
    use crate::types::{Chunk, Event};
    use proptest::prelude::*;

    /// Empty, ASCII and multi-byte text.
    pub fn text() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            "[a-z ]{1,12}",
            "[a-zé中😀 \n\"]{1,8}",
        ]
    }

    pub fn tool_id() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("t1".to_string()),
            Just("t2".to_string()),
            Just("orphan".to_string()),
            Just(String::new()),
        ]
    }

    pub fn chunk() -> impl Strategy<Value = Chunk> {
        prop_oneof![
            text().prop_map(|delta| Chunk::message_delta(delta)),
            (tool_id(), text()).prop_map(|(id, name)| Chunk::tool_start(id, name)),
            (tool_id(), text()).prop_map(|(id, input)| Chunk::tool_input(id, input)),
            (tool_id(), text()).prop_map(|(id, output)| Chunk::tool_output(id, output)),
        ]
    }

    pub fn event() -> impl Strategy<Value = Event> {
        prop_oneof![
            text().prop_map(|text| Event::user_message(text)),
            text().prop_map(|text| Event::agent_message(text)),
            (tool_id(), text(), text(), text())
                .prop_map(|(id, name, input, output)| Event::tool(id, name, input, output)),
        ]
    }
}
