use crate::error::StreamError;
use crate::state::history::HistorySource;
use crate::types::{Event, HistoryPage, HistoryQuery};
use async_trait::async_trait;
use std::sync::RwLock;

pub const MAX_PAGE_LIMIT: usize = 200;

/// Append-only sink for finished transcripts.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn append(&self, events: Vec<Event>) -> Result<(), StreamError>;
}

/// In-memory append-only event log with newest-first paging.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<Event>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<Event>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    pub fn len(&self) -> Result<usize, StreamError> {
        self.events
            .read()
            .map(|events| events.len())
            .map_err(|_| StreamError::store("event store lock poisoned"))
    }

    pub fn is_empty(&self) -> Result<bool, StreamError> {
        self.len().map(|len| len == 0)
    }

    pub fn snapshot(&self) -> Result<Vec<Event>, StreamError> {
        self.events
            .read()
            .map(|events| events.clone())
            .map_err(|_| StreamError::store("event store lock poisoned"))
    }

    /// Returns page `query.page` counted back from the tail (or from
    /// `query.anchor` when given), events in forward order.
    pub fn page(&self, query: HistoryQuery) -> Result<HistoryPage, StreamError> {
        let events = self
            .events
            .read()
            .map_err(|_| StreamError::store("event store lock poisoned"))?;

        let limit = query.limit.clamp(1, MAX_PAGE_LIMIT);
        let total = query.anchor.unwrap_or(events.len()).min(events.len());
        let end = total.saturating_sub(query.page.saturating_mul(limit));
        let start = end.saturating_sub(limit);

        Ok(HistoryPage {
            events: events[start..end].to_vec(),
            page: query.page,
            limit,
            has_more: start > 0,
            total,
        })
    }
}

#[async_trait]
impl TranscriptStore for MemoryEventStore {
    async fn append(&self, events: Vec<Event>) -> Result<(), StreamError> {
        let mut stored = self
            .events
            .write()
            .map_err(|_| StreamError::store("event store lock poisoned"))?;
        stored.extend(events);
        Ok(())
    }
}

#[async_trait]
impl HistorySource for MemoryEventStore {
    async fn fetch_page(&self, query: HistoryQuery) -> Result<HistoryPage, StreamError> {
        self.page(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> Vec<Event> {
        (0..n).map(|i| Event::agent_message(format!("m{i}"))).collect()
    }

    fn texts(page: &HistoryPage) -> Vec<String> {
        page.events
            .iter()
            .map(|event| match event {
                Event::Message(message) => message.text.clone(),
                Event::Tool(tool) => tool.id.clone(),
            })
            .collect()
    }

    #[test]
    fn test_page_zero_is_most_recent_window() {
        let store = MemoryEventStore::with_events(numbered(5));
        let page = store.page(HistoryQuery::new(0, 2)).unwrap();
        assert_eq!(texts(&page), vec!["m3", "m4"]);
        assert!(page.has_more);
        assert_eq!(page.total, 5);

        let page = store.page(HistoryQuery::new(2, 2)).unwrap();
        assert_eq!(texts(&page), vec!["m0"]);
        assert!(!page.has_more);
    }

    #[test]
    fn test_page_past_beginning_is_empty() {
        let store = MemoryEventStore::with_events(numbered(3));
        let page = store.page(HistoryQuery::new(5, 2)).unwrap();
        assert!(page.events.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn test_limit_is_clamped() {
        let store = MemoryEventStore::with_events(numbered(3));
        let page = store.page(HistoryQuery::new(0, 0)).unwrap();
        assert_eq!(page.limit, 1);
        assert_eq!(texts(&page), vec!["m2"]);

        let page = store.page(HistoryQuery::new(0, 10_000)).unwrap();
        assert_eq!(page.limit, MAX_PAGE_LIMIT);
        assert_eq!(page.events.len(), 3);
    }

    #[tokio::test]
    async fn test_anchor_keeps_pages_stable_across_appends() {
        let store = MemoryEventStore::with_events(numbered(4));
        let first = store.page(HistoryQuery::new(0, 2)).unwrap();

        store.append(vec![Event::user_message("new")]).await.unwrap();

        let second = store
            .page(HistoryQuery::new(1, 2).anchored(Some(first.total)))
            .unwrap();
        assert_eq!(texts(&first), vec!["m2", "m3"]);
        assert_eq!(texts(&second), vec!["m0", "m1"]);
        assert_eq!(second.total, 4);
        assert_eq!(store.len().unwrap(), 5);
    }
}
