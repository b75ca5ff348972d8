use super::assembler::{ChunkOutcome, EventAssembler};
use crate::api::consumer::StreamHandler;
use crate::error::StreamError;
use crate::types::{Chunk, Event, HistoryPage, HistoryQuery};
use async_trait::async_trait;

#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_page(&self, query: HistoryQuery) -> Result<HistoryPage, StreamError>;
}

/// Builds the chronological transcript from newest-first pages followed by
/// the live events of the current session.
pub fn merge_history(pages: &[HistoryPage], live: &[Event]) -> Vec<Event> {
    let stored: usize = pages.iter().map(|page| page.events.len()).sum();
    let mut merged = Vec::with_capacity(stored + live.len());
    for page in pages.iter().rev() {
        merged.extend(page.events.iter().cloned());
    }
    merged.extend(live.iter().cloned());
    merged
}

/// Paged history plus the live session layered on top of it.
#[derive(Debug)]
pub struct EventHistory {
    pages: Vec<HistoryPage>,
    live: EventAssembler,
    page_size: usize,
    anchor: Option<usize>,
    has_more: bool,
}

impl EventHistory {
    pub fn new(page_size: usize) -> Self {
        Self {
            pages: Vec::new(),
            live: EventAssembler::new(),
            page_size,
            anchor: None,
            has_more: true,
        }
    }

    /// Fetches the next older page. Returns the number of events it added.
    pub async fn fetch_next_page(
        &mut self,
        source: &dyn HistorySource,
    ) -> Result<usize, StreamError> {
        if !self.has_next_page() {
            return Ok(0);
        }

        let query = HistoryQuery::new(self.pages.len(), self.page_size).anchored(self.anchor);
        let page = source.fetch_page(query).await?;

        if self.anchor.is_none() {
            self.anchor = Some(page.total);
        }
        self.has_more = page.has_more;
        let added = page.events.len();
        tracing::debug!(
            page = page.page,
            events = added,
            has_more = page.has_more,
            "loaded history page"
        );
        self.pages.push(page);
        Ok(added)
    }

    pub fn has_next_page(&self) -> bool {
        self.has_more
    }

    /// True once the first page has been fetched.
    pub fn is_loaded(&self) -> bool {
        !self.pages.is_empty()
    }

    pub fn pages(&self) -> &[HistoryPage] {
        &self.pages
    }

    pub fn push_user_message(&mut self, text: impl Into<String>) -> usize {
        self.live.push_event(Event::user_message(text))
    }

    pub fn add_chunk(&mut self, chunk: Chunk) -> ChunkOutcome {
        self.live.add_chunk(chunk)
    }

    pub fn live_events(&self) -> &[Event] {
        self.live.events()
    }

    pub fn events(&self) -> Vec<Event> {
        merge_history(&self.pages, self.live.events())
    }
}

impl StreamHandler for EventHistory {
    fn on_event_chunk(&mut self, chunk: Chunk) {
        self.add_chunk(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::store::{MemoryEventStore, TranscriptStore};

    fn page(events: Vec<Event>, page: usize, has_more: bool) -> HistoryPage {
        HistoryPage {
            total: 0,
            limit: events.len(),
            events,
            page,
            has_more,
        }
    }

    fn numbered(range: std::ops::Range<usize>) -> Vec<Event> {
        range.map(|i| Event::agent_message(format!("m{i}"))).collect()
    }

    #[test]
    fn test_merge_reverses_pages_and_appends_live() {
        let pages = vec![
            page(numbered(4..6), 0, true),
            page(numbered(2..4), 1, true),
            page(numbered(0..2), 2, false),
        ];
        let live = vec![Event::user_message("now")];

        let mut expected = numbered(0..6);
        expected.push(Event::user_message("now"));
        assert_eq!(merge_history(&pages, &live), expected);
    }

    #[test]
    fn test_merge_of_nothing_is_empty() {
        assert!(merge_history(&[], &[]).is_empty());
        assert_eq!(
            merge_history(&[], &[Event::user_message("hi")]),
            vec![Event::user_message("hi")]
        );
    }

    #[tokio::test]
    async fn test_paging_to_the_start_yields_store_order() {
        let store = MemoryEventStore::with_events(numbered(0..7));
        let mut history = EventHistory::new(3);
        assert!(!history.is_loaded());

        while history.has_next_page() {
            history.fetch_next_page(&store).await.unwrap();
        }

        assert!(history.is_loaded());
        assert_eq!(history.pages().len(), 3);
        assert_eq!(history.events(), numbered(0..7));
        assert_eq!(history.fetch_next_page(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_live_session_is_not_duplicated_by_later_pages() {
        let store = MemoryEventStore::with_events(numbered(0..4));
        let mut history = EventHistory::new(2);
        history.fetch_next_page(&store).await.unwrap();

        history.push_user_message("question");
        history.add_chunk(Chunk::message_delta("answer"));
        let session = history.live_events().to_vec();
        store.append(session.clone()).await.unwrap();

        history.fetch_next_page(&store).await.unwrap();
        assert!(!history.has_next_page());

        let mut expected = numbered(0..4);
        expected.extend(session);
        assert_eq!(history.events(), expected);
    }

    #[tokio::test]
    async fn test_history_as_stream_handler_collects_live_chunks() {
        let mut history = EventHistory::new(10);
        history.push_user_message("hi");
        history.on_event_chunk(Chunk::message_delta("hel"));
        history.on_event_chunk(Chunk::message_delta("lo"));
        assert_eq!(
            history.events(),
            vec![Event::user_message("hi"), Event::agent_message("hello")]
        );
    }

    mod proptests {
        use super::*;
        use crate::test_support::strategies;
        use proptest::prelude::*;

        fn pages_of(stored: &[Event], limit: usize) -> Vec<HistoryPage> {
            let store = MemoryEventStore::with_events(stored.to_vec());
            let mut pages = Vec::new();
            loop {
                let page = store.page(HistoryQuery::new(pages.len(), limit)).unwrap();
                let has_more = page.has_more;
                pages.push(page);
                if !has_more {
                    return pages;
                }
            }
        }

        proptest! {
            #[test]
            fn merge_is_stored_then_live(
                stored in proptest::collection::vec(strategies::event(), 0..40),
                live in proptest::collection::vec(strategies::event(), 0..10),
                limit in 1usize..8,
            ) {
                let pages = pages_of(&stored, limit);
                let mut expected = stored.clone();
                expected.extend(live.iter().cloned());
                prop_assert_eq!(merge_history(&pages, &live), expected);
            }
        }
    }
}
