//! One query over memories and calendar events

use super::{CalendarEvent, CalendarService};
use crate::error::{Error, Result};
use crate::memory::{Id, MemoryStore, MemorySummary, SearchQuery};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Hits returned per section
pub const SECTION_LIMIT: usize = 5;

/// Memory hit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "memory", rename_all = "camelCase")]
pub struct MemoryHit {
    pub id: Id,
    pub title: String,
    pub snippet: String,
    pub folder: String,
    pub created_at: DateTime<Utc>,
}

impl From<MemorySummary> for MemoryHit {
    fn from(m: MemorySummary) -> Self {
        Self {
            id: m.id,
            title: m.title,
            snippet: m.snippet,
            folder: m.folder,
            created_at: m.created_at,
        }
    }
}

/// Calendar event hit; the snippet is the event description
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "event", rename_all = "camelCase")]
pub struct EventHit {
    pub id: Id,
    pub title: String,
    pub snippet: String,
    pub starts_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<CalendarEvent> for EventHit {
    fn from(e: CalendarEvent) -> Self {
        Self {
            id: e.id,
            title: e.title,
            snippet: e.description.unwrap_or_default(),
            starts_at: e.starts_at,
            created_at: e.created_at,
        }
    }
}

/// Combined search result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub memories: Vec<MemoryHit>,
    pub events: Vec<EventHit>,
    pub total: usize,
}

/// Semantic memory search and calendar text search run side by side
#[derive(Clone)]
pub struct UnifiedSearch {
    store: MemoryStore,
    calendar: Arc<dyn CalendarService>,
}

impl UnifiedSearch {
    pub fn new(store: MemoryStore, calendar: Arc<dyn CalendarService>) -> Self {
        Self { store, calendar }
    }

    /// Search both sources for `query`. A blank query yields empty results.
    ///
    /// A failing source contributes no hits; decryption failures propagate.
    pub async fn search(&self, owner: Id, query: &str) -> Result<SearchResults> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResults::default());
        }

        let memory_query = SearchQuery {
            q: Some(query.to_string()),
            folder: None,
        };
        let (memories, events) = tokio::join!(
            self.store.search(owner, memory_query),
            self.calendar.search(owner, query, SECTION_LIMIT)
        );

        let memories: Vec<MemoryHit> = match memories {
            Ok(page) => page.items.into_iter().take(SECTION_LIMIT).map(MemoryHit::from).collect(),
            Err(e @ Error::Decryption(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(owner = %owner, error = %e, "Memory search failed");
                Vec::new()
            }
        };
        let events: Vec<EventHit> = match events {
            Ok(events) => events.into_iter().map(EventHit::from).collect(),
            Err(e) => {
                tracing::warn!(owner = %owner, error = %e, "Event search failed");
                Vec::new()
            }
        };

        tracing::info!(
            owner = %owner,
            memories = memories.len(),
            events = events.len(),
            "Combined search"
        );

        Ok(SearchResults {
            total: memories.len() + events.len(),
            memories,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryConfig, RefreshConfig};
    use crate::crypto::{Codec, EncryptionKey};
    use crate::embedding::Embedder;
    use crate::memory::InMemoryBackend;
    use crate::services::{InMemoryCalendar, NewEvent};
    use chrono::TimeZone;

    fn setup() -> (UnifiedSearch, MemoryStore, InMemoryCalendar) {
        let config = MemoryConfig {
            embedding_dimension: 16,
            fallback_components: 16,
            ..Default::default()
        };
        let store = MemoryStore::new(
            Arc::new(InMemoryBackend::new()),
            Arc::new(Codec::new(&EncryptionKey::generate()).unwrap()),
            Embedder::offline(&config),
            config,
            &RefreshConfig::default(),
        );
        let calendar = InMemoryCalendar::new("Europe/Moscow");
        (
            UnifiedSearch::new(store.clone(), Arc::new(calendar.clone())),
            store,
            calendar,
        )
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_combines_memories_and_events() {
        let (search, store, calendar) = setup();
        store.create(Id(1), "Визиты к врачам", "стоматолог", "стоматолог доктор Иванов").await.unwrap();
        calendar
            .create(
                Id(1),
                NewEvent {
                    description: Some("пломба".to_string()),
                    ..NewEvent::at("стоматолог", at(9))
                },
            )
            .await
            .unwrap();

        let results = search.search(Id(1), " стоматолог ").await.unwrap();
        assert_eq!(results.memories.len(), 1);
        assert_eq!(results.events.len(), 1);
        assert_eq!(results.total, 2);
        assert_eq!(results.events[0].snippet, "пломба");

        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["memories"][0]["type"], "memory");
        assert_eq!(json["memories"][0]["folder"], "Визиты к врачам");
        assert_eq!(json["events"][0]["type"], "event");
        assert_eq!(json["events"][0]["startsAt"], "2025-03-10T09:00:00Z");
    }

    #[tokio::test]
    async fn test_sections_are_capped() {
        let (search, store, calendar) = setup();
        for i in 0..8 {
            store.create(Id(1), "Семья", "кот", &format!("кот {}", i)).await.unwrap();
            calendar.create(Id(1), NewEvent::at(format!("кот {}", i), at(i))).await.unwrap();
        }

        let results = search.search(Id(1), "кот").await.unwrap();
        assert_eq!(results.memories.len(), SECTION_LIMIT);
        assert_eq!(results.events.len(), SECTION_LIMIT);
        assert_eq!(results.total, 2 * SECTION_LIMIT);
        assert_eq!(results.events[0].title, "кот 7");
    }

    #[tokio::test]
    async fn test_blank_query_is_empty() {
        let (search, store, _) = setup();
        store.create(Id(1), "Семья", "кот", "кот").await.unwrap();
        assert_eq!(search.search(Id(1), "   ").await.unwrap(), SearchResults::default());
    }

    #[tokio::test]
    async fn test_other_owners_are_invisible() {
        let (search, store, calendar) = setup();
        store.create(Id(2), "Семья", "кот", "кот").await.unwrap();
        calendar.create(Id(2), NewEvent::at("кот", at(9))).await.unwrap();
        let results = search.search(Id(1), "кот").await.unwrap();
        assert_eq!(results.total, 0);
    }
}
