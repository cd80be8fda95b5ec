//! In-process calendar

use super::{CalendarEvent, CalendarService, NewEvent};
use crate::error::{Error, Result};
use crate::memory::Id;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Maximum number of events returned by one listing
pub const LIST_LIMIT: usize = 50;

#[derive(Default)]
struct State {
    next_id: i64,
    events: HashMap<Id, Vec<CalendarEvent>>,
}

/// Calendar kept in memory, keyed by owner
#[derive(Clone)]
pub struct InMemoryCalendar {
    tz: String,
    state: Arc<RwLock<State>>,
}

impl InMemoryCalendar {
    /// Calendar stamping events with the given IANA timezone name
    pub fn new(tz: impl Into<String>) -> Self {
        Self {
            tz: tz.into(),
            state: Arc::new(RwLock::new(State::default())),
        }
    }
}

#[async_trait]
impl CalendarService for InMemoryCalendar {
    async fn create(&self, owner: Id, new: NewEvent) -> Result<CalendarEvent> {
        let mut state = self.state.write().await;

        let duplicate = state
            .events
            .get(&owner)
            .map(|events| {
                events
                    .iter()
                    .any(|e| e.title == new.title && e.starts_at == new.starts_at)
            })
            .unwrap_or(false);
        if duplicate {
            return Err(Error::Conflict(format!(
                "event \"{}\" at {} already exists",
                new.title,
                new.starts_at.to_rfc3339()
            )));
        }

        state.next_id += 1;
        let event = CalendarEvent {
            id: Id(state.next_id),
            title: new.title,
            description: new.description,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            tz: new.tz.unwrap_or_else(|| self.tz.clone()),
            created_at: Utc::now(),
        };
        state.events.entry(owner).or_default().push(event.clone());

        tracing::info!(owner = %owner, event = %event.id, starts_at = %event.starts_at, "Calendar event created");
        Ok(event)
    }

    async fn list(
        &self,
        owner: Id,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<CalendarEvent>> {
        let state = self.state.read().await;
        let mut events: Vec<CalendarEvent> = state
            .events
            .get(&owner)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| from.map_or(true, |f| e.starts_at >= f))
                    .filter(|e| to.map_or(true, |t| e.starts_at <= t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        events.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then(a.id.0.cmp(&b.id.0)));
        events.truncate(LIST_LIMIT);
        Ok(events)
    }

    async fn search(&self, owner: Id, query: &str, limit: usize) -> Result<Vec<CalendarEvent>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let mut events: Vec<CalendarEvent> = state
            .events
            .get(&owner)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| {
                        e.title.to_lowercase().contains(&needle)
                            || e.description
                                .as_deref()
                                .map_or(false, |d| d.to_lowercase().contains(&needle))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        events.sort_by(|a, b| b.starts_at.cmp(&a.starts_at).then(b.id.0.cmp(&a.id.0)));
        events.truncate(limit);
        tracing::debug!(owner = %owner, found = events.len(), "Calendar search");
        Ok(events)
    }
}
