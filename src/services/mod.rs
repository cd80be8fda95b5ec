//! Collaborator services behind the router
//!
//! The router only talks to these traits. Each has an in-process
//! implementation so the binary runs end to end without external systems:
//!
//! ```text
//! IngestRouter ─► CalendarService (InMemoryCalendar)
//!              ─► AdviceService   (MemoryAdvisor ─► MemoryStore::recall + LanguageModel)
//!              ─► AudioService    (AudioRegistry)
//!              ─► ChatSink        (InMemoryChatLog)
//!
//! UnifiedSearch ─► MemoryStore::search + CalendarService::search
//! ```

pub mod advice;
pub mod audio;
pub mod calendar;
pub mod chat;
pub mod search;

pub use advice::MemoryAdvisor;
pub use audio::AudioRegistry;
pub use calendar::InMemoryCalendar;
pub use chat::{fallback_title, InMemoryChatLog};
pub use search::{EventHit, MemoryHit, SearchResults, UnifiedSearch};

use crate::error::Result;
use crate::memory::Id;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scheduled calendar event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: Id,
    pub title: String,
    pub description: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    /// IANA timezone the start time was resolved in
    pub tz: String,
    pub created_at: DateTime<Utc>,
}

/// Event to be scheduled
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    /// Timezone override; the calendar's own zone when `None`
    pub tz: Option<String>,
}

impl NewEvent {
    /// Event with only a title and a start time
    pub fn at(title: impl Into<String>, starts_at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            description: None,
            starts_at,
            ends_at: None,
            tz: None,
        }
    }
}

/// Answer to an advice request together with the memories it drew on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advice {
    pub answer: String,
    /// `"[folder] title: content"` lines fed to the model
    pub used_context: Vec<String>,
    pub query: String,
}

/// Audio note as reported back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AudioNote {
    Ready {
        id: String,
        transcript: Option<String>,
        summary: Option<String>,
        #[serde(rename = "nextSteps")]
        next_steps: Vec<String>,
    },
    Missing {
        id: String,
        #[serde(rename = "notFound")]
        not_found: bool,
    },
    /// Text classified as audio; transcription happens out of band
    Pending {
        note: String,
        #[serde(rename = "audioId")]
        audio_id: Option<String>,
    },
}

impl AudioNote {
    /// Marker for a reference nobody registered
    pub fn missing(id: impl Into<String>) -> Self {
        AudioNote::Missing {
            id: id.into(),
            not_found: true,
        }
    }

    /// Marker for text that refers to an audio note
    pub fn pending(audio_id: Option<String>) -> Self {
        AudioNote::Pending {
            note: "audio flow".to_string(),
            audio_id,
        }
    }
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A chat as seen by the router when a request arrives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatHandle {
    pub id: Id,
    /// Messages already in the chat before this request
    pub messages: usize,
}

impl ChatHandle {
    /// Whether the next message is the first one in the chat
    pub fn is_first_message(&self) -> bool {
        self.messages == 0
    }
}

/// Calendar collaborator
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Schedule an event. Same title at the same instant is a `Conflict`.
    async fn create(&self, owner: Id, event: NewEvent) -> Result<CalendarEvent>;

    /// Events of `owner` starting within the optional bounds, ascending.
    async fn list(
        &self,
        owner: Id,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<CalendarEvent>>;

    /// Up to `limit` events of `owner` whose title or description contains
    /// `query` (case-insensitive), latest start first. A blank query matches
    /// nothing.
    async fn search(&self, owner: Id, query: &str, limit: usize) -> Result<Vec<CalendarEvent>>;
}

/// Advice collaborator
#[async_trait]
pub trait AdviceService: Send + Sync {
    async fn answer(&self, owner: Id, query: &str) -> Result<Advice>;
}

/// Audio note collaborator
#[async_trait]
pub trait AudioService: Send + Sync {
    /// Look up an externally supplied audio reference. Unknown references
    /// resolve to [`AudioNote::missing`], not an error.
    async fn resolve(&self, owner: Id, reference: &str) -> Result<AudioNote>;
}

/// Chat transcript collaborator
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Open an existing chat of `owner`, or create one when `chat` is `None`.
    async fn open(&self, owner: Id, chat: Option<Id>) -> Result<ChatHandle>;

    /// Append a message to a chat of `owner`.
    async fn append(&self, owner: Id, chat: Id, role: ChatRole, text: &str) -> Result<()>;

    /// Title for a chat, derived from its first message.
    async fn suggest_title(&self, first_message: &str) -> String;

    /// Rename a chat of `owner`.
    async fn set_title(&self, owner: Id, chat: Id, title: &str) -> Result<()>;
}
