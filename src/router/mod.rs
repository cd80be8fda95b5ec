//! Ingest routing
//!
//! Every request walks the same linear path:
//!
//! ```text
//! Received ──► Classified ──► Dispatched ──► Responded
//!    │                            ▲
//!    └── audio reference ─────────┘   (classification skipped)
//! ```
//!
//! Dispatch per intent:
//! - `Memory`   → folder repair, [`MemoryStore::create`]
//! - `Calendar` → [`DateParser`] start time and title, [`CalendarService::create`]
//! - `Advice`   → [`AdviceService::answer`]
//! - `Audio`    → pending marker
//!
//! When a [`ChatSink`] is configured the user text and the echo summary are
//! appended to the chat, and the first message of a chat names it.

pub mod format;
pub mod temporal;

pub use temporal::DateParser;

use crate::classifier::{match_folder, Classifier, Intent};
use crate::error::Result;
use crate::memory::{Id, MemoryStore, MemoryView};
use crate::services::{
    Advice, AdviceService, AudioNote, AudioService, CalendarEvent, CalendarService, ChatHandle,
    ChatRole, ChatSink, NewEvent,
};
use crate::taxonomy;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Memory title used when the text is empty
const DEFAULT_MEMORY_TITLE: &str = "Заметка";

/// An ingest request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub owner_id: Id,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub audio_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<Id>,
}

impl IngestRequest {
    /// Plain text request without chat or audio reference
    pub fn text(owner_id: Id, text: impl Into<String>) -> Self {
        Self {
            owner_id,
            text: text.into(),
            audio_id: None,
            chat_id: None,
        }
    }
}

/// What a request was routed to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IngestOutcome {
    Memory(MemoryView),
    Calendar(CalendarEvent),
    Advice(Advice),
    Audio(AudioNote),
}

impl IngestOutcome {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            IngestOutcome::Memory(_) => "memory",
            IngestOutcome::Calendar(_) => "calendar",
            IngestOutcome::Advice(_) => "advice",
            IngestOutcome::Audio(_) => "audio",
        }
    }
}

/// Routed result with its echo summary. The outcome sits under `result`
/// since audio notes carry a `summary` of their own.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    #[serde(rename = "result")]
    pub outcome: IngestOutcome,
    pub summary: String,
    pub chat_id: Option<Id>,
}

/// Router progress, logged at every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStage {
    Received,
    Classified,
    Dispatched,
    Responded,
}

impl fmt::Display for RouteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::Classified => write!(f, "classified"),
            Self::Dispatched => write!(f, "dispatched"),
            Self::Responded => write!(f, "responded"),
        }
    }
}

struct RouteTrace {
    owner: Id,
    stage: RouteStage,
}

impl RouteTrace {
    fn start(owner: Id) -> Self {
        tracing::info!(owner = %owner, stage = %RouteStage::Received, "Ingest stage");
        Self {
            owner,
            stage: RouteStage::Received,
        }
    }

    fn advance(&mut self, next: RouteStage, kind: &str) {
        tracing::info!(
            owner = %self.owner,
            from = %self.stage,
            stage = %next,
            kind = %kind,
            "Ingest stage"
        );
        self.stage = next;
    }
}

/// Collaborators the router dispatches to
#[derive(Clone)]
pub struct Collaborators {
    pub calendar: Arc<dyn CalendarService>,
    pub advice: Arc<dyn AdviceService>,
    pub audio: Arc<dyn AudioService>,
    pub chat: Option<Arc<dyn ChatSink>>,
}

/// Tunables for dispatch
#[derive(Debug, Clone)]
pub struct RouteSettings {
    /// Characters of the text used as a memory title
    pub title_chars: usize,
    /// Event start offset when no date is recognised
    pub fallback_offset: Duration,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            title_chars: 32,
            fallback_offset: Duration::hours(1),
        }
    }
}

/// Classifies text and dispatches it to the matching handler
#[derive(Clone)]
pub struct IngestRouter {
    classifier: Classifier,
    store: MemoryStore,
    dates: DateParser,
    services: Collaborators,
    settings: RouteSettings,
}

impl IngestRouter {
    pub fn new(
        classifier: Classifier,
        store: MemoryStore,
        dates: DateParser,
        services: Collaborators,
        settings: RouteSettings,
    ) -> Self {
        Self {
            classifier,
            store,
            dates,
            services,
            settings,
        }
    }

    /// Route a request at the current time
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse> {
        self.ingest_at(request, Utc::now()).await
    }

    /// Route a request, resolving relative dates against `now`
    pub async fn ingest_at(&self, request: IngestRequest, now: DateTime<Utc>) -> Result<IngestResponse> {
        let owner = request.owner_id;
        let mut trace = RouteTrace::start(owner);

        if let Some(reference) = request.audio_id.as_deref().filter(|r| !r.trim().is_empty()) {
            let note = self.services.audio.resolve(owner, reference).await?;
            let outcome = IngestOutcome::Audio(note);
            trace.advance(RouteStage::Dispatched, outcome.kind());
            let summary = format::summary(&outcome, self.dates.timezone())?;
            trace.advance(RouteStage::Responded, outcome.kind());
            return Ok(IngestResponse {
                outcome,
                summary,
                chat_id: None,
            });
        }

        let text = request.text.as_str();
        let chat = match &self.services.chat {
            Some(sink) => {
                let handle = sink.open(owner, request.chat_id).await?;
                sink.append(owner, handle.id, ChatRole::User, text).await?;
                Some((sink.clone(), handle))
            }
            None => None,
        };

        let intent = self.classifier.classify(text).await;
        trace.advance(RouteStage::Classified, intent.kind());

        let outcome = match intent {
            Intent::Memory { folder } => IngestOutcome::Memory(self.file_memory(owner, text, folder).await?),
            Intent::Calendar => IngestOutcome::Calendar(self.schedule(owner, text, now).await?),
            Intent::Advice => IngestOutcome::Advice(self.services.advice.answer(owner, text).await?),
            Intent::Audio => IngestOutcome::Audio(AudioNote::pending(request.audio_id.clone())),
        };
        trace.advance(RouteStage::Dispatched, outcome.kind());

        let summary = format::summary(&outcome, self.dates.timezone())?;
        let chat_id = match chat {
            Some((sink, handle)) => {
                record_reply(sink.as_ref(), owner, &handle, text, &summary).await?;
                Some(handle.id)
            }
            None => None,
        };

        trace.advance(RouteStage::Responded, outcome.kind());
        Ok(IngestResponse {
            outcome,
            summary,
            chat_id,
        })
    }

    async fn file_memory(&self, owner: Id, text: &str, folder: Option<String>) -> Result<MemoryView> {
        let folder = match folder {
            Some(f) if taxonomy::is_valid_folder(&f) => f,
            Some(f) => {
                tracing::warn!(owner = %owner, folder = %f, "Classifier folder outside taxonomy, repairing");
                match_folder(text).to_string()
            }
            None => match_folder(text).to_string(),
        };

        let title: String = text.chars().take(self.settings.title_chars).collect();
        let title = if title.is_empty() {
            DEFAULT_MEMORY_TITLE.to_string()
        } else {
            title
        };

        self.store.create(owner, &folder, &title, text).await
    }

    async fn schedule(&self, owner: Id, text: &str, now: DateTime<Utc>) -> Result<CalendarEvent> {
        let starts_at = match self.dates.parse(text, now) {
            Some(at) => at,
            None => {
                tracing::debug!(owner = %owner, "No date recognised, using fallback offset");
                now + self.settings.fallback_offset
            }
        };
        let title = self.dates.extract_event_title(text);
        self.services.calendar.create(owner, NewEvent::at(title, starts_at)).await
    }
}

async fn record_reply(
    sink: &dyn ChatSink,
    owner: Id,
    handle: &ChatHandle,
    text: &str,
    summary: &str,
) -> Result<()> {
    sink.append(owner, handle.id, ChatRole::Assistant, summary).await?;

    if handle.is_first_message() {
        let title = sink.suggest_title(text).await;
        if let Err(e) = sink.set_title(owner, handle.id, &title).await {
            tracing::warn!(owner = %owner, chat = %handle.id, error = %e, "Failed to set chat title");
        }
    }
    Ok(())
}
