//! Audio note registry
//!
//! Transcription happens elsewhere; this registry only holds finished
//! transcripts so the router can resolve references to them.

use super::{AudioNote, AudioService};
use crate::error::Result;
use crate::memory::Id;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Transcript {
    transcript: Option<String>,
    summary: Option<String>,
    next_steps: Vec<String>,
}

/// Owner-scoped map of audio references to transcripts
#[derive(Clone, Default)]
pub struct AudioRegistry {
    notes: Arc<RwLock<HashMap<(Id, String), Transcript>>>,
}

impl AudioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished transcript for `reference`
    pub async fn register(
        &self,
        owner: Id,
        reference: &str,
        transcript: Option<String>,
        summary: Option<String>,
        next_steps: Vec<String>,
    ) {
        self.notes.write().await.insert(
            (owner, reference.to_string()),
            Transcript {
                transcript,
                summary,
                next_steps,
            },
        );
        tracing::debug!(owner = %owner, reference = %reference, "Audio note registered");
    }
}

#[async_trait]
impl AudioService for AudioRegistry {
    async fn resolve(&self, owner: Id, reference: &str) -> Result<AudioNote> {
        let notes = self.notes.read().await;
        Ok(match notes.get(&(owner, reference.to_string())) {
            Some(note) => AudioNote::Ready {
                id: reference.to_string(),
                transcript: note.transcript.clone(),
                summary: note.summary.clone(),
                next_steps: note.next_steps.clone(),
            },
            None => AudioNote::missing(reference),
        })
    }
}
