//! Pipeline wiring
//!
//! [`AssistantBuilder`] turns a [`MemoriaConfig`] plus key material into a
//! ready [`Assistant`]: storage backend, codec, embedder, classifier,
//! collaborators and router. Without an API key every remote strategy is
//! disabled and the deterministic fallbacks run.

use crate::classifier::Classifier;
use crate::config::{MemoriaConfig, StorageBackend};
use crate::crypto::{Codec, EncryptionKey};
use crate::embedding::Embedder;
use crate::error::Result;
use crate::llm::{EmbeddingModel, GeminiClient, LanguageModel};
use crate::memory::{InMemoryBackend, MemoryBackend, MemoryStore, SqliteBackend};
use crate::router::{Collaborators, DateParser, IngestRouter, RouteSettings};
use crate::services::{
    AudioRegistry, CalendarService, ChatSink, InMemoryCalendar, InMemoryChatLog, MemoryAdvisor,
    UnifiedSearch,
};
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;

/// A fully wired assistant
#[derive(Clone)]
pub struct Assistant {
    config: MemoriaConfig,
    classifier: Classifier,
    store: MemoryStore,
    router: IngestRouter,
    calendar: Arc<dyn CalendarService>,
    advisor: MemoryAdvisor,
    audio: AudioRegistry,
    chats: InMemoryChatLog,
    search: UnifiedSearch,
}

impl Assistant {
    /// Configuration the assistant was built from
    pub fn config(&self) -> &MemoriaConfig {
        &self.config
    }

    /// Intent classifier
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Encrypted memory store
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Ingest router
    pub fn router(&self) -> &IngestRouter {
        &self.router
    }

    /// Calendar collaborator
    pub fn calendar(&self) -> &Arc<dyn CalendarService> {
        &self.calendar
    }

    /// Advice over the user's memories
    pub fn advisor(&self) -> &MemoryAdvisor {
        &self.advisor
    }

    /// Combined memory and event search
    pub fn search(&self) -> &UnifiedSearch {
        &self.search
    }

    /// Audio note registry
    pub fn audio(&self) -> &AudioRegistry {
        &self.audio
    }

    /// Chat transcripts
    pub fn chats(&self) -> &InMemoryChatLog {
        &self.chats
    }

    /// Whether classification goes to a remote model first
    pub fn is_remote(&self) -> bool {
        self.classifier.is_remote()
    }

    /// Stop background embedding refresh
    pub async fn shutdown(&self) {
        self.store.refresher().shutdown().await;
        tracing::info!("Assistant stopped");
    }
}

/// Builder for [`Assistant`]
pub struct AssistantBuilder {
    config: MemoriaConfig,
    key: Option<EncryptionKey>,
    language_model: Option<Arc<dyn LanguageModel>>,
    embedding_model: Option<Arc<dyn EmbeddingModel>>,
    offline: bool,
}

impl AssistantBuilder {
    /// Builder with default configuration
    pub fn new() -> Self {
        Self {
            config: MemoriaConfig::default(),
            key: None,
            language_model: None,
            embedding_model: None,
            offline: false,
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: MemoriaConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this key instead of reading `crypto.key_env`
    pub fn key(mut self, key: EncryptionKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Use this language model instead of the configured provider
    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    /// Use this embedding model instead of the configured provider
    pub fn embedding_model(mut self, model: Arc<dyn EmbeddingModel>) -> Self {
        self.embedding_model = Some(model);
        self
    }

    /// Skip the configured provider entirely
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Build the assistant. Must run inside a Tokio runtime.
    pub fn build(self) -> Result<Assistant> {
        let config = self.config;
        config.validate()?;

        let key = match self.key {
            Some(key) => key,
            None => EncryptionKey::from_env(&config.crypto.key_env)?,
        };
        let codec = Arc::new(Codec::new(&key)?);

        let (language_model, embedding_model) = if self.offline {
            (None, None)
        } else {
            let provider = match (&self.language_model, &self.embedding_model) {
                (Some(_), Some(_)) => None,
                _ => GeminiClient::from_config(&config.models)?.map(Arc::new),
            };
            (
                self.language_model
                    .or_else(|| provider.clone().map(|p| p as Arc<dyn LanguageModel>)),
                self.embedding_model
                    .or_else(|| provider.map(|p| p as Arc<dyn EmbeddingModel>)),
            )
        };

        let timeout = Duration::from_secs(config.models.request_timeout_secs);

        let backend: Arc<dyn MemoryBackend> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(InMemoryBackend::new()),
            StorageBackend::Sqlite => Arc::new(SqliteBackend::open(&config.storage.path)?),
        };

        let embedder = match &embedding_model {
            Some(model) => Embedder::new(
                model.clone(),
                config.models.embedding_models.clone(),
                &config.memory,
                timeout,
            ),
            None => Embedder::offline(&config.memory),
        };

        let classifier = match &language_model {
            Some(model) => Classifier::new(model.clone(), timeout),
            None => Classifier::offline(),
        };

        let store = MemoryStore::new(
            backend,
            codec,
            embedder,
            config.memory.clone(),
            &config.refresh,
        );

        let tz = config.calendar.timezone()?;
        let calendar: Arc<dyn CalendarService> = Arc::new(InMemoryCalendar::new(tz.name()));
        let audio = AudioRegistry::new();
        let chats = InMemoryChatLog::new(language_model.clone(), timeout);
        let advisor = MemoryAdvisor::new(store.clone(), language_model.clone(), timeout);

        let router = IngestRouter::new(
            classifier.clone(),
            store.clone(),
            DateParser::new(tz)?,
            Collaborators {
                calendar: calendar.clone(),
                advice: Arc::new(advisor.clone()),
                audio: Arc::new(audio.clone()),
                chat: Some(Arc::new(chats.clone()) as Arc<dyn ChatSink>),
            },
            RouteSettings {
                title_chars: config.memory.title_chars,
                fallback_offset: ChronoDuration::minutes(config.calendar.fallback_offset_minutes),
            },
        );

        let search = UnifiedSearch::new(store.clone(), calendar.clone());

        tracing::info!(
            backend = %store.backend_name(),
            remote = classifier.is_remote(),
            timezone = %tz.name(),
            "Assistant ready"
        );

        Ok(Assistant {
            config,
            classifier,
            store,
            router,
            calendar,
            advisor,
            audio,
            chats,
            search,
        })
    }
}

impl Default for AssistantBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Intent;
    use crate::config::StorageConfig;
    use crate::llm::testing::{ScriptedModel, StubEmbeddings};
    use crate::memory::Id;
    use crate::router::{IngestOutcome, IngestRequest};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_offline_assistant_routes_with_fallbacks() {
        let assistant = AssistantBuilder::new()
            .key(EncryptionKey::generate())
            .offline(true)
            .build()
            .unwrap();
        assert!(!assistant.is_remote());

        let response = assistant
            .router()
            .ingest(IngestRequest::text(Id(1), "Моя мама любит кофе"))
            .await
            .unwrap();
        assert!(matches!(response.outcome, IngestOutcome::Memory(ref m) if m.folder == "Семья"));
        assert!(response.chat_id.is_some());
        assistant.shutdown().await;
    }

    #[tokio::test]
    async fn test_injected_models_are_used() {
        let language = Arc::new(ScriptedModel::new().reply(r#"{"kind":"calendar","folder":null}"#));
        let embeddings = Arc::new(StubEmbeddings::working());
        let assistant = AssistantBuilder::new()
            .key(EncryptionKey::generate())
            .language_model(language.clone())
            .embedding_model(embeddings.clone())
            .build()
            .unwrap();

        assert!(assistant.is_remote());
        assert_eq!(assistant.classifier().classify("что угодно").await, Intent::Calendar);
        assert_eq!(language.calls.load(Ordering::SeqCst), 1);

        assistant.store().create(Id(1), "Семья", "мама", "кофе").await.unwrap();
        assert!(embeddings.calls.load(Ordering::SeqCst) >= 1);
        assistant.shutdown().await;
    }

    #[tokio::test]
    async fn test_sqlite_backend_selected_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MemoriaConfig::default();
        config.storage = StorageConfig {
            backend: StorageBackend::Sqlite,
            path: dir.path().join("nested").join("memoria.db"),
        };

        let assistant = AssistantBuilder::new()
            .config(config)
            .key(EncryptionKey::generate())
            .offline(true)
            .build()
            .unwrap();
        assert_eq!(assistant.store().backend_name(), "sqlite");
        assert!(dir.path().join("nested").join("memoria.db").exists());
        assistant.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = MemoriaConfig::default();
        config.calendar.timezone = "Mars/Olympus".to_string();
        let result = AssistantBuilder::new()
            .config(config)
            .key(EncryptionKey::generate())
            .offline(true)
            .build();
        assert!(result.is_err());
    }
}
