//! Memory store
//!
//! Owns the encrypt/embed/persist pipeline on top of a [`MemoryBackend`].
//! Plaintext only exists here and in the views handed back to callers; the
//! backend sees sealed text and vectors.

use super::backend::MemoryBackend;
use super::refresh::{EmbeddingRefresher, RefreshJob, RefreshStats};
use super::types::{
    prefix_chars, FolderSummary, Id, MemoryPatch, MemoryRecord, MemorySummary, MemoryView,
    NewMemory, RecordChanges, SearchPage, SearchQuery,
};
use crate::classifier::match_folder;
use crate::config::{MemoryConfig, RefreshConfig};
use crate::crypto::Codec;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::taxonomy;
use chrono::Utc;
use std::sync::Arc;

/// Encrypted, searchable memory storage
#[derive(Clone)]
pub struct MemoryStore {
    backend: Arc<dyn MemoryBackend>,
    codec: Arc<Codec>,
    embedder: Embedder,
    refresher: EmbeddingRefresher,
    config: MemoryConfig,
}

impl MemoryStore {
    /// Create a store and start its embedding refresh pool.
    pub fn new(
        backend: Arc<dyn MemoryBackend>,
        codec: Arc<Codec>,
        embedder: Embedder,
        config: MemoryConfig,
        refresh: &RefreshConfig,
    ) -> Self {
        let refresher = EmbeddingRefresher::start(backend.clone(), embedder.clone(), refresh);
        Self {
            backend,
            codec,
            embedder,
            refresher,
            config,
        }
    }

    /// Background refresh counters
    pub fn refresh_stats(&self) -> RefreshStats {
        self.refresher.stats()
    }

    /// The refresh pool handle
    pub fn refresher(&self) -> &EmbeddingRefresher {
        &self.refresher
    }

    /// Name of the persistence backend
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// File a new memory.
    ///
    /// A folder outside the taxonomy is replaced by the keyword match over
    /// the memory text before anything is written.
    pub async fn create(&self, owner: Id, folder: &str, title: &str, content: &str) -> Result<MemoryView> {
        let folder_name = if taxonomy::is_valid_folder(folder) {
            folder.to_string()
        } else {
            let repaired = match_folder(&format!("{} {}", title, content)).to_string();
            tracing::warn!(
                error = %Error::InvalidTaxonomyValue(folder.to_string()),
                folder = %repaired,
                "Folder repaired before persistence"
            );
            repaired
        };

        let folder = self.backend.ensure_folder(owner, &folder_name).await?;
        let embedding = self.embedder.embed(&embedding_text(title, content)).await;

        let record = self
            .backend
            .insert(NewMemory {
                owner_id: owner,
                folder_id: folder.id,
                title: self.codec.seal(title)?,
                content: self.codec.seal(content)?,
                embedding,
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(owner = %owner, memory = %record.id, folder = %record.folder, "Memory created");

        Ok(MemoryView {
            id: record.id,
            title: title.to_string(),
            content: content.to_string(),
            folder: record.folder,
            created_at: record.created_at,
        })
    }

    /// Apply a partial update. Only fields whose plaintext actually changes
    /// are rewritten; a text change schedules an embedding refresh.
    pub async fn update(&self, owner: Id, id: Id, patch: MemoryPatch) -> Result<MemoryView> {
        let current = self.owned(owner, id).await?;
        let title = self.codec.reveal(&current.title)?;
        let content = self.codec.reveal(&current.content)?;

        let mut changes = RecordChanges::default();
        let new_title = patch.title.filter(|t| *t != title);
        let new_content = patch.content.filter(|c| *c != content);

        if let Some(t) = &new_title {
            changes.title = Some(self.codec.seal(t)?);
        }
        if let Some(c) = &new_content {
            changes.content = Some(self.codec.seal(c)?);
        }
        if let Some(folder) = patch.folder.filter(|f| *f != current.folder) {
            if !taxonomy::is_valid_folder(&folder) {
                return Err(Error::InvalidTaxonomyValue(folder));
            }
            changes.folder_id = Some(self.backend.ensure_folder(owner, &folder).await?.id);
        }

        if changes.is_empty() {
            return Ok(MemoryView {
                id,
                title,
                content,
                folder: current.folder,
                created_at: current.created_at,
            });
        }

        let text_changed = new_title.is_some() || new_content.is_some();
        let updated = self.backend.apply(id, changes).await?;
        let title = new_title.unwrap_or(title);
        let content = new_content.unwrap_or(content);

        if text_changed {
            self.refresher.schedule(RefreshJob {
                memory_id: id,
                text: embedding_text(&title, &content),
            });
        }

        tracing::info!(owner = %owner, memory = %id, text_changed, "Memory updated");

        Ok(MemoryView {
            id,
            title,
            content,
            folder: updated.folder,
            created_at: updated.created_at,
        })
    }

    /// Semantic search when `q` is non-empty, otherwise newest-first listing.
    ///
    /// The folder filter applies to listings only. A backend failure during
    /// semantic search yields an empty page; decryption failures propagate.
    pub async fn search(&self, owner: Id, query: SearchQuery) -> Result<SearchPage> {
        let folder = query.folder_filter().map(str::to_string);

        let items = match query.semantic() {
            Some(q) => {
                let vector = self.embedder.embed(q).await;
                match self.backend.nearest(owner, &vector, self.config.search_limit).await {
                    Ok(hits) => hits
                        .into_iter()
                        .map(|(record, distance)| self.summarize(record, Some(distance)))
                        .collect::<Result<Vec<_>>>()?,
                    Err(e) => {
                        tracing::warn!(owner = %owner, error = %e, "Semantic search failed, returning empty page");
                        Vec::new()
                    }
                }
            }
            None => self
                .backend
                .recent(owner, folder.as_deref(), self.config.list_limit)
                .await?
                .into_iter()
                .map(|record| self.summarize(record, None))
                .collect::<Result<Vec<_>>>()?,
        };

        Ok(SearchPage {
            total: items.len(),
            items,
            folder,
            q: query.semantic().map(str::to_string),
        })
    }

    /// One memory, if it exists and belongs to `owner`.
    pub async fn find_one(&self, owner: Id, id: Id) -> Result<MemoryView> {
        let record = self.owned(owner, id).await?;
        self.view(record)
    }

    /// Full memories relevant to `query`: semantic matches first, falling
    /// back to the most recent memories when nothing matches.
    pub async fn recall(&self, owner: Id, query: &str, limit: usize) -> Result<Vec<MemoryView>> {
        let mut records = Vec::new();
        if !query.trim().is_empty() {
            let vector = self.embedder.embed(query).await;
            match self.backend.nearest(owner, &vector, limit).await {
                Ok(hits) => records = hits.into_iter().map(|(r, _)| r).collect(),
                Err(e) => tracing::warn!(owner = %owner, error = %e, "Recall search failed"),
            }
        }
        if records.is_empty() {
            records = self.backend.recent(owner, None, limit).await?;
        }
        records.into_iter().map(|r| self.view(r)).collect()
    }

    /// Folders of `owner` with memory counts
    pub async fn folders(&self, owner: Id) -> Result<Vec<FolderSummary>> {
        self.backend.folders(owner).await
    }

    async fn owned(&self, owner: Id, id: Id) -> Result<MemoryRecord> {
        match self.backend.get(id).await? {
            Some(record) if record.owner_id == owner => Ok(record),
            _ => Err(Error::NotFound(format!("memory {}", id))),
        }
    }

    fn view(&self, record: MemoryRecord) -> Result<MemoryView> {
        Ok(MemoryView {
            id: record.id,
            title: self.codec.reveal(&record.title)?,
            content: self.codec.reveal(&record.content)?,
            folder: record.folder,
            created_at: record.created_at,
        })
    }

    fn summarize(&self, record: MemoryRecord, distance: Option<f32>) -> Result<MemorySummary> {
        let content = self.codec.reveal(&record.content)?;
        Ok(MemorySummary {
            id: record.id,
            title: self.codec.reveal(&record.title)?,
            snippet: prefix_chars(&content, self.config.snippet_chars),
            folder: record.folder,
            created_at: record.created_at,
            distance,
        })
    }
}

fn embedding_text(title: &str, content: &str) -> String {
    if title.is_empty() {
        content.to_string()
    } else {
        format!("{}\n{}", title, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{EncryptionKey, StoredText};
    use crate::embedding::fallback_embedding;
    use crate::memory::backend::InMemoryBackend;
    use crate::memory::refresh::tests::FlakyBackend;
    use std::time::Duration;

    const DIM: usize = 16;

    fn memory_config() -> MemoryConfig {
        MemoryConfig {
            embedding_dimension: DIM,
            fallback_components: DIM,
            ..Default::default()
        }
    }

    fn store_with(backend: Arc<dyn MemoryBackend>) -> MemoryStore {
        let codec = Arc::new(Codec::new(&EncryptionKey::generate()).unwrap());
        let config = memory_config();
        MemoryStore::new(
            backend,
            codec,
            Embedder::offline(&config),
            config,
            &RefreshConfig {
                retry_base_ms: 1,
                ..Default::default()
            },
        )
    }

    fn store() -> (MemoryStore, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        (store_with(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_create_encrypts_at_rest() {
        let (store, backend) = store();
        let view = store.create(Id(1), "Семья", "Моя мама", "Моя мама любит кофе").await.unwrap();
        assert_eq!(view.folder, "Семья");
        assert_eq!(view.content, "Моя мама любит кофе");

        let raw = backend.get(view.id).await.unwrap().unwrap();
        assert_eq!(raw.title.encrypted, Some(true));
        assert_ne!(raw.content.value, "Моя мама любит кофе");
        assert!(crate::crypto::is_ciphertext_shaped(&raw.content.value));
        assert_eq!(
            raw.embedding,
            Some(fallback_embedding("Моя мама\nМоя мама любит кофе", DIM, DIM))
        );
    }

    #[tokio::test]
    async fn test_create_empty_title_embeds_content_only() {
        let (store, backend) = store();
        let view = store.create(Id(1), "Семья", "", "кофе").await.unwrap();
        let raw = backend.get(view.id).await.unwrap().unwrap();
        assert_eq!(raw.embedding, Some(fallback_embedding("кофе", DIM, DIM)));
    }

    #[tokio::test]
    async fn test_create_repairs_unknown_folder() {
        let (store, _) = store();
        let view = store
            .create(Id(1), "НеизвестнаяПапка", "мама", "Моя мама любит кофе")
            .await
            .unwrap();
        assert_eq!(view.folder, "Семья");
        let folders = store.folders(Id(1)).await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, "Семья");
    }

    #[tokio::test]
    async fn test_find_one_owner_scoped() {
        let (store, _) = store();
        let view = store.create(Id(1), "Семья", "t", "c").await.unwrap();
        assert_eq!(store.find_one(Id(1), view.id).await.unwrap(), view);
        assert!(matches!(store.find_one(Id(2), view.id).await, Err(Error::NotFound(_))));
        assert!(matches!(store.find_one(Id(1), Id(999)).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_search_identical_text_ranks_first() {
        let (store, _) = store();
        store.create(Id(1), "Семья", "", "Моя мама любит кофе").await.unwrap();
        let target = store.create(Id(1), "Фильмы и сериалы", "", "Я люблю ужастики").await.unwrap();
        store.create(Id(1), "Покупки для дома", "", "купить молоко").await.unwrap();
        store.create(Id(2), "Фильмы и сериалы", "", "Я люблю ужастики").await.unwrap();

        let page = store
            .search(
                Id(1),
                SearchQuery {
                    q: Some("Я люблю ужастики".to_string()),
                    folder: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.items[0].id, target.id);
        assert_eq!(page.items[0].distance, Some(0.0));
        let distances: Vec<f32> = page.items.iter().filter_map(|i| i.distance).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(page.q.as_deref(), Some("Я люблю ужастики"));
    }

    #[tokio::test]
    async fn test_search_limit() {
        let (store, _) = store();
        for i in 0..15 {
            store.create(Id(1), "Семья", "", &format!("заметка {}", i)).await.unwrap();
        }
        let page = store
            .search(
                Id(1),
                SearchQuery {
                    q: Some("заметка".to_string()),
                    folder: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.items.len(), 10);
    }

    #[tokio::test]
    async fn test_listing_by_folder_with_snippets() {
        let (store, _) = store();
        let long = "к".repeat(300);
        store.create(Id(1), "Семья", "a", &long).await.unwrap();
        store.create(Id(1), "Друзья", "b", "друг").await.unwrap();

        let page = store
            .search(
                Id(1),
                SearchQuery {
                    q: None,
                    folder: Some("Семья".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].snippet.chars().count(), 160);
        assert_eq!(page.items[0].distance, None);
        assert_eq!(page.folder.as_deref(), Some("Семья"));

        let all = store.search(Id(1), SearchQuery::default()).await.unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.items[0].title, "b");
    }

    #[tokio::test]
    async fn test_semantic_failure_degrades_to_empty_page() {
        let mut flaky = FlakyBackend::new(0);
        flaky.fail_search = true;
        let store = store_with(Arc::new(flaky));
        store.create(Id(1), "Семья", "", "кофе").await.unwrap();

        let page = store
            .search(
                Id(1),
                SearchQuery {
                    q: Some("кофе".to_string()),
                    folder: None,
                },
            )
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_decryption_failure_propagates() {
        let backend = Arc::new(InMemoryBackend::new());
        let writer = store_with(backend.clone());
        let view = writer.create(Id(1), "Семья", "t", "c").await.unwrap();

        // same data, different key
        let reader = store_with(backend);
        assert!(matches!(reader.find_one(Id(1), view.id).await, Err(Error::Decryption(_))));
        assert!(matches!(
            reader.search(Id(1), SearchQuery::default()).await,
            Err(Error::Decryption(_))
        ));
    }

    #[tokio::test]
    async fn test_legacy_plaintext_rows_are_readable() {
        let (store, backend) = store();
        let folder = backend.ensure_folder(Id(1), "Семья").await.unwrap();
        let record = backend
            .insert(NewMemory {
                owner_id: Id(1),
                folder_id: folder.id,
                title: StoredText::legacy("старый заголовок"),
                content: StoredText::legacy("старый текст"),
                embedding: vec![0.0; DIM],
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let view = store.find_one(Id(1), record.id).await.unwrap();
        assert_eq!(view.content, "старый текст");
    }

    #[tokio::test]
    async fn test_update_content_refreshes_embedding() {
        let (store, backend) = store();
        let view = store.create(Id(1), "Семья", "мама", "любит кофе").await.unwrap();
        let before = backend.get(view.id).await.unwrap().unwrap().embedding;

        let updated = store
            .update(
                Id(1),
                view.id,
                MemoryPatch {
                    content: Some("любит чай".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "мама");
        assert_eq!(updated.folder, "Семья");
        assert_eq!(updated.content, "любит чай");

        assert!(store.refresher().wait_idle(Duration::from_secs(2)).await);
        let after = backend.get(view.id).await.unwrap().unwrap().embedding;
        assert_ne!(before, after);
        assert_eq!(after, Some(fallback_embedding("мама\nлюбит чай", DIM, DIM)));
        assert_eq!(store.refresh_stats().completed, 1);
    }

    #[tokio::test]
    async fn test_update_to_empty_text_still_refreshes() {
        let (store, backend) = store();
        let view = store.create(Id(1), "Семья", "", "кофе").await.unwrap();

        store
            .update(
                Id(1),
                view.id,
                MemoryPatch {
                    content: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(store.refresh_stats().scheduled, 1);
        assert!(store.refresher().wait_idle(Duration::from_secs(2)).await);
        let after = backend.get(view.id).await.unwrap().unwrap().embedding;
        assert_eq!(after, Some(fallback_embedding("", DIM, DIM)));
    }

    #[tokio::test]
    async fn test_update_embeds_same_text_as_create() {
        let (store, backend) = store();
        let edited = store.create(Id(1), "Семья", "мама", "x").await.unwrap();
        let fresh = store.create(Id(1), "Семья", "мама", "").await.unwrap();

        store
            .update(
                Id(1),
                edited.id,
                MemoryPatch {
                    content: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(store.refresher().wait_idle(Duration::from_secs(2)).await);

        let edited = backend.get(edited.id).await.unwrap().unwrap().embedding;
        let fresh = backend.get(fresh.id).await.unwrap().unwrap().embedding;
        assert!(edited.is_some());
        assert_eq!(edited, fresh);
    }

    #[tokio::test]
    async fn test_update_same_values_is_noop() {
        let (store, _) = store();
        let view = store.create(Id(1), "Семья", "мама", "кофе").await.unwrap();
        let same = store
            .update(
                Id(1),
                view.id,
                MemoryPatch {
                    title: Some("мама".to_string()),
                    content: Some("кофе".to_string()),
                    folder: Some("Семья".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(same, view);
        assert_eq!(store.refresh_stats().scheduled, 0);
    }

    #[tokio::test]
    async fn test_update_folder_only_skips_refresh() {
        let (store, _) = store();
        let view = store.create(Id(1), "Семья", "кот", "кот Барсик").await.unwrap();
        let moved = store
            .update(
                Id(1),
                view.id,
                MemoryPatch {
                    folder: Some("Особенности поведения".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.folder, "Особенности поведения");
        assert_eq!(moved.content, "кот Барсик");
        assert_eq!(store.refresh_stats().scheduled, 0);
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_folder_and_foreign_owner() {
        let (store, _) = store();
        let view = store.create(Id(1), "Семья", "t", "c").await.unwrap();
        assert!(matches!(
            store
                .update(
                    Id(1),
                    view.id,
                    MemoryPatch {
                        folder: Some("НеизвестнаяПапка".to_string()),
                        ..Default::default()
                    }
                )
                .await,
            Err(Error::InvalidTaxonomyValue(_))
        ));
        assert!(matches!(
            store.update(Id(2), view.id, MemoryPatch::default()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_recall_falls_back_to_recent() {
        let (store, _) = store();
        store.create(Id(1), "Семья", "", "мама").await.unwrap();
        store.create(Id(1), "Друзья", "", "друг").await.unwrap();

        let semantic = store.recall(Id(1), "мама", 5).await.unwrap();
        assert_eq!(semantic.len(), 2);
        assert_eq!(semantic[0].content, "мама");

        let recent = store.recall(Id(1), "", 1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "друг");

        assert!(store.recall(Id(3), "мама", 5).await.unwrap().is_empty());
    }
}
