//! Persistence backends for memories
//!
//! `MemoryBackend` is the storage seam: it stores opaque [`StoredText`]
//! fields and raw embeddings, and never sees plaintext or keys.
//!
//! [`StoredText`]: crate::crypto::StoredText

use super::types::{Folder, FolderSummary, Id, MemoryRecord, NewMemory, RecordChanges};
use crate::embedding::l2_distance;
use crate::error::{Error, Result};
use crate::taxonomy;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage operations needed by [`MemoryStore`](super::MemoryStore).
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Get or create the folder `(owner, name)`.
    async fn ensure_folder(&self, owner: Id, name: &str) -> Result<Folder>;

    /// Folders of `owner` with memory counts, in creation order.
    async fn folders(&self, owner: Id) -> Result<Vec<FolderSummary>>;

    /// Insert a memory with its embedding in one step.
    async fn insert(&self, memory: NewMemory) -> Result<MemoryRecord>;

    /// Fetch a memory regardless of owner.
    async fn get(&self, id: Id) -> Result<Option<MemoryRecord>>;

    /// Apply field changes, returning the updated record.
    async fn apply(&self, id: Id, changes: RecordChanges) -> Result<MemoryRecord>;

    /// Replace the stored embedding.
    async fn set_embedding(&self, id: Id, embedding: Vec<f32>) -> Result<()>;

    /// Up to `limit` of `owner`'s memories with a comparable embedding,
    /// ordered by ascending distance to `query`.
    async fn nearest(&self, owner: Id, query: &[f32], limit: usize) -> Result<Vec<(MemoryRecord, f32)>>;

    /// Up to `limit` of `owner`'s memories, newest first, optionally in one folder.
    async fn recent(&self, owner: Id, folder: Option<&str>, limit: usize) -> Result<Vec<MemoryRecord>>;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}

/// Rank records by distance to `query`. Records without an embedding or with
/// a different dimension are skipped. Ties keep insertion order.
pub(crate) fn rank_by_distance<I>(records: I, query: &[f32], limit: usize) -> Vec<(MemoryRecord, f32)>
where
    I: IntoIterator<Item = MemoryRecord>,
{
    let mut scored: Vec<(MemoryRecord, f32)> = records
        .into_iter()
        .filter_map(|r| {
            let d = r.embedding.as_deref().and_then(|e| l2_distance(e, query))?;
            Some((r, d))
        })
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
    scored.truncate(limit);
    scored
}

#[derive(Default)]
struct State {
    folders: HashMap<Id, Folder>,
    memories: BTreeMap<Id, MemoryRecord>,
    next_folder: i64,
    next_memory: i64,
}

/// Process-local backend
pub struct InMemoryBackend {
    state: Arc<RwLock<State>>,
}

impl InMemoryBackend {
    /// Create a new empty backend
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn ensure_folder(&self, owner: Id, name: &str) -> Result<Folder> {
        let mut state = self.state.write().await;
        if let Some(folder) = state
            .folders
            .values()
            .find(|f| f.owner_id == owner && f.name == name)
        {
            return Ok(folder.clone());
        }

        state.next_folder += 1;
        let folder = Folder {
            id: Id(state.next_folder),
            owner_id: owner,
            name: name.to_string(),
        };
        state.folders.insert(folder.id, folder.clone());
        tracing::debug!(owner = %owner, folder = %folder.id, "Folder created");
        Ok(folder)
    }

    async fn folders(&self, owner: Id) -> Result<Vec<FolderSummary>> {
        let state = self.state.read().await;
        let mut folders: Vec<&Folder> = state.folders.values().filter(|f| f.owner_id == owner).collect();
        folders.sort_by_key(|f| f.id);

        Ok(folders
            .into_iter()
            .map(|f| FolderSummary {
                id: f.id,
                name: f.name.clone(),
                category: taxonomy::category_of(&f.name).map(str::to_string),
                count: state.memories.values().filter(|m| m.folder_id == f.id).count(),
            })
            .collect())
    }

    async fn insert(&self, memory: NewMemory) -> Result<MemoryRecord> {
        let mut state = self.state.write().await;
        let folder = state
            .folders
            .get(&memory.folder_id)
            .filter(|f| f.owner_id == memory.owner_id)
            .map(|f| f.name.clone())
            .ok_or_else(|| Error::Storage(format!("folder {} does not exist", memory.folder_id)))?;

        state.next_memory += 1;
        let record = MemoryRecord {
            id: Id(state.next_memory),
            owner_id: memory.owner_id,
            folder_id: memory.folder_id,
            folder,
            title: memory.title,
            content: memory.content,
            embedding: Some(memory.embedding),
            created_at: memory.created_at,
        };
        state.memories.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Id) -> Result<Option<MemoryRecord>> {
        Ok(self.state.read().await.memories.get(&id).cloned())
    }

    async fn apply(&self, id: Id, changes: RecordChanges) -> Result<MemoryRecord> {
        let mut state = self.state.write().await;
        let folder_name = match changes.folder_id {
            Some(folder_id) => Some(
                state
                    .folders
                    .get(&folder_id)
                    .map(|f| f.name.clone())
                    .ok_or_else(|| Error::Storage(format!("folder {} does not exist", folder_id)))?,
            ),
            None => None,
        };

        let record = state
            .memories
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("memory {}", id)))?;

        if let Some(title) = changes.title {
            record.title = title;
        }
        if let Some(content) = changes.content {
            record.content = content;
        }
        if let (Some(folder_id), Some(name)) = (changes.folder_id, folder_name) {
            record.folder_id = folder_id;
            record.folder = name;
        }
        Ok(record.clone())
    }

    async fn set_embedding(&self, id: Id, embedding: Vec<f32>) -> Result<()> {
        let mut state = self.state.write().await;
        let record = state
            .memories
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("memory {}", id)))?;
        record.embedding = Some(embedding);
        Ok(())
    }

    async fn nearest(&self, owner: Id, query: &[f32], limit: usize) -> Result<Vec<(MemoryRecord, f32)>> {
        let state = self.state.read().await;
        let owned = state.memories.values().filter(|m| m.owner_id == owner).cloned();
        Ok(rank_by_distance(owned, query, limit))
    }

    async fn recent(&self, owner: Id, folder: Option<&str>, limit: usize) -> Result<Vec<MemoryRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<MemoryRecord> = state
            .memories
            .values()
            .filter(|m| m.owner_id == owner)
            .filter(|m| folder.map_or(true, |f| m.folder == f))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        records.truncate(limit);
        Ok(records)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
