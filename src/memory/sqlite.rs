//! SQLite memory backend
//!
//! One connection behind a mutex; every call runs on the blocking pool.
//! Embeddings are little-endian `f32` BLOBs and nearest-neighbour search is a
//! brute-force scan over the owner's rows.

use super::backend::{rank_by_distance, MemoryBackend};
use super::types::{Folder, FolderSummary, Id, MemoryRecord, NewMemory, RecordChanges};
use crate::crypto::StoredText;
use crate::error::{Error, Result};
use crate::taxonomy;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS folders (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id    INTEGER NOT NULL,
    name        TEXT NOT NULL,
    UNIQUE(owner_id, name)
);

CREATE TABLE IF NOT EXISTS memories (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id            INTEGER NOT NULL,
    folder_id           INTEGER NOT NULL REFERENCES folders(id),
    title               TEXT NOT NULL,
    title_encrypted     INTEGER,
    content             TEXT NOT NULL,
    content_encrypted   INTEGER,
    embedding           BLOB,
    created_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_owner_created ON memories(owner_id, created_at);
"#;

const SELECT_MEMORY: &str = "SELECT m.id, m.owner_id, m.folder_id, f.name, m.title, m.title_encrypted, \
     m.content, m.content_encrypted, m.embedding, m.created_at \
     FROM memories m JOIN folders f ON f.id = m.folder_id";

/// SQLite-backed memory storage
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open (or create) a database file and apply the schema
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::Internal(format!("storage task failed: {}", e)))?
    }
}

fn encode_embedding(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn flag(value: Option<bool>) -> Option<i64> {
    value.map(i64::from)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let created: String = row.get(9)?;
    let created_at = DateTime::parse_from_rfc3339(&created)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e)))?;
    let embedding: Option<Vec<u8>> = row.get(8)?;
    let title_flag: Option<i64> = row.get(5)?;
    let content_flag: Option<i64> = row.get(7)?;

    Ok(MemoryRecord {
        id: Id(row.get(0)?),
        owner_id: Id(row.get(1)?),
        folder_id: Id(row.get(2)?),
        folder: row.get(3)?,
        title: StoredText {
            value: row.get(4)?,
            encrypted: title_flag.map(|f| f != 0),
        },
        content: StoredText {
            value: row.get(6)?,
            encrypted: content_flag.map(|f| f != 0),
        },
        embedding: embedding.map(|b| decode_embedding(&b)),
        created_at,
    })
}

fn load(conn: &Connection, id: Id) -> Result<Option<MemoryRecord>> {
    let sql = format!("{} WHERE m.id = ?1", SELECT_MEMORY);
    Ok(conn.query_row(&sql, params![id.0], row_to_record).optional()?)
}

#[async_trait]
impl MemoryBackend for SqliteBackend {
    async fn ensure_folder(&self, owner: Id, name: &str) -> Result<Folder> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO folders (owner_id, name) VALUES (?1, ?2)",
                params![owner.0, name],
            )?;
            let id: i64 = conn.query_row(
                "SELECT id FROM folders WHERE owner_id = ?1 AND name = ?2",
                params![owner.0, name],
                |row| row.get(0),
            )?;
            Ok(Folder {
                id: Id(id),
                owner_id: owner,
                name,
            })
        })
        .await
    }

    async fn folders(&self, owner: Id) -> Result<Vec<FolderSummary>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT f.id, f.name, COUNT(m.id) FROM folders f \
                 LEFT JOIN memories m ON m.folder_id = f.id \
                 WHERE f.owner_id = ?1 GROUP BY f.id ORDER BY f.id",
            )?;
            let rows = stmt.query_map(params![owner.0], |row| {
                let name: String = row.get(1)?;
                let count: i64 = row.get(2)?;
                Ok(FolderSummary {
                    id: Id(row.get(0)?),
                    category: taxonomy::category_of(&name).map(str::to_string),
                    name,
                    count: count as usize,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn insert(&self, memory: NewMemory) -> Result<MemoryRecord> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let folder_owner: Option<i64> = tx
                .query_row(
                    "SELECT owner_id FROM folders WHERE id = ?1",
                    params![memory.folder_id.0],
                    |row| row.get(0),
                )
                .optional()?;
            if folder_owner != Some(memory.owner_id.0) {
                return Err(Error::Storage(format!("folder {} does not exist", memory.folder_id)));
            }

            tx.execute(
                "INSERT INTO memories (owner_id, folder_id, title, title_encrypted, content, \
                 content_encrypted, embedding, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    memory.owner_id.0,
                    memory.folder_id.0,
                    memory.title.value,
                    flag(memory.title.encrypted),
                    memory.content.value,
                    flag(memory.content.encrypted),
                    encode_embedding(&memory.embedding),
                    format_time(&memory.created_at),
                ],
            )?;
            let id = Id(tx.last_insert_rowid());
            let record = load(&tx, id)?
                .ok_or_else(|| Error::Storage(format!("memory {} vanished after insert", id)))?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn get(&self, id: Id) -> Result<Option<MemoryRecord>> {
        self.with_conn(move |conn| load(conn, id)).await
    }

    async fn apply(&self, id: Id, changes: RecordChanges) -> Result<MemoryRecord> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            if load(&tx, id)?.is_none() {
                return Err(Error::NotFound(format!("memory {}", id)));
            }
            if let Some(title) = &changes.title {
                tx.execute(
                    "UPDATE memories SET title = ?1, title_encrypted = ?2 WHERE id = ?3",
                    params![title.value, flag(title.encrypted), id.0],
                )?;
            }
            if let Some(content) = &changes.content {
                tx.execute(
                    "UPDATE memories SET content = ?1, content_encrypted = ?2 WHERE id = ?3",
                    params![content.value, flag(content.encrypted), id.0],
                )?;
            }
            if let Some(folder_id) = changes.folder_id {
                tx.execute(
                    "UPDATE memories SET folder_id = ?1 WHERE id = ?2",
                    params![folder_id.0, id.0],
                )?;
            }
            let record = load(&tx, id)?.ok_or_else(|| Error::NotFound(format!("memory {}", id)))?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn set_embedding(&self, id: Id, embedding: Vec<f32>) -> Result<()> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE memories SET embedding = ?1 WHERE id = ?2",
                params![encode_embedding(&embedding), id.0],
            )?;
            if changed == 0 {
                return Err(Error::NotFound(format!("memory {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn nearest(&self, owner: Id, query: &[f32], limit: usize) -> Result<Vec<(MemoryRecord, f32)>> {
        let query = query.to_vec();
        self.with_conn(move |conn| {
            let sql = format!(
                "{} WHERE m.owner_id = ?1 AND m.embedding IS NOT NULL ORDER BY m.id",
                SELECT_MEMORY
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params![owner.0], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rank_by_distance(records, &query, limit))
        })
        .await
    }

    async fn recent(&self, owner: Id, folder: Option<&str>, limit: usize) -> Result<Vec<MemoryRecord>> {
        let folder = folder.map(str::to_string);
        self.with_conn(move |conn| {
            let sql = format!(
                "{} WHERE m.owner_id = ?1 AND (?2 IS NULL OR f.name = ?2) \
                 ORDER BY m.created_at DESC, m.id DESC LIMIT ?3",
                SELECT_MEMORY
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params![owner.0, folder, limit as i64], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn insert(backend: &SqliteBackend, owner: i64, folder: &str, title: &str, embedding: Vec<f32>) -> MemoryRecord {
        let folder = backend.ensure_folder(Id(owner), folder).await.unwrap();
        backend
            .insert(NewMemory {
                owner_id: Id(owner),
                folder_id: folder.id,
                title: StoredText::plain(title),
                content: StoredText::plain("content"),
                embedding,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_embedding_blob_layout() {
        let values = vec![1.0f32, -0.5, 0.25];
        let bytes = encode_embedding(&values);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_embedding(&bytes), values);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("memoria.db");

        let id = {
            let backend = SqliteBackend::open(&path).unwrap();
            insert(&backend, 1, "Семья", "мама", vec![0.5, 0.5]).await.id
        };

        let backend = SqliteBackend::open(&path).unwrap();
        let record = backend.get(id).await.unwrap().unwrap();
        assert_eq!(record.folder, "Семья");
        assert_eq!(record.title, StoredText::plain("мама"));
        assert_eq!(record.embedding, Some(vec![0.5, 0.5]));
    }

    #[tokio::test]
    async fn test_ensure_folder_unique() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let a = backend.ensure_folder(Id(1), "Семья").await.unwrap();
        let b = backend.ensure_folder(Id(1), "Семья").await.unwrap();
        let c = backend.ensure_folder(Id(2), "Семья").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn test_legacy_rows_have_no_flag() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let folder = backend.ensure_folder(Id(1), "Семья").await.unwrap();
        let folder_id = folder.id.0;
        let id = backend
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO memories (owner_id, folder_id, title, content, created_at) \
                     VALUES (1, ?1, 'старое', 'старое', '2024-01-01T00:00:00Z')",
                    params![folder_id],
                )?;
                Ok(Id(conn.last_insert_rowid()))
            })
            .await
            .unwrap();

        let record = backend.get(id).await.unwrap().unwrap();
        assert_eq!(record.title.encrypted, None);
        assert_eq!(record.embedding, None);
        // rows without embedding never show up in semantic search
        assert!(backend.nearest(Id(1), &[0.0], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nearest_and_recent() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let far = insert(&backend, 1, "Семья", "far", vec![5.0, 5.0]).await;
        let near = insert(&backend, 1, "Фильмы и сериалы", "near", vec![1.0, 1.0]).await;
        insert(&backend, 2, "Семья", "other", vec![1.0, 1.0]).await;

        let hits = backend.nearest(Id(1), &[1.0, 1.0], 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id, near.id);
        assert_eq!(hits[1].0.id, far.id);
        assert!(hits[0].1 <= hits[1].1);

        let recent = backend.recent(Id(1), None, 50).await.unwrap();
        assert_eq!(recent[0].id, near.id);
        let family = backend.recent(Id(1), Some("Семья"), 50).await.unwrap();
        assert_eq!(family.len(), 1);
        assert_eq!(family[0].id, far.id);
    }

    #[tokio::test]
    async fn test_recent_uses_created_at() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let folder = backend.ensure_folder(Id(1), "Семья").await.unwrap();
        let base = Utc::now();
        for (i, offset) in [10i64, 0, 5].iter().enumerate() {
            backend
                .insert(NewMemory {
                    owner_id: Id(1),
                    folder_id: folder.id,
                    title: StoredText::plain(format!("t{}", i)),
                    content: StoredText::plain("c"),
                    embedding: vec![0.0],
                    created_at: base + Duration::seconds(*offset),
                })
                .await
                .unwrap();
        }
        let titles: Vec<String> = backend
            .recent(Id(1), None, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title.value)
            .collect();
        assert_eq!(titles, vec!["t0", "t2"]);
    }

    #[tokio::test]
    async fn test_apply_and_set_embedding() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let record = insert(&backend, 1, "Семья", "кот", vec![0.0]).await;
        let pets = backend.ensure_folder(Id(1), "Корм и вкусняшки").await.unwrap();

        let updated = backend
            .apply(
                record.id,
                RecordChanges {
                    content: Some(StoredText::plain("новый корм")),
                    folder_id: Some(pets.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.folder, "Корм и вкусняшки");
        assert_eq!(updated.content.value, "новый корм");
        assert_eq!(updated.title.value, "кот");

        backend.set_embedding(record.id, vec![2.0]).await.unwrap();
        assert_eq!(backend.get(record.id).await.unwrap().unwrap().embedding, Some(vec![2.0]));

        assert!(matches!(backend.apply(Id(99), RecordChanges::default()).await, Err(Error::NotFound(_))));
        assert!(matches!(backend.set_embedding(Id(99), vec![]).await, Err(Error::NotFound(_))));

        let folders = backend.folders(Id(1)).await.unwrap();
        assert_eq!(folders.iter().map(|f| f.count).sum::<usize>(), 1);
    }
}
