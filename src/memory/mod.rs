//! Memory system: encrypted storage with semantic recall
//!
//! ```text
//! MemoryStore ──seal/reveal──► Codec
//!     │ ──embed──────────────► Embedder
//!     ▼
//! MemoryBackend (InMemoryBackend | SqliteBackend)
//!     ▲
//! EmbeddingRefresher (bounded queue + workers, after updates)
//! ```

pub mod backend;
pub mod refresh;
pub mod sqlite;
pub mod store;
pub mod types;

pub use backend::{InMemoryBackend, MemoryBackend};
pub use refresh::{EmbeddingRefresher, RefreshJob, RefreshStats};
pub use sqlite::SqliteBackend;
pub use store::MemoryStore;
pub use types::{
    Folder, FolderSummary, Id, MemoryPatch, MemoryRecord, MemorySummary, MemoryView, NewMemory,
    NewMemoryRequest, RecordChanges, SearchPage, SearchQuery,
};
