//! Memory data types
//!
//! Persisted records carry [`StoredText`] fields; everything that leaves the
//! store (`MemoryView`, `MemorySummary`) carries plaintext.

use crate::crypto::StoredText;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Numeric identifier, serialized as a decimal string.
///
/// Accepts either a JSON string or a JSON number on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(pub i64);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Id {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Id)
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Id(value)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Id(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A user-owned folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: Id,
    pub owner_id: Id,
    pub name: String,
}

/// A memory as persisted
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    pub id: Id,
    pub owner_id: Id,
    pub folder_id: Id,
    /// Folder name, resolved by the backend on read
    pub folder: String,
    pub title: StoredText,
    pub content: StoredText,
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload; title, content, folder and embedding land together
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub owner_id: Id,
    pub folder_id: Id,
    pub title: StoredText,
    pub content: StoredText,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// Field changes applied by an update
#[derive(Debug, Clone, Default)]
pub struct RecordChanges {
    pub title: Option<StoredText>,
    pub content: Option<StoredText>,
    pub folder_id: Option<Id>,
}

impl RecordChanges {
    /// Whether the change set does nothing
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.folder_id.is_none()
    }
}

/// Decrypted memory returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryView {
    pub id: Id,
    pub title: String,
    pub content: String,
    pub folder: String,
    pub created_at: DateTime<Utc>,
}

/// Search/list result entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySummary {
    pub id: Id,
    pub folder: String,
    pub title: String,
    pub snippet: String,
    pub created_at: DateTime<Utc>,
    /// Distance to the query, only for semantic search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

/// One page of search or listing results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub items: Vec<MemorySummary>,
    pub total: usize,
    pub folder: Option<String>,
    pub q: Option<String>,
}

/// Search parameters; a non-empty `q` selects semantic search
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub folder: Option<String>,
}

impl SearchQuery {
    /// Semantic query text, if any
    pub fn semantic(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    /// Folder filter, if any
    pub fn folder_filter(&self) -> Option<&str> {
        self.folder.as_deref().map(str::trim).filter(|f| !f.is_empty())
    }
}

/// Partial update of a memory
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub folder: Option<String>,
}

/// Explicit creation request
#[derive(Debug, Clone, Deserialize)]
pub struct NewMemoryRequest {
    pub folder: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
}

/// Folder listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSummary {
    pub id: Id,
    pub name: String,
    pub category: Option<String>,
    pub count: usize,
}

/// First `max` characters of `text`
pub fn prefix_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
