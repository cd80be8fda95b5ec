//! Memoria configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main Memoria configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoriaConfig {
    /// Gateway configuration
    pub gateway: GatewayConfig,

    /// Remote model configuration
    pub models: ModelsConfig,

    /// Encryption-at-rest configuration
    pub crypto: CryptoConfig,

    /// Memory store tuning
    pub memory: MemoryConfig,

    /// Background embedding refresh pool
    pub refresh: RefreshConfig,

    /// Calendar handling
    pub calendar: CalendarConfig,

    /// Storage configuration
    pub storage: StorageConfig,
}

impl MemoriaConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.memory.embedding_dimension == 0 {
            return Err(Error::Config("memory.embedding_dimension must be > 0".to_string()));
        }
        if self.memory.fallback_components > self.memory.embedding_dimension {
            return Err(Error::Config(format!(
                "memory.fallback_components ({}) exceeds embedding_dimension ({})",
                self.memory.fallback_components, self.memory.embedding_dimension
            )));
        }
        if self.refresh.queue_capacity == 0 || self.refresh.workers == 0 {
            return Err(Error::Config(
                "refresh.queue_capacity and refresh.workers must be > 0".to_string(),
            ));
        }
        if self.refresh.max_attempts == 0 {
            return Err(Error::Config("refresh.max_attempts must be > 0".to_string()));
        }
        self.calendar.timezone()?;
        Ok(())
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed CORS origins (empty = permissive)
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18790,
            cors_origins: Vec::new(),
        }
    }
}

/// Remote model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Use the remote model at all; when false only fallbacks run
    pub enabled: bool,

    /// Provider base URL
    pub base_url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Model used for classification, titles and advice
    pub classify_model: String,

    /// Embedding model variants, tried in order
    pub embedding_models: Vec<String>,

    /// Per-call timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            classify_model: "gemini-2.5-flash".to_string(),
            embedding_models: vec![
                "text-embedding-004".to_string(),
                "embedding-001".to_string(),
                "models/text-embedding-004".to_string(),
            ],
            request_timeout_secs: 15,
        }
    }
}

impl ModelsConfig {
    /// Resolve the API key from the environment.
    ///
    /// Tries the configured name first, then its UPPER_CASE form.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .or_else(|_| std::env::var(self.api_key_env.to_uppercase()))
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

/// Encryption-at-rest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Environment variable holding the 64-hex-char key
    pub key_env: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key_env: "ENCRYPTION_KEY".to_string(),
        }
    }
}

/// Memory store tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Fixed embedding dimension
    pub embedding_dimension: usize,

    /// Non-zero components of the hash fallback embedding
    pub fallback_components: usize,

    /// Max results for semantic search
    pub search_limit: usize,

    /// Max results for listing
    pub list_limit: usize,

    /// Snippet length in characters
    pub snippet_chars: usize,

    /// Title length in characters for routed memories
    pub title_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: 768,
            fallback_components: 100,
            search_limit: 10,
            list_limit: 50,
            snippet_chars: 160,
            title_chars: 32,
        }
    }
}

/// Background embedding refresh pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Bounded queue capacity; new jobs are rejected when full
    pub queue_capacity: usize,

    /// Number of worker tasks
    pub workers: usize,

    /// Attempts per job before it is dropped
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds
    pub retry_base_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            workers: 2,
            max_attempts: 3,
            retry_base_ms: 200,
        }
    }
}

/// Calendar handling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// IANA timezone used to interpret dates in text
    pub timezone: String,

    /// Offset from now when no date can be parsed
    pub fallback_offset_minutes: i64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Moscow".to_string(),
            fallback_offset_minutes: 60,
        }
    }
}

impl CalendarConfig {
    /// Parse the configured timezone.
    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| Error::Config(format!("calendar.timezone: {}", e)))
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local maps, lost on exit
    Memory,
    /// SQLite database file
    Sqlite,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which backend holds memories
    pub backend: StorageBackend,

    /// Database path for the SQLite backend
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs_next::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("memoria");

        Self {
            backend: StorageBackend::Memory,
            path: base.join("memoria.db"),
        }
    }
}
