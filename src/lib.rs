//! Memoria - Personal memory assistant
//!
//! Memoria files free-text notes into a fixed taxonomy of folders, schedules
//! calendar events, answers questions from the user's own memories and picks
//! up audio transcripts. Every incoming message goes through one router that
//! classifies it and hands it to the right handler.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     HTTP Gateway / CLI                        │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ IngestRequest
//! ┌──────────────────────────────▼───────────────────────────────┐
//! │                        IngestRouter                           │
//! │   Classifier (remote model → keyword rules)                   │
//! │   DateParser (Russian date/time phrases)                      │
//! └───────┬──────────────┬───────────────┬──────────────┬────────┘
//!         │ memory       │ calendar      │ advice       │ audio
//! ┌───────▼──────┐ ┌─────▼──────┐ ┌──────▼──────┐ ┌─────▼──────┐
//! │ MemoryStore  │ │  Calendar  │ │  Advisor    │ │  Audio     │
//! │ Codec (AES)  │ │  service   │ │ (recall +   │ │  registry  │
//! │ Embedder     │ └────────────┘ │  model)     │ └────────────┘
//! └───────┬──────┘                └─────────────┘
//!         │
//! ┌───────▼──────────────────────────────┐
//! │ MemoryBackend (memory | sqlite)      │
//! │ EmbeddingRefresher (bounded workers) │
//! └──────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`assistant`]: wiring of every component from configuration
//! - [`router`]: intent dispatch, date parsing, echo summaries
//! - [`classifier`]: remote and keyword intent classification
//! - [`memory`]: encrypted store, backends, embedding refresh
//! - [`embedding`]: remote embeddings with a hash fallback
//! - [`crypto`]: AES-GCM tokens for text at rest
//! - [`services`]: calendar, advice, audio, chat and combined search
//! - [`llm`]: model provider seam and the Gemini client
//! - [`taxonomy`]: fixed categories and folders
//! - [`gateway`]: HTTP API
//! - [`config`]: configuration management

pub mod assistant;
pub mod classifier;
pub mod config;
pub mod crypto;
pub mod embedding;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod memory;
pub mod router;
pub mod services;
pub mod taxonomy;

pub use assistant::{Assistant, AssistantBuilder};
pub use config::MemoriaConfig;
pub use error::{Error, Result};
