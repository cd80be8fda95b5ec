//! Remote model interfaces
//!
//! Two narrow seams over whatever hosted model is configured:
//! text generation (classification, titles, advice) and embeddings.
//! Callers own the fallback behaviour; implementations just report failure.

mod gemini;

pub use gemini::GeminiClient;

use crate::error::Result;
use async_trait::async_trait;

/// Text generation backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send a single prompt and return the first text candidate.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}

/// Embedding backend.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed `text` with the given model variant, asking for `dimension`
    /// components. Implementations may return a different length.
    async fn embed(&self, model: &str, text: &str, dimension: usize) -> Result<Vec<f32>>;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted model doubles shared by unit tests.

    use super::*;
    use crate::error::Error;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Language model replaying queued replies; errors once the queue is empty.
    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String>>>,
        delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    impl ScriptedModel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, text: &str) -> Self {
            self.replies.lock().unwrap().push_back(Ok(text.to_string()));
            self
        }

        pub fn fail(self) -> Self {
            self.replies
                .lock()
                .unwrap()
                .push_back(Err(Error::RemoteUnavailable("scripted failure".to_string())));
            self
        }

        pub fn slow(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::RemoteUnavailable("no scripted reply".to_string())))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Embedding model that derives a vector from the text length and a
    /// per-model scale, failing for model names listed in `broken`.
    pub struct StubEmbeddings {
        pub broken: Vec<String>,
        pub length: Option<usize>,
        pub calls: AtomicUsize,
    }

    impl StubEmbeddings {
        pub fn working() -> Self {
            Self {
                broken: Vec::new(),
                length: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn broken(models: &[&str]) -> Self {
            Self {
                broken: models.iter().map(|m| m.to_string()).collect(),
                length: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn with_length(mut self, length: usize) -> Self {
            self.length = Some(length);
            self
        }
    }

    #[async_trait]
    impl EmbeddingModel for StubEmbeddings {
        async fn embed(&self, model: &str, text: &str, dimension: usize) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.broken.iter().any(|b| b == model) {
                return Err(Error::RemoteUnavailable(format!("{} is down", model)));
            }
            let len = self.length.unwrap_or(dimension);
            let seed = text.chars().count() as f32;
            Ok((0..len).map(|i| ((seed + i as f32) * 0.01).cos()).collect())
        }

        fn name(&self) -> &str {
            "stub"
        }
    }
}
