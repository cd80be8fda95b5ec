//! Embedding generation and vector distance
//!
//! [`Embedder::embed`] is total: it tries each configured remote model
//! variant in order and falls back to a deterministic hash vector. The hash
//! vector is stable across runs but carries no semantic meaning; it only keeps
//! rows searchable when the remote model is unreachable.

use crate::config::MemoryConfig;
use crate::llm::EmbeddingModel;
use std::sync::Arc;
use std::time::Duration;

/// Produces fixed-dimension embeddings
#[derive(Clone)]
pub struct Embedder {
    model: Option<Arc<dyn EmbeddingModel>>,
    variants: Vec<String>,
    dimension: usize,
    fallback_components: usize,
    timeout: Duration,
}

impl Embedder {
    /// Embedder with a remote model and its ordered variants
    pub fn new(
        model: Arc<dyn EmbeddingModel>,
        variants: Vec<String>,
        config: &MemoryConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            model: Some(model),
            variants,
            dimension: config.embedding_dimension,
            fallback_components: config.fallback_components.min(config.embedding_dimension),
            timeout,
        }
    }

    /// Embedder that only produces hash vectors
    pub fn offline(config: &MemoryConfig) -> Self {
        Self {
            model: None,
            variants: Vec::new(),
            dimension: config.embedding_dimension,
            fallback_components: config.fallback_components.min(config.embedding_dimension),
            timeout: Duration::from_secs(0),
        }
    }

    /// Declared vector length
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed `text`, never failing.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        if let Some(model) = &self.model {
            for variant in &self.variants {
                let attempt =
                    tokio::time::timeout(self.timeout, model.embed(variant, text, self.dimension)).await;
                match attempt {
                    Ok(Ok(values)) if !values.is_empty() => {
                        tracing::debug!(model = %variant, len = values.len(), "Remote embedding");
                        return self.fit(values, variant);
                    }
                    Ok(Ok(_)) => {
                        tracing::warn!(model = %variant, "Empty embedding, trying next variant");
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(model = %variant, error = %e, "Embedding failed, trying next variant");
                    }
                    Err(_) => {
                        tracing::warn!(model = %variant, "Embedding timed out, trying next variant");
                    }
                }
            }
            tracing::warn!("All embedding variants failed, using hash fallback");
        }

        fallback_embedding(text, self.dimension, self.fallback_components)
    }

    /// Truncate or zero-pad a remote vector to the declared dimension.
    fn fit(&self, mut values: Vec<f32>, variant: &str) -> Vec<f32> {
        if values.len() != self.dimension {
            tracing::warn!(
                model = %variant,
                got = values.len(),
                want = self.dimension,
                "Embedding length mismatch, fitting to dimension"
            );
            values.resize(self.dimension, 0.0);
        }
        values
    }
}

/// Deterministic pseudo-embedding from a 32-bit rolling hash.
///
/// The hash runs over UTF-16 code units (`h = h * 31 + unit`, wrapping), and
/// component `i < components` is `sin(h + i) * 0.1`. The rest are zero.
pub fn fallback_embedding(text: &str, dimension: usize, components: usize) -> Vec<f32> {
    let hash = text.encode_utf16().fold(0i32, |h, unit| {
        h.wrapping_shl(5).wrapping_sub(h).wrapping_add(i32::from(unit))
    });

    let mut vector = vec![0.0f32; dimension];
    for (i, slot) in vector.iter_mut().take(components).enumerate() {
        *slot = ((f64::from(hash) + i as f64).sin() * 0.1) as f32;
    }
    vector
}

/// Euclidean distance; `None` when the vectors are not comparable.
pub fn l2_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let sum: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    Some(sum.sqrt())
}
