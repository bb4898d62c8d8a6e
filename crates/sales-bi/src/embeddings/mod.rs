pub mod hash;
pub mod minilm;

use anyhow::Result;

use crate::config::EmbeddingConfig;

pub use hash::HashEmbeddings;
pub use minilm::{MiniLmConfig, MiniLmEmbeddings};

/// Unified embedding model trait
pub trait EmbeddingModel: Send + Sync {
    /// Embed a search query
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a stored record's text
    fn embed_document(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch embed documents for indexing
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_document(t)).collect()
    }

    /// Embedding vector dimension
    fn dimension(&self) -> usize;
}

/// Pick the embedder for this install: the ONNX MiniLM model when its files are
/// present, otherwise the hashing embedder.
pub fn load_embeddings(config: &EmbeddingConfig) -> Box<dyn EmbeddingModel> {
    match MiniLmConfig::auto_detect(&config.model_dir, config.cache_size) {
        Some(minilm) => match MiniLmEmbeddings::new(minilm) {
            Ok(model) => {
                tracing::info!(dir = %config.model_dir.display(), "MiniLM embeddings loaded");
                return Box::new(model);
            }
            Err(e) => {
                tracing::warn!("MiniLM embeddings failed to load ({}), using hashing embedder", e);
            }
        },
        None => {
            tracing::warn!(
                "No MiniLM model under {}, using hashing embedder",
                config.model_dir.display()
            );
        }
    }
    Box::new(HashEmbeddings::new(config.dimension))
}

/// Cosine similarity; 0.0 for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    (dot / denom) as f32
}

pub(crate) fn l2_normalize(mut vec: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}
