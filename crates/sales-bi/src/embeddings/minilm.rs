use anyhow::{anyhow, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use parking_lot::{Mutex, RwLock};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationParams};

use super::{l2_normalize, EmbeddingModel};

const MODEL_DIR_NAME: &str = "all-MiniLM-L6-v2";

#[derive(Clone, Debug)]
pub struct MiniLmConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub dimension: usize,
    pub max_length: usize,
    pub cache_size: usize,
}

impl MiniLmConfig {
    /// Look for `all-MiniLM-L6-v2/{model.onnx,onnx/model.onnx}` and its
    /// `tokenizer.json` under `model_dir`.
    pub fn auto_detect(model_dir: &Path, cache_size: usize) -> Option<Self> {
        let base_path = model_dir.join(MODEL_DIR_NAME);
        let model_path = [
            base_path.join("model_quantized.onnx"),
            base_path.join("model.onnx"),
            base_path.join("onnx").join("model.onnx"),
        ]
        .into_iter()
        .find(|p| p.exists())?;

        let tokenizer_path = base_path.join("tokenizer.json");
        if !tokenizer_path.exists() {
            return None;
        }

        Some(Self {
            model_path,
            tokenizer_path,
            dimension: 384,
            max_length: 256,
            cache_size,
        })
    }
}

/// Sentence embeddings from an ONNX export of all-MiniLM-L6-v2:
/// mean pooling over the attention mask, then L2 normalization.
pub struct MiniLmEmbeddings {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    config: MiniLmConfig,
    needs_token_type_ids: bool,
    cache: Arc<RwLock<lru::LruCache<String, Vec<f32>>>>,
}

impl MiniLmEmbeddings {
    pub fn new(config: MiniLmConfig) -> Result<Self> {
        ort::init().with_name("minilm_embeddings").commit();

        let model_bytes = std::fs::read(&config.model_path)
            .map_err(|e| anyhow!("Failed to read model {}: {:?}", config.model_path.display(), e))?;

        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let session = Session::builder()
            .map_err(|e| anyhow!("Session builder: {:?}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Optimization level: {:?}", e))?
            .with_intra_threads(num_threads)
            .map_err(|e| anyhow!("Intra threads: {:?}", e))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| anyhow!("Failed to load model: {:?}", e))?;

        let needs_token_type_ids = session
            .inputs
            .iter()
            .any(|input| input.name == "token_type_ids");

        let mut tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer.json: {}", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("Failed to configure truncation: {}", e))?;

        let capacity = NonZeroUsize::new(config.cache_size).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            config,
            needs_token_type_ids,
            cache: Arc::new(RwLock::new(lru::LruCache::new(capacity))),
        })
    }

    fn embed_cached(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.write().get(text) {
            return Ok(cached.clone());
        }

        let mut embeddings = self.embed_batch(&[text])?;
        let embedding = embeddings
            .pop()
            .ok_or_else(|| anyhow!("Model returned no embedding"))?;

        self.cache.write().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        const MAX_BATCH_SIZE: usize = 32;
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH_SIZE) {
            let encodings = self
                .tokenizer
                .encode_batch(batch.to_vec(), true)
                .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

            let padded_len = encodings
                .iter()
                .map(|e| e.get_ids().len())
                .max()
                .unwrap_or(0)
                .max(1);
            let batch_size = encodings.len();

            let rows: Vec<(&[u32], &[u32])> = encodings
                .iter()
                .map(|e| (e.get_ids(), e.get_attention_mask()))
                .collect();
            let (input_ids_flat, attention_mask_flat) = flatten_batch(&rows, padded_len);

            let shape = vec![batch_size, padded_len];
            let input_ids = Value::from_array((shape.clone(), input_ids_flat))
                .map_err(|e| anyhow!("input_ids tensor: {:?}", e))?;
            let attention_mask = Value::from_array((shape.clone(), attention_mask_flat.clone()))
                .map_err(|e| anyhow!("attention_mask tensor: {:?}", e))?;

            let mut session = self.session.lock();
            let outputs = if self.needs_token_type_ids {
                let token_type_ids = Value::from_array((shape, vec![0i64; batch_size * padded_len]))
                    .map_err(|e| anyhow!("token_type_ids tensor: {:?}", e))?;
                session.run(ort::inputs![
                    "input_ids" => input_ids,
                    "attention_mask" => attention_mask,
                    "token_type_ids" => token_type_ids,
                ])
            } else {
                session.run(ort::inputs![
                    "input_ids" => input_ids,
                    "attention_mask" => attention_mask,
                ])
            }
            .map_err(|e| anyhow!("Batch inference failed: {:?}", e))?;

            // Sentence-transformers exports may already be pooled.
            let has_sentence_embedding =
                outputs.iter().any(|(name, _)| name == "sentence_embedding");

            if has_sentence_embedding {
                let (shape, data) = outputs["sentence_embedding"]
                    .try_extract_tensor::<f32>()
                    .map_err(|e| anyhow!("Failed to extract sentence_embedding: {:?}", e))?;
                let hidden_dim = shape[1] as usize;
                for sample_idx in 0..batch_size {
                    let offset = sample_idx * hidden_dim;
                    all_embeddings.push(l2_normalize(data[offset..offset + hidden_dim].to_vec()));
                }
            } else {
                let output_name = outputs
                    .iter()
                    .find(|(name, _)| *name == "last_hidden_state" || *name == "token_embeddings")
                    .map(|(name, _)| name.to_string())
                    .unwrap_or_else(|| "last_hidden_state".to_string());

                let (shape, data) = outputs[output_name.as_str()]
                    .try_extract_tensor::<f32>()
                    .map_err(|e| anyhow!("Failed to extract output '{}': {:?}", output_name, e))?;
                let seq_len = shape[1] as usize;
                let hidden_dim = shape[2] as usize;

                for sample_idx in 0..batch_size {
                    let mask_start = sample_idx * padded_len;
                    let mask = &attention_mask_flat[mask_start..mask_start + padded_len];
                    let data_start = sample_idx * seq_len * hidden_dim;
                    let sample = &data[data_start..data_start + seq_len * hidden_dim];
                    all_embeddings.push(l2_normalize(mean_pool(sample, mask, seq_len, hidden_dim)));
                }
            }
        }

        Ok(all_embeddings)
    }
}

/// Flatten token ids and attention masks into row-major `[batch, padded_len]`
/// buffers. Masks come from the tokenizer, so padding it added stays masked out.
fn flatten_batch(rows: &[(&[u32], &[u32])], padded_len: usize) -> (Vec<i64>, Vec<i64>) {
    let mut ids_flat = Vec::with_capacity(rows.len() * padded_len);
    let mut mask_flat = Vec::with_capacity(rows.len() * padded_len);

    for (ids, mask) in rows {
        for (pos, &id) in ids.iter().enumerate().take(padded_len) {
            ids_flat.push(i64::from(id));
            mask_flat.push(i64::from(mask.get(pos).copied().unwrap_or(0)));
        }
        for _ in ids.len().min(padded_len)..padded_len {
            ids_flat.push(0);
            mask_flat.push(0);
        }
    }
    (ids_flat, mask_flat)
}

/// Average token vectors where the attention mask is set.
fn mean_pool(data: &[f32], mask: &[i64], seq_len: usize, hidden_dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_dim];
    let mut mask_sum = 0.0f32;

    for pos in 0..seq_len {
        let mask_val = mask.get(pos).copied().unwrap_or(0) as f32;
        if mask_val > 0.0 {
            mask_sum += mask_val;
            let offset = pos * hidden_dim;
            for (dim, value) in pooled.iter_mut().enumerate() {
                *value += data[offset + dim] * mask_val;
            }
        }
    }

    if mask_sum > 0.0 {
        for value in &mut pooled {
            *value /= mask_sum;
        }
    }
    pooled
}

impl EmbeddingModel for MiniLmEmbeddings {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_cached(text)
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_cached(text)
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pool_ignores_padding() {
        // two positions, dim 2; second position is padding
        let data = [1.0, 3.0, 100.0, 100.0];
        let pooled = mean_pool(&data, &[1, 0], 2, 2);
        assert_eq!(pooled, vec![1.0, 3.0]);
    }

    #[test]
    fn test_mean_pool_averages_active_tokens() {
        let data = [1.0, 2.0, 3.0, 4.0];
        let pooled = mean_pool(&data, &[1, 1], 2, 2);
        assert_eq!(pooled, vec![2.0, 3.0]);
    }

    #[test]
    fn test_flatten_batch_keeps_tokenizer_padding_masked() {
        // second row was padded by the tokenizer itself: ids end in 0 with mask 0
        let first: (&[u32], &[u32]) = (&[101, 7, 102], &[1, 1, 1]);
        let second: (&[u32], &[u32]) = (&[101, 102, 0], &[1, 1, 0]);
        let (ids, mask) = flatten_batch(&[first, second], 3);
        assert_eq!(ids, vec![101, 7, 102, 101, 102, 0]);
        assert_eq!(mask, vec![1, 1, 1, 1, 1, 0]);
    }

    #[test]
    fn test_flatten_batch_pads_short_rows() {
        let short: (&[u32], &[u32]) = (&[101, 102], &[1, 1]);
        let (ids, mask) = flatten_batch(&[short], 4);
        assert_eq!(ids, vec![101, 102, 0, 0]);
        assert_eq!(mask, vec![1, 1, 0, 0]);
    }

    #[test]
    fn test_auto_detect_requires_model_and_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MiniLmConfig::auto_detect(dir.path(), 10).is_none());

        let base = dir.path().join(MODEL_DIR_NAME);
        std::fs::create_dir_all(base.join("onnx")).unwrap();
        std::fs::write(base.join("onnx").join("model.onnx"), b"").unwrap();
        assert!(MiniLmConfig::auto_detect(dir.path(), 10).is_none());

        std::fs::write(base.join("tokenizer.json"), b"{}").unwrap();
        let config = MiniLmConfig::auto_detect(dir.path(), 10).unwrap();
        assert_eq!(config.model_path, base.join("onnx").join("model.onnx"));
        assert_eq!(config.dimension, 384);
    }
}
