use async_trait::async_trait;
use std::sync::Arc;

use super::{indexing_progress, SemanticIndex};
use crate::embeddings::{cosine_similarity, EmbeddingModel};
use crate::error::IndexError;
use crate::types::{RecordStore, RetrievedRecord, SalesRecord};

const EMBED_BATCH_SIZE: usize = 100;

struct IndexEntry {
    record: SalesRecord,
    vector: Vec<f32>,
}

/// Exact cosine index over every record, built once at startup.
pub struct MemoryIndex {
    embeddings: Arc<dyn EmbeddingModel>,
    entries: Vec<IndexEntry>,
}

impl MemoryIndex {
    /// Embed each record's `"{Region} | {Product} | {Sales}"` text.
    pub fn build(
        store: &RecordStore,
        embeddings: Arc<dyn EmbeddingModel>,
    ) -> Result<Self, IndexError> {
        let pb = indexing_progress(store.len());
        let mut entries = Vec::with_capacity(store.len());

        for batch in store.records().chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(SalesRecord::document_text).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let vectors = embeddings
                .embed_documents(&refs)
                .map_err(|e| IndexError::Embedding(e.to_string()))?;

            if vectors.len() != batch.len() {
                return Err(IndexError::Embedding(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            entries.extend(batch.iter().zip(vectors).map(|(record, vector)| IndexEntry {
                record: record.clone(),
                vector,
            }));
            pb.inc(batch.len() as u64);
        }

        pb.finish_and_clear();
        tracing::info!(records = entries.len(), "In-memory index built");

        Ok(Self {
            embeddings,
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SemanticIndex for MemoryIndex {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedRecord>, IndexError> {
        let query_vec = self
            .embeddings
            .embed_query(query)
            .map_err(|e| IndexError::Embedding(e.to_string()))?;

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(&query_vec, &entry.vector)))
            .collect();

        // Stable sort: equal scores keep load order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| RetrievedRecord {
                record: self.entries[i].record.clone(),
                score,
            })
            .collect())
    }
}
