//! Semantic index backends: nearest-record lookup for free-text queries.

pub mod memory;
pub mod pinecone;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::IndexError;
use crate::types::RetrievedRecord;

pub use memory::MemoryIndex;
pub use pinecone::PineconeIndex;

/// Nearest-neighbour search over indexed sales records.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Up to `k` records most similar to `query`, best first.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedRecord>, IndexError>;
}

/// Progress bar for index builds; hidden automatically when stderr isn't a terminal.
pub(crate) fn indexing_progress(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records ({eta})",
        )
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
