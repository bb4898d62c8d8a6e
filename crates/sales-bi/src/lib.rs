pub mod aggregate;
pub mod chat;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod fallback;
pub mod index;
pub mod llm;
pub mod processing;
pub mod router;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience
pub use config::BiConfig;
pub use error::{GeneratorError, IndexError, LoadError};
pub use router::{Intent, QueryRouter, RouterConfig};
pub use types::{Answer, RecordStore, RetrievedRecord, SalesRecord};

// Re-export index and generator seams
pub use index::{MemoryIndex, PineconeIndex, SemanticIndex};
pub use llm::{AnswerGenerator, OpenAiGenerator};

pub use anyhow::{Error, Result};
