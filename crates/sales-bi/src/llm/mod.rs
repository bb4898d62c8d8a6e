//! LLM answer generation over retrieved sales records.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::GeneratorError;
use crate::types::RetrievedRecord;

pub use openai::OpenAiGenerator;

/// Produces a natural-language answer from a question and its retrieved context.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(
        &self,
        query: &str,
        context: &[RetrievedRecord],
    ) -> Result<String, GeneratorError>;
}

/// Generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
}

impl From<&LlmConfig> for GenerationConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

/// "Stuff" prompt: every retrieved record, then the question.
pub fn format_rag_prompt(query: &str, context: &[RetrievedRecord]) -> String {
    let records = context
        .iter()
        .map(|r| r.record.document_text())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Use the following pieces of context to answer the question at the end. \
         Each line is a sales record formatted as \"Region | Product | Sales\". \
         If you don't know the answer, just say that you don't know, \
         don't try to make up an answer.\n\n\
         {}\n\nQuestion: {}\nHelpful Answer:",
        records, query
    )
}
