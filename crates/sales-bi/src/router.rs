//! Query routing and the fallback chain.
//!
//! A query is classified into an [`Intent`] by substring patterns. Intents
//! with a deterministic handler are answered straight from the record store;
//! everything else goes through retrieval + generation, degrading to the raw
//! retrieved records when the generator fails.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::aggregate::{biggest_increase, latest_periods, periods_in_query, NO_DATA_MESSAGE};
use crate::index::SemanticIndex;
use crate::llm::AnswerGenerator;
use crate::types::{Answer, RecordStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// "Which product had the biggest sales increase between A and B?"
    BiggestSalesIncrease,
    /// Anything else: retrieval-augmented generation.
    Open,
}

/// Lowercase substring → intent. First match wins.
const INTENT_PATTERNS: &[(&str, Intent)] =
    &[("biggest sales increase", Intent::BiggestSalesIncrease)];

impl Intent {
    pub fn classify(query: &str) -> Self {
        let normalized = query.trim().to_lowercase();
        INTENT_PATTERNS
            .iter()
            .find(|(pattern, _)| normalized.contains(pattern))
            .map(|(_, intent)| *intent)
            .unwrap_or(Intent::Open)
    }

    /// Whether this intent is answered without the index or the generator.
    pub fn is_deterministic(self) -> bool {
        !matches!(self, Intent::Open)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Records retrieved per open query.
    pub top_k: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

pub struct QueryRouter {
    store: RecordStore,
    index: Arc<dyn SemanticIndex>,
    generator: Arc<dyn AnswerGenerator>,
    config: RouterConfig,
}

impl QueryRouter {
    pub fn new(
        store: RecordStore,
        index: Arc<dyn SemanticIndex>,
        generator: Arc<dyn AnswerGenerator>,
        config: RouterConfig,
    ) -> Self {
        Self {
            store,
            index,
            generator,
            config,
        }
    }

    /// Answer a query. Collaborator failures become a degraded answer or a
    /// message; this never returns an error.
    pub async fn resolve(&self, query: &str) -> Answer {
        let intent = Intent::classify(query);
        tracing::info!(?intent, "Routing query");

        match intent {
            Intent::BiggestSalesIncrease => self.resolve_biggest_increase(query),
            Intent::Open => self.resolve_open(query).await,
        }
    }

    /// Two named periods are compared as given; a single named month is
    /// compared with the month before it. With none named, the two latest
    /// months in the store are used.
    fn resolve_biggest_increase(&self, query: &str) -> Answer {
        let named = periods_in_query(query);
        let periods = match named.as_slice() {
            [a, b, ..] => Some((*a, *b)),
            [only] => Some((only.previous(), *only)),
            [] => latest_periods(&self.store),
        };

        match periods {
            Some((a, b)) => {
                tracing::info!(period_a = %a, period_b = %b, "Deterministic aggregation");
                Answer::GeneratedText(biggest_increase(&self.store, a, b))
            }
            None => Answer::GeneratedText(NO_DATA_MESSAGE.to_string()),
        }
    }

    async fn resolve_open(&self, query: &str) -> Answer {
        let context = match self.index.similarity_search(query, self.config.top_k).await {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(error = %e, "Semantic index unavailable");
                return Answer::Unavailable(format!(
                    "Sorry, the search index is unavailable right now ({}). Please try again.",
                    e
                ));
            }
        };

        match self.generator.generate(query, &context).await {
            Ok(text) => Answer::GeneratedText(text),
            Err(e) => {
                tracing::warn!(
                    kind = e.kind(),
                    error = %e,
                    records = context.len(),
                    "Answer generator failed, returning retrieved records"
                );
                Answer::RawRecords(context.into_iter().map(|r| r.record).collect())
            }
        }
    }
}
