//! In-crate test doubles for the index and generator seams. Each counts its
//! calls so tests can assert which collaborators a query reached.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{GeneratorError, IndexError};
use crate::index::SemanticIndex;
use crate::llm::AnswerGenerator;
use crate::types::RetrievedRecord;

pub struct MockIndex {
    pub calls: AtomicUsize,
    results: Vec<RetrievedRecord>,
    fail: bool,
}

impl MockIndex {
    pub fn new(results: Vec<RetrievedRecord>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            results,
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            results: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl SemanticIndex for MockIndex {
    async fn similarity_search(
        &self,
        _query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedRecord>, IndexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(IndexError::Backend("connection refused".into()));
        }
        Ok(self.results.iter().take(k).cloned().collect())
    }
}

pub struct MockGenerator {
    pub calls: AtomicUsize,
    response: Result<String, GeneratorError>,
}

impl MockGenerator {
    pub fn new(response: Result<String, GeneratorError>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response,
        })
    }
}

#[async_trait]
impl AnswerGenerator for MockGenerator {
    async fn generate(
        &self,
        _query: &str,
        _context: &[RetrievedRecord],
    ) -> Result<String, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}
