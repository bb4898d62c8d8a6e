//! Pinecone serverless index over the REST API.
//!
//! Startup creates the index when it doesn't exist (cosine metric, embedding
//! dimension), tolerating a concurrent "already exists", then resolves the
//! data-plane host. Records are upserted in batches with their fields as
//! metadata; queries embed locally and ask for `topK` matches with metadata.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;

use super::{indexing_progress, SemanticIndex};
use crate::config::PineconeConfig;
use crate::embeddings::EmbeddingModel;
use crate::error::IndexError;
use crate::processing::sample::sample_indices;
use crate::types::{RecordStore, RetrievedRecord, SalesRecord};

const CONTROL_PLANE: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";
const READY_POLL_ATTEMPTS: u32 = 30;

pub struct PineconeIndex {
    client: Client,
    api_key: String,
    host: String,
    embeddings: Arc<dyn EmbeddingModel>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<MatchMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct MatchMetadata {
    region: String,
    product: String,
    sales: f64,
    date: String,
}

impl PineconeIndex {
    /// Create-or-reuse the configured index and wait until it is ready.
    pub async fn connect(
        config: &PineconeConfig,
        embeddings: Arc<dyn EmbeddingModel>,
    ) -> Result<Self, IndexError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| IndexError::Backend("PINECONE_API_KEY is not set".to_string()))?;
        let client = build_client()?;

        ensure_index(&client, &api_key, config, embeddings.dimension()).await?;

        let mut attempts = 0;
        let description = loop {
            let description = describe_index(&client, &api_key, &config.index_name).await?;
            if description.status.ready || attempts >= READY_POLL_ATTEMPTS {
                break description;
            }
            attempts += 1;
            tokio::time::sleep(Duration::from_secs(2)).await;
        };

        tracing::info!(
            index = %config.index_name,
            host = %description.host,
            "Connected to Pinecone index"
        );

        Ok(Self {
            client,
            api_key,
            host: description.host,
            embeddings,
        })
    }

    /// Use an index whose data-plane host is already known.
    pub fn with_host(
        host: impl Into<String>,
        api_key: impl Into<String>,
        embeddings: Arc<dyn EmbeddingModel>,
    ) -> Result<Self, IndexError> {
        Ok(Self {
            client: build_client()?,
            api_key: api_key.into(),
            host: host.into(),
            embeddings,
        })
    }

    /// Upsert the store (or a deterministic sample of it) in batches.
    /// Vector ids are the records' positions in the store.
    pub async fn upsert_store(
        &self,
        store: &RecordStore,
        batch_size: usize,
        sample_size: Option<usize>,
    ) -> Result<usize, IndexError> {
        let positions = match sample_size {
            Some(n) if n < store.len() => {
                tracing::info!(rows = n, "Sampling rows for indexing");
                sample_indices(store.len(), n)
            }
            _ => (0..store.len()).collect(),
        };

        let pb = indexing_progress(positions.len());
        let mut upserted = 0;

        for batch in positions.chunks(batch_size.max(1)) {
            let records: Vec<(usize, &SalesRecord)> =
                batch.iter().map(|&i| (i, &store.records()[i])).collect();
            let texts: Vec<String> = records.iter().map(|(_, r)| r.document_text()).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let vectors = self
                .embeddings
                .embed_documents(&refs)
                .map_err(|e| IndexError::Embedding(e.to_string()))?;

            let body = upsert_body(&records, &vectors);
            let response = self
                .client
                .post(format!("{}/vectors/upsert", self.data_plane()))
                .header("Api-Key", &self.api_key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .json(&body)
                .send()
                .await
                .map_err(|e| IndexError::Backend(format!("upsert request failed: {}", e)))?;

            if !response.status().is_success() {
                let status = response.status();
                let error = response.text().await.unwrap_or_default();
                return Err(IndexError::Backend(format!("upsert failed ({}): {}", status, error)));
            }

            upserted += records.len();
            pb.inc(records.len() as u64);
            tracing::debug!(upserted, "Upserted batch");
        }

        pb.finish_and_clear();
        tracing::info!(records = upserted, "Finished indexing into Pinecone");
        Ok(upserted)
    }

    fn data_plane(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            self.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.host.trim_end_matches('/'))
        }
    }
}

#[async_trait]
impl SemanticIndex for PineconeIndex {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedRecord>, IndexError> {
        let vector = self
            .embeddings
            .embed_query(query)
            .map_err(|e| IndexError::Embedding(e.to_string()))?;

        let response = self
            .client
            .post(format!("{}/query", self.data_plane()))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&query_body(&vector, k))
            .send()
            .await
            .map_err(|e| IndexError::Backend(format!("query request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(IndexError::Backend(format!("query failed ({}): {}", status, error)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| IndexError::Backend(format!("failed to read query response: {}", e)))?;
        let mut results = decode_matches(&body)?;
        results.truncate(k);
        Ok(results)
    }
}

fn build_client() -> Result<Client, IndexError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(15))
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| IndexError::Backend(format!("failed to build HTTP client: {}", e)))
}

async fn ensure_index(
    client: &Client,
    api_key: &str,
    config: &PineconeConfig,
    dimension: usize,
) -> Result<(), IndexError> {
    let response = client
        .get(format!("{}/indexes/{}", CONTROL_PLANE, config.index_name))
        .header("Api-Key", api_key)
        .header("X-Pinecone-API-Version", API_VERSION)
        .send()
        .await
        .map_err(|e| IndexError::Backend(format!("describe request failed: {}", e)))?;

    if response.status().is_success() {
        return Ok(());
    }
    if response.status() != StatusCode::NOT_FOUND {
        let status = response.status();
        let error = response.text().await.unwrap_or_default();
        return Err(IndexError::Backend(format!("describe failed ({}): {}", status, error)));
    }

    tracing::info!(index = %config.index_name, dimension, "Creating Pinecone index");
    let response = client
        .post(format!("{}/indexes", CONTROL_PLANE))
        .header("Api-Key", api_key)
        .header("X-Pinecone-API-Version", API_VERSION)
        .json(&create_index_body(config, dimension))
        .send()
        .await
        .map_err(|e| IndexError::Backend(format!("create request failed: {}", e)))?;

    match response.status() {
        s if s.is_success() => Ok(()),
        StatusCode::CONFLICT => Ok(()),
        status => {
            let error = response.text().await.unwrap_or_default();
            if error.contains("ALREADY_EXISTS") {
                Ok(())
            } else {
                Err(IndexError::Backend(format!("create failed ({}): {}", status, error)))
            }
        }
    }
}

async fn describe_index(
    client: &Client,
    api_key: &str,
    name: &str,
) -> Result<IndexDescription, IndexError> {
    let response = client
        .get(format!("{}/indexes/{}", CONTROL_PLANE, name))
        .header("Api-Key", api_key)
        .header("X-Pinecone-API-Version", API_VERSION)
        .send()
        .await
        .map_err(|e| IndexError::Backend(format!("describe request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let error = response.text().await.unwrap_or_default();
        return Err(IndexError::Backend(format!("describe failed ({}): {}", status, error)));
    }

    response
        .json::<IndexDescription>()
        .await
        .map_err(|e| IndexError::Decode(e.to_string()))
}

fn create_index_body(config: &PineconeConfig, dimension: usize) -> JsonValue {
    json!({
        "name": config.index_name,
        "dimension": dimension,
        "metric": "cosine",
        "spec": {
            "serverless": {
                "cloud": config.cloud,
                "region": config.region,
            }
        }
    })
}

fn upsert_body(records: &[(usize, &SalesRecord)], vectors: &[Vec<f32>]) -> JsonValue {
    let vectors: Vec<JsonValue> = records
        .iter()
        .zip(vectors)
        .map(|((id, record), values)| {
            json!({
                "id": id.to_string(),
                "values": values,
                "metadata": record,
            })
        })
        .collect();
    json!({ "vectors": vectors })
}

fn query_body(vector: &[f32], k: usize) -> JsonValue {
    json!({
        "vector": vector,
        "topK": k,
        "includeMetadata": true,
        "includeValues": false,
    })
}

/// Matches without metadata can't be shown to the user and are skipped.
fn decode_matches(body: &str) -> Result<Vec<RetrievedRecord>, IndexError> {
    let response: QueryResponse =
        serde_json::from_str(body).map_err(|e| IndexError::Decode(e.to_string()))?;

    Ok(response
        .matches
        .into_iter()
        .filter_map(|m| {
            let meta = m.metadata?;
            Some(RetrievedRecord {
                record: SalesRecord::new(meta.region, meta.product, meta.sales, meta.date),
                score: m.score,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_body_uses_cosine_and_serverless_spec() {
        let config = PineconeConfig {
            cloud: "gcp".into(),
            region: "us-west1".into(),
            ..PineconeConfig::default()
        };
        let body = create_index_body(&config, 384);
        assert_eq!(body["name"], "sales-index-st");
        assert_eq!(body["dimension"], 384);
        assert_eq!(body["metric"], "cosine");
        assert_eq!(body["spec"]["serverless"]["cloud"], "gcp");
        assert_eq!(body["spec"]["serverless"]["region"], "us-west1");
    }

    #[test]
    fn test_upsert_body_carries_record_metadata() {
        let record = SalesRecord::new("France", "POSTAGE", 18.0, "2011-01-05 10:00:00");
        let body = upsert_body(&[(42, &record)], &[vec![0.1, 0.2]]);
        let vector = &body["vectors"][0];
        assert_eq!(vector["id"], "42");
        assert_eq!(vector["values"].as_array().map(|v| v.len()), Some(2));
        assert_eq!(vector["metadata"]["Region"], "France");
        assert_eq!(vector["metadata"]["Product"], "POSTAGE");
        assert_eq!(vector["metadata"]["Sales"], 18.0);
        assert_eq!(vector["metadata"]["Date"], "2011-01-05 10:00:00");
    }

    #[test]
    fn test_query_body() {
        let body = query_body(&[1.0, 0.0], 5);
        assert_eq!(body["topK"], 5);
        assert_eq!(body["includeMetadata"], true);
    }

    #[test]
    fn test_decode_matches_keeps_order_and_skips_bare_matches() {
        let body = r#"{
            "matches": [
                {"id": "1", "score": 0.91, "metadata": {
                    "Region": "UK", "Product": "MUG", "Sales": 2.5, "Date": "2010-12-01"
                }},
                {"id": "2", "score": 0.80},
                {"id": "3", "score": 0.75, "metadata": {
                    "Region": "EIRE", "Product": "JUG", "Sales": 7
                }}
            ],
            "namespace": ""
        }"#;
        let results = decode_matches(body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record, SalesRecord::new("UK", "MUG", 2.5, "2010-12-01"));
        assert_eq!(results[1].record, SalesRecord::new("EIRE", "JUG", 7.0, ""));
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_matches("<html>"), Err(IndexError::Decode(_))));
    }

    #[test]
    fn test_data_plane_url() {
        let embeddings = Arc::new(crate::embeddings::HashEmbeddings::new(8));
        let host = "sales-abc.svc.pinecone.io/";
        let index = PineconeIndex::with_host(host, "k", embeddings.clone()).unwrap();
        assert_eq!(index.data_plane(), "https://sales-abc.svc.pinecone.io");

        let local = PineconeIndex::with_host("http://localhost:5080", "k", embeddings).unwrap();
        assert_eq!(local.data_plane(), "http://localhost:5080");
    }

    #[tokio::test]
    async fn test_connect_without_key_is_backend_error() {
        let embeddings = Arc::new(crate::embeddings::HashEmbeddings::new(8));
        let err = PineconeIndex::connect(&PineconeConfig::default(), embeddings)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, IndexError::Backend(_)));
    }
}
