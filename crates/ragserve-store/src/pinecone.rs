//! Pinecone-backed vector index.
//!
//! Follows the same contract as the local index over Pinecone's HTTP API.
//! Record text travels in the `content` metadata field since Pinecone stores
//! no document body. Upserts are chunked at 100 records per request and
//! deletes at 1,000 ids per request.

use async_trait::async_trait;
use ragserve_core::{ChunkMetadata, SearchHit, VectorIndex, VectorRecord, VectorStoreError};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Records per upsert request.
const UPSERT_BATCH: usize = 100;

/// Ids per delete request.
const DELETE_BATCH: usize = 1000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Pinecone index client.
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    threshold: f32,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(rename = "totalVectorCount", default)]
    total_vector_count: usize,
}

impl PineconeIndex {
    /// Client for one index in one environment.
    pub fn new(
        api_key: impl Into<String>,
        environment: impl Into<String>,
        index_name: impl Into<String>,
    ) -> Result<Self, VectorStoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VectorStoreError::Init(format!("http client: {e}")))?;

        let base_url = format!(
            "https://{}.svc.{}.pinecone.io",
            index_name.into(),
            environment.into()
        );

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url,
            threshold: 0.0,
        })
    }

    /// Drop hits scoring below `threshold`.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    async fn post(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response, VectorStoreError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("Api-Key", &self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| VectorStoreError::Query(format!("pinecone request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorStoreError::Query(format!("pinecone {status}: {body}")));
        }
        Ok(response)
    }

    fn hit_from_match(m: QueryMatch) -> SearchHit {
        let (content, metadata) = match m.metadata {
            Some(mut value) => {
                let content = value
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                if let Some(obj) = value.as_object_mut() {
                    obj.remove("content");
                }
                let metadata: ChunkMetadata =
                    serde_json::from_value(value).unwrap_or_default();
                (content, metadata)
            }
            None => (String::new(), ChunkMetadata::default()),
        };

        SearchHit {
            id: m.id,
            content,
            score: m.score.clamp(0.0, 1.0),
            metadata,
        }
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn initialize(&self) -> Result<(), VectorStoreError> {
        // The index already exists server-side; verify it answers.
        self.post("/describe_index_stats", &json!({}))
            .await
            .map_err(|e| VectorStoreError::Init(e.to_string()))?;
        Ok(())
    }

    async fn add_documents(&self, records: &[VectorRecord]) -> Result<(), VectorStoreError> {
        for batch in records.chunks(UPSERT_BATCH) {
            let vectors: Vec<serde_json::Value> = batch
                .iter()
                .map(|record| {
                    let mut metadata = serde_json::to_value(&record.metadata)
                        .unwrap_or_else(|_| json!({}));
                    if let Some(obj) = metadata.as_object_mut() {
                        obj.insert("content".to_string(), json!(record.content));
                    }
                    json!({
                        "id": record.id,
                        "values": record.embedding,
                        "metadata": metadata,
                    })
                })
                .collect();

            self.post("/vectors/upsert", &json!({ "vectors": vectors }))
                .await
                .map_err(|e| VectorStoreError::Insert(e.to_string()))?;
        }

        debug!(records = records.len(), "pinecone upsert complete");
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, VectorStoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .post(
                "/query",
                &json!({
                    "vector": query,
                    "topK": k,
                    "includeMetadata": true,
                    "includeValues": false,
                }),
            )
            .await?;

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| VectorStoreError::Query(format!("pinecone response: {e}")))?;

        Ok(parsed
            .matches
            .into_iter()
            .map(Self::hit_from_match)
            .filter(|hit| hit.score >= self.threshold)
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<(), VectorStoreError> {
        for batch in ids.chunks(DELETE_BATCH) {
            self.post("/vectors/delete", &json!({ "ids": batch }))
                .await
                .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), VectorStoreError> {
        self.post("/vectors/delete", &json!({ "deleteAll": true }))
            .await
            .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        let response = self.post("/describe_index_stats", &json!({})).await?;
        let stats: StatsResponse = response
            .json()
            .await
            .map_err(|e| VectorStoreError::Query(format!("pinecone stats: {e}")))?;
        Ok(stats.total_vector_count)
    }

    async fn test_connection(&self) -> bool {
        self.post("/describe_index_stats", &json!({})).await.is_ok()
    }
}
