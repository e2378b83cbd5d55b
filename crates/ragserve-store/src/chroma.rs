//! Chroma-backed vector index.
//!
//! Speaks the Chroma REST API: one collection per index, created on
//! `initialize`. Chroma reports distances, converted here to similarity
//! scores in [0, 1].

use async_trait::async_trait;
use ragserve_core::{ChunkMetadata, SearchHit, VectorIndex, VectorRecord, VectorStoreError};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Records per upsert request.
const UPSERT_BATCH: usize = 100;

/// Ids per delete request.
const DELETE_BATCH: usize = 1000;

/// Chroma collection client.
pub struct ChromaIndex {
    client: reqwest::Client,
    base_url: String,
    collection_name: String,
    collection_id: RwLock<Option<String>>,
    threshold: f32,
}

#[derive(Debug, Deserialize)]
struct Collection {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChromaQueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Vec<Vec<Option<serde_json::Value>>>,
    #[serde(default)]
    distances: Vec<Vec<f32>>,
}

impl ChromaIndex {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        collection_name: impl Into<String>,
        ssl: bool,
    ) -> Result<Self, VectorStoreError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VectorStoreError::Init(format!("http client: {e}")))?;

        let scheme = if ssl { "https" } else { "http" };
        Ok(Self {
            client,
            base_url: format!("{scheme}://{}:{port}", host.into()),
            collection_name: collection_name.into(),
            collection_id: RwLock::new(None),
            threshold: 0.0,
        })
    }

    /// Drop hits scoring below `threshold`.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    async fn ensure_collection(&self) -> Result<String, VectorStoreError> {
        if let Some(id) = self.collection_id.read().await.clone() {
            return Ok(id);
        }

        let response = self
            .client
            .post(format!("{}/api/v1/collections", self.base_url))
            .json(&json!({
                "name": self.collection_name,
                "get_or_create": true,
                "metadata": {"hnsw:space": "cosine"},
            }))
            .send()
            .await
            .map_err(|e| VectorStoreError::Init(format!("chroma request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorStoreError::Init(format!("chroma {status}: {body}")));
        }

        let collection: Collection = response
            .json()
            .await
            .map_err(|e| VectorStoreError::Init(format!("chroma response: {e}")))?;

        *self.collection_id.write().await = Some(collection.id.clone());
        debug!(collection = %self.collection_name, id = %collection.id, "chroma collection ready");
        Ok(collection.id)
    }

    async fn post(
        &self,
        path: String,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response, VectorStoreError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(payload)
            .send()
            .await
            .map_err(|e| VectorStoreError::Query(format!("chroma request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VectorStoreError::Query(format!("chroma {status}: {body}")));
        }
        Ok(response)
    }

    /// Cosine distance → similarity in [0, 1].
    fn score_from_distance(distance: f32) -> f32 {
        (1.0 - distance).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    async fn initialize(&self) -> Result<(), VectorStoreError> {
        self.ensure_collection().await.map(|_| ())
    }

    async fn add_documents(&self, records: &[VectorRecord]) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let collection = self.ensure_collection().await?;

        for batch in records.chunks(UPSERT_BATCH) {
            let ids: Vec<&str> = batch.iter().map(|r| r.id.as_str()).collect();
            let embeddings: Vec<&[f32]> = batch.iter().map(|r| r.embedding.as_slice()).collect();
            let documents: Vec<&str> = batch.iter().map(|r| r.content.as_str()).collect();
            let metadatas: Vec<serde_json::Value> = batch
                .iter()
                .map(|r| serde_json::to_value(&r.metadata).unwrap_or_else(|_| json!({})))
                .collect();

            self.post(
                format!("/api/v1/collections/{collection}/upsert"),
                &json!({
                    "ids": ids,
                    "embeddings": embeddings,
                    "documents": documents,
                    "metadatas": metadatas,
                }),
            )
            .await
            .map_err(|e| VectorStoreError::Insert(e.to_string()))?;
        }

        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, VectorStoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let collection = self.ensure_collection().await?;

        let response = self
            .post(
                format!("/api/v1/collections/{collection}/query"),
                &json!({
                    "query_embeddings": [query],
                    "n_results": k,
                    "include": ["documents", "metadatas", "distances"],
                }),
            )
            .await?;

        let parsed: ChromaQueryResponse = response
            .json()
            .await
            .map_err(|e| VectorStoreError::Query(format!("chroma response: {e}")))?;

        let ids = parsed.ids.into_iter().next().unwrap_or_default();
        let documents = parsed.documents.into_iter().next().unwrap_or_default();
        let metadatas = parsed.metadatas.into_iter().next().unwrap_or_default();
        let distances = parsed.distances.into_iter().next().unwrap_or_default();

        let mut hits = Vec::with_capacity(ids.len());
        for (i, id) in ids.into_iter().enumerate() {
            let score = distances
                .get(i)
                .copied()
                .map(Self::score_from_distance)
                .unwrap_or(0.0);
            if score < self.threshold {
                continue;
            }
            let content = documents
                .get(i)
                .and_then(|d| d.clone())
                .unwrap_or_default();
            let metadata: ChunkMetadata = metadatas
                .get(i)
                .and_then(|m| m.clone())
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
            hits.push(SearchHit {
                id,
                content,
                score,
                metadata,
            });
        }

        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<(), VectorStoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let collection = self.ensure_collection().await?;

        for batch in ids.chunks(DELETE_BATCH) {
            self.post(
                format!("/api/v1/collections/{collection}/delete"),
                &json!({ "ids": batch }),
            )
            .await
            .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
        }

        Ok(())
    }

    async fn clear(&self) -> Result<(), VectorStoreError> {
        let collection = self.ensure_collection().await?;

        // Dropping and recreating the collection keeps its identity (name)
        // while discarding every record.
        let response = self
            .client
            .delete(format!(
                "{}/api/v1/collections/{}",
                self.base_url, self.collection_name
            ))
            .send()
            .await
            .map_err(|e| VectorStoreError::Delete(format!("chroma request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(VectorStoreError::Delete(format!(
                "chroma drop collection {collection}: {status}"
            )));
        }

        *self.collection_id.write().await = None;
        self.ensure_collection().await.map(|_| ())
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        let collection = self.ensure_collection().await?;

        let response = self
            .client
            .get(format!(
                "{}/api/v1/collections/{collection}/count",
                self.base_url
            ))
            .send()
            .await
            .map_err(|e| VectorStoreError::Query(format!("chroma request: {e}")))?;

        if !response.status().is_success() {
            return Err(VectorStoreError::Query(format!(
                "chroma count: {}",
                response.status()
            )));
        }

        response
            .json::<usize>()
            .await
            .map_err(|e| VectorStoreError::Query(format!("chroma count response: {e}")))
    }

    async fn test_connection(&self) -> bool {
        self.client
            .get(format!("{}/api/v1/heartbeat", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_schemes() {
        let plain = ChromaIndex::new("localhost", 8000, "rag", false).unwrap();
        assert_eq!(plain.base_url, "http://localhost:8000");

        let tls = ChromaIndex::new("chroma.internal", 443, "rag", true).unwrap();
        assert_eq!(tls.base_url, "https://chroma.internal:443");
    }

    #[test]
    fn test_score_from_distance() {
        assert_eq!(ChromaIndex::score_from_distance(0.0), 1.0);
        assert!((ChromaIndex::score_from_distance(0.25) - 0.75).abs() < 1e-6);
        // Distances above 1 clamp to zero similarity.
        assert_eq!(ChromaIndex::score_from_distance(1.8), 0.0);
    }

    #[test]
    fn test_query_response_parsing() {
        let body = r#"{
            "ids": [["a", "b"]],
            "documents": [["first text", null]],
            "metadatas": [[{"documentId": "d1", "filename": "f.txt",
                            "chunkIndex": 0, "startChar": 0, "endChar": 10},
                           null]],
            "distances": [[0.1, 0.6]]
        }"#;

        let parsed: ChromaQueryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.ids[0].len(), 2);
        assert_eq!(parsed.documents[0][0].as_deref(), Some("first text"));
        assert!(parsed.documents[0][1].is_none());
        assert!((parsed.distances[0][0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_empty_query_response() {
        let parsed: ChromaQueryResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.ids.is_empty());
        assert!(parsed.distances.is_empty());
    }
}
