//! OpenAI embedding provider.
//!
//! Inputs exceeding the per-request cap are partitioned into sub-batches of
//! at most 20 items, with a short pacing delay between sub-calls to stay
//! under rate limits. Usage is summed across sub-calls.

use async_trait::async_trait;
use ragserve_core::{EmbeddingError, EmbeddingOutput, EmbeddingProvider, TokenUsage};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Maximum items per backend request.
const EMBED_BATCH_SIZE: usize = 20;

/// Pause between consecutive sub-calls.
const BATCH_PACING: Duration = Duration::from_millis(100);

/// Outbound request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI `/embeddings` client.
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
    usage: Option<ApiUsage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl OpenAiEmbeddings {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EmbeddingError::Api(format!("http client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            dimension,
        })
    }

    /// Override the API base URL (OpenAI-compatible endpoints).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// One backend call for at most [`EMBED_BATCH_SIZE`] texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingsResponse, EmbeddingError> {
        let mut payload = json!({
            "model": self.model,
            "input": texts,
        });
        // The v3 embedding models accept an explicit output dimension.
        if self.model.starts_with("text-embedding-3") {
            payload["dimensions"] = json!(self.dimension);
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api(format!("{status}: {body}")));
        }

        response
            .json::<EmbeddingsResponse>()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> EmbeddingError {
    if e.is_timeout() {
        EmbeddingError::Timeout(e.to_string())
    } else {
        EmbeddingError::Api(e.to_string())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_many(&self, texts: &[String]) -> Result<EmbeddingOutput, EmbeddingError> {
        if texts.is_empty() {
            return Ok(EmbeddingOutput {
                vectors: Vec::new(),
                usage: None,
                model: Some(self.model.clone()),
            });
        }

        let mut vectors = Vec::with_capacity(texts.len());
        let mut usage = TokenUsage::default();
        let mut saw_usage = false;
        let mut model = None;

        let batches: Vec<&[String]> = texts.chunks(EMBED_BATCH_SIZE).collect();
        let batch_count = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            let mut response = self.embed_batch(batch).await?;

            if response.data.len() != batch.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.data.len()
                )));
            }

            response.data.sort_by_key(|d| d.index);
            for datum in response.data {
                if datum.embedding.len() != self.dimension {
                    return Err(EmbeddingError::InvalidResponse(format!(
                        "embedding length {} does not match dimension {}",
                        datum.embedding.len(),
                        self.dimension
                    )));
                }
                vectors.push(datum.embedding);
            }

            if let Some(api_usage) = response.usage {
                usage.add(&TokenUsage {
                    prompt_tokens: api_usage.prompt_tokens,
                    completion_tokens: 0,
                    total_tokens: api_usage.total_tokens,
                });
                saw_usage = true;
            }
            if model.is_none() {
                model = response.model.take();
            }

            if i + 1 < batch_count {
                tokio::time::sleep(BATCH_PACING).await;
            }
        }

        debug!(
            texts = texts.len(),
            batches = batch_count,
            "embedded batch"
        );

        Ok(EmbeddingOutput {
            vectors,
            usage: saw_usage.then_some(usage),
            model: model.or_else(|| Some(self.model.clone())),
        })
    }

    async fn test_connection(&self) -> bool {
        self.embed_one("connection test").await.is_ok()
    }
}
