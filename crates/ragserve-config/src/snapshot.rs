//! Configuration snapshots.
//!
//! A configuration is an immutable record binding one LLM, one embedding,
//! and one vector provider, each selected by a tagged variant. At most one
//! configuration per owner is active at any instant.

use chrono::{DateTime, Utc};
use ragserve_core::ChatParameters;
use serde::{Deserialize, Serialize};

/// Language-model provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider")]
pub enum LlmProviderConfig {
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(rename = "apiKey")]
        api_key: String,
        #[serde(default = "default_llm_model")]
        model: String,
        #[serde(flatten)]
        params: ChatParameters,
    },
    #[serde(rename = "azure-openai")]
    AzureOpenAi {
        #[serde(rename = "apiKey")]
        api_key: String,
        endpoint: String,
        #[serde(rename = "deploymentName")]
        deployment_name: String,
        #[serde(rename = "apiVersion")]
        api_version: String,
        #[serde(flatten)]
        params: ChatParameters,
    },
    #[serde(rename = "anthropic")]
    Anthropic {
        #[serde(rename = "apiKey")]
        api_key: String,
        model: String,
        #[serde(flatten)]
        params: ChatParameters,
    },
}

/// Embedding provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider")]
pub enum EmbeddingProviderConfig {
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(rename = "apiKey")]
        api_key: String,
        #[serde(default = "default_embedding_model")]
        model: String,
        #[serde(default = "default_dimension")]
        dimension: usize,
    },
}

impl EmbeddingProviderConfig {
    pub fn dimension(&self) -> usize {
        match self {
            EmbeddingProviderConfig::OpenAi { dimension, .. } => *dimension,
        }
    }
}

/// Vector index provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider")]
pub enum VectorProviderConfig {
    #[serde(rename = "faiss")]
    Faiss {
        #[serde(rename = "indexPath", default = "default_index_path")]
        index_path: String,
        #[serde(rename = "indexType", default = "default_index_type")]
        index_type: String,
        #[serde(default = "default_dimension")]
        dimension: usize,
        #[serde(rename = "topK", default = "default_top_k")]
        top_k: usize,
        #[serde(default)]
        threshold: f32,
    },
    #[serde(rename = "pinecone")]
    Pinecone {
        #[serde(rename = "apiKey")]
        api_key: String,
        environment: String,
        #[serde(rename = "indexName")]
        index_name: String,
        #[serde(default = "default_dimension")]
        dimension: usize,
        #[serde(rename = "topK", default = "default_top_k")]
        top_k: usize,
        #[serde(default)]
        threshold: f32,
    },
    #[serde(rename = "chroma")]
    Chroma {
        host: String,
        #[serde(default = "default_chroma_port")]
        port: u16,
        #[serde(rename = "collectionName")]
        collection_name: String,
        #[serde(default)]
        ssl: bool,
        #[serde(default = "default_dimension")]
        dimension: usize,
        #[serde(rename = "topK", default = "default_top_k")]
        top_k: usize,
        #[serde(default)]
        threshold: f32,
    },
}

impl VectorProviderConfig {
    pub fn top_k(&self) -> usize {
        match self {
            VectorProviderConfig::Faiss { top_k, .. }
            | VectorProviderConfig::Pinecone { top_k, .. }
            | VectorProviderConfig::Chroma { top_k, .. } => *top_k,
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_dimension() -> usize {
    1536
}

fn default_index_path() -> String {
    "./data/faiss_index".to_string()
}

fn default_index_type() -> String {
    "flat-ip".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_chroma_port() -> u16 {
    8000
}

/// An immutable configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub id: String,
    pub llm: LlmProviderConfig,
    pub embedding: EmbeddingProviderConfig,
    pub vector: VectorProviderConfig,
    #[serde(default)]
    pub active: bool,
    pub owner: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl ConfigRecord {
    pub fn new(
        owner: impl Into<String>,
        llm: LlmProviderConfig,
        embedding: EmbeddingProviderConfig,
        vector: VectorProviderConfig,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            llm,
            embedding,
            vector,
            active: false,
            owner: owner.into(),
            created_at: Utc::now(),
        }
    }
}

/// Partial update applied by `ConfigCoordinator::update`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigPatch {
    pub llm: Option<LlmProviderConfig>,
    pub embedding: Option<EmbeddingProviderConfig>,
    pub vector: Option<VectorProviderConfig>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.llm.is_none() && self.embedding.is_none() && self.vector.is_none()
    }
}

/// Build the default configuration from environment variables.
///
/// Returns `None` when no OpenAI credential is present; queries then fail
/// with `NoActiveConfiguration` until the operator creates one.
pub fn default_config_from_env(
    env: &dyn Fn(&str) -> Option<String>,
    owner: &str,
) -> Option<ConfigRecord> {
    let api_key = env("OPENAI_API_KEY")?;

    let dimension = env("VECTOR_DIMENSION")
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(default_dimension);
    let top_k = env("VECTOR_TOP_K")
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(default_top_k);
    let threshold = env("VECTOR_THRESHOLD")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);

    let llm = LlmProviderConfig::OpenAi {
        api_key: api_key.clone(),
        model: env("OPENAI_MODEL").unwrap_or_else(default_llm_model),
        params: ChatParameters::default(),
    };
    let embedding = EmbeddingProviderConfig::OpenAi {
        api_key,
        model: env("OPENAI_EMBEDDING_MODEL").unwrap_or_else(default_embedding_model),
        dimension,
    };
    let vector = match env("VECTOR_PROVIDER").as_deref() {
        Some("pinecone") => VectorProviderConfig::Pinecone {
            api_key: env("PINECONE_API_KEY").unwrap_or_default(),
            environment: env("PINECONE_ENVIRONMENT").unwrap_or_default(),
            index_name: env("PINECONE_INDEX_NAME").unwrap_or_default(),
            dimension,
            top_k,
            threshold,
        },
        Some("chroma") => VectorProviderConfig::Chroma {
            host: env("CHROMA_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: env("CHROMA_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_chroma_port),
            collection_name: env("CHROMA_COLLECTION").unwrap_or_else(|| "ragserve".to_string()),
            ssl: false,
            dimension,
            top_k,
            threshold,
        },
        _ => VectorProviderConfig::Faiss {
            index_path: env("FAISS_INDEX_PATH").unwrap_or_else(default_index_path),
            index_type: env("FAISS_INDEX_TYPE").unwrap_or_else(default_index_type),
            dimension,
            top_k,
            threshold,
        },
    };

    Some(ConfigRecord::new(owner, llm, embedding, vector))
}
