//! Provider construction from configuration variants.
//!
//! Construction is a small factory keyed on the tagged variant. Backends
//! compiled out of the build fail with a clear error naming the missing
//! backend rather than a link error.

use ragserve_core::{ChatModel, ConfigurationError, EmbeddingProvider, VectorIndex};
use ragserve_embed::OpenAiEmbeddings;
use ragserve_llm::{AnthropicChat, OpenAiChat};
use ragserve_store::{IndexKind, LocalVectorIndex};
use std::sync::Arc;
use tracing::warn;

use crate::snapshot::{EmbeddingProviderConfig, LlmProviderConfig, VectorProviderConfig};

/// Builds live providers from configuration variants.
///
/// A trait so the coordinator can be exercised with mock providers in
/// tests; production uses [`DefaultProviderFactory`].
pub trait ProviderFactory: Send + Sync {
    fn build_llm(
        &self,
        config: &LlmProviderConfig,
    ) -> Result<Arc<dyn ChatModel>, ConfigurationError>;

    fn build_embedding(
        &self,
        config: &EmbeddingProviderConfig,
    ) -> Result<Arc<dyn EmbeddingProvider>, ConfigurationError>;

    fn build_vector(
        &self,
        config: &VectorProviderConfig,
    ) -> Result<Arc<dyn VectorIndex>, ConfigurationError>;
}

/// The production factory.
pub struct DefaultProviderFactory;

impl ProviderFactory for DefaultProviderFactory {
    fn build_llm(
        &self,
        config: &LlmProviderConfig,
    ) -> Result<Arc<dyn ChatModel>, ConfigurationError> {
        match config {
            LlmProviderConfig::OpenAi {
                api_key,
                model,
                params,
            } => {
                let provider = OpenAiChat::openai(api_key, model, params.clone())
                    .map_err(|e| ConfigurationError::Validation(e.to_string()))?;
                Ok(Arc::new(provider))
            }
            LlmProviderConfig::AzureOpenAi {
                api_key,
                endpoint,
                deployment_name,
                api_version,
                params,
            } => {
                let provider = OpenAiChat::azure(
                    endpoint,
                    deployment_name,
                    api_version,
                    api_key,
                    params.clone(),
                )
                .map_err(|e| ConfigurationError::Validation(e.to_string()))?;
                Ok(Arc::new(provider))
            }
            LlmProviderConfig::Anthropic {
                api_key,
                model,
                params,
            } => {
                let provider = AnthropicChat::new(api_key, model, params.clone())
                    .map_err(|e| ConfigurationError::Validation(e.to_string()))?;
                Ok(Arc::new(provider))
            }
        }
    }

    fn build_embedding(
        &self,
        config: &EmbeddingProviderConfig,
    ) -> Result<Arc<dyn EmbeddingProvider>, ConfigurationError> {
        match config {
            EmbeddingProviderConfig::OpenAi {
                api_key,
                model,
                dimension,
            } => {
                let provider = OpenAiEmbeddings::new(api_key, model, *dimension)
                    .map_err(|e| ConfigurationError::Validation(e.to_string()))?;
                Ok(Arc::new(provider))
            }
        }
    }

    fn build_vector(
        &self,
        config: &VectorProviderConfig,
    ) -> Result<Arc<dyn VectorIndex>, ConfigurationError> {
        match config {
            VectorProviderConfig::Faiss {
                index_path,
                index_type,
                dimension,
                threshold,
                ..
            } => {
                let kind = IndexKind::parse(index_type).unwrap_or_else(|| {
                    warn!(index_type, "unknown index type, using flat-ip");
                    IndexKind::FlatIp
                });
                let index = LocalVectorIndex::new(index_path, *dimension)
                    .with_threshold(*threshold)
                    .with_index_kind(kind);
                Ok(Arc::new(index))
            }
            #[cfg(feature = "pinecone")]
            VectorProviderConfig::Pinecone {
                api_key,
                environment,
                index_name,
                threshold,
                ..
            } => {
                let index = ragserve_store::PineconeIndex::new(api_key, environment, index_name)
                    .map_err(|e| ConfigurationError::Validation(e.to_string()))?
                    .with_threshold(*threshold);
                Ok(Arc::new(index))
            }
            #[cfg(not(feature = "pinecone"))]
            VectorProviderConfig::Pinecone { .. } => {
                Err(ConfigurationError::MissingBackend("pinecone".to_string()))
            }
            #[cfg(feature = "chroma")]
            VectorProviderConfig::Chroma {
                host,
                port,
                collection_name,
                ssl,
                threshold,
                ..
            } => {
                let index = ragserve_store::ChromaIndex::new(host, *port, collection_name, *ssl)
                    .map_err(|e| ConfigurationError::Validation(e.to_string()))?
                    .with_threshold(*threshold);
                Ok(Arc::new(index))
            }
            #[cfg(not(feature = "chroma"))]
            VectorProviderConfig::Chroma { .. } => {
                Err(ConfigurationError::MissingBackend("chroma".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragserve_core::ChatParameters;

    #[test]
    fn test_build_openai_llm() {
        let config = LlmProviderConfig::OpenAi {
            api_key: "sk-x".to_string(),
            model: "gpt-4o".to_string(),
            params: ChatParameters::default(),
        };
        let provider = DefaultProviderFactory.build_llm(&config).unwrap();
        assert_eq!(provider.model_name(), "gpt-4o");
    }

    #[test]
    fn test_build_anthropic_llm() {
        let config = LlmProviderConfig::Anthropic {
            api_key: "sk-ant".to_string(),
            model: "claude-3-5-sonnet-latest".to_string(),
            params: ChatParameters::default(),
        };
        let provider = DefaultProviderFactory.build_llm(&config).unwrap();
        assert_eq!(provider.model_name(), "claude-3-5-sonnet-latest");
    }

    #[test]
    fn test_build_embedding() {
        let config = EmbeddingProviderConfig::OpenAi {
            api_key: "sk-x".to_string(),
            model: "text-embedding-ada-002".to_string(),
            dimension: 1536,
        };
        let provider = DefaultProviderFactory.build_embedding(&config).unwrap();
        assert_eq!(provider.dimension(), 1536);
    }

    #[test]
    fn test_build_local_vector_index() {
        let config = VectorProviderConfig::Faiss {
            index_path: "/tmp/ragserve-test-idx".to_string(),
            index_type: "hnsw-flat".to_string(),
            dimension: 1536,
            top_k: 5,
            threshold: 0.5,
        };
        // hnsw-flat downgrades to flat-ip with a warning; construction
        // succeeds either way.
        assert!(DefaultProviderFactory.build_vector(&config).is_ok());
    }

    #[cfg(feature = "pinecone")]
    #[test]
    fn test_build_pinecone_when_enabled() {
        let config = VectorProviderConfig::Pinecone {
            api_key: "key".to_string(),
            environment: "us-east1-gcp".to_string(),
            index_name: "rag".to_string(),
            dimension: 1536,
            top_k: 5,
            threshold: 0.0,
        };
        assert!(DefaultProviderFactory.build_vector(&config).is_ok());
    }
}
