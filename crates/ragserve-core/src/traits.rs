//! Core traits for ragserve components.
//!
//! This module defines the trait interfaces that the pluggable providers
//! implement:
//!
//! - [`EmbeddingProvider`]: Map text to fixed-dimension vectors
//! - [`VectorIndex`]: Durable nearest-neighbor store
//! - [`ChatModel`]: Unary and streamed chat completion
//! - [`DocumentRegistry`]: Document metadata, status, and chunk bookkeeping
//!
//! These traits enable a pluggable architecture where backends are selected
//! by a configuration tag and constructed by a small factory; nothing else
//! in the system knows which backend is running.

use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;

use crate::error::{EmbeddingError, LlmError, RegistryError, VectorStoreError};
use crate::types::{
    ChatMessage, ChatResponse, Document, EmbeddingOutput, SearchHit, StreamChunk, VectorRecord,
};

// ============================================================================
// Embedding
// ============================================================================

/// Trait for embedding providers.
///
/// Providers are stateless beyond their endpoint/credential binding. Inputs
/// exceeding the backend's per-request cap are partitioned internally; usage
/// is summed across sub-calls.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Embedding dimension D. Immutable for the life of an index.
    fn dimension(&self) -> usize;

    /// Embed many texts, in input order.
    async fn embed_many(&self, texts: &[String]) -> Result<EmbeddingOutput, EmbeddingError>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let texts = [text.to_string()];
        let output = self.embed_many(&texts).await?;
        output
            .vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding result".to_string()))
    }

    /// Probe the backend; false means unreachable or rejected.
    async fn test_connection(&self) -> bool;
}

// ============================================================================
// Vector index
// ============================================================================

/// Trait for the durable nearest-neighbor store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Bind to or create the underlying store; reload persisted state if any.
    async fn initialize(&self) -> Result<(), VectorStoreError>;

    /// Upsert records by id. Durable before this returns.
    async fn add_documents(&self, records: &[VectorRecord]) -> Result<(), VectorStoreError>;

    /// Return up to k nearest neighbors, sorted by non-increasing score.
    ///
    /// `k` is clamped to the current record count; an empty index returns an
    /// empty list. A configured similarity threshold filters low-score hits.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, VectorStoreError>;

    /// Remove matching records; non-existent ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<(), VectorStoreError>;

    /// Empty the index while preserving its identity and parameters.
    async fn clear(&self) -> Result<(), VectorStoreError>;

    /// Current record count.
    async fn count(&self) -> Result<usize, VectorStoreError>;

    /// Probe the backend; false means unreachable or rejected.
    async fn test_connection(&self) -> bool;
}

// ============================================================================
// Chat
// ============================================================================

/// A finite stream of completion frames, terminated by one `done` frame.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LlmError>> + Send>>;

/// Trait for language-model providers.
///
/// When `context` is non-empty the provider synthesizes a system prompt from
/// it; downstream messages are sent verbatim with their roles.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Unary chat completion.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        context: &[String],
    ) -> Result<ChatResponse, LlmError>;

    /// Token-streamed chat completion.
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        context: &[String],
    ) -> Result<ChatStream, LlmError>;

    /// Probe the backend; false means unreachable or rejected.
    async fn test_connection(&self) -> bool;
}

// ============================================================================
// Document registry
// ============================================================================

/// Trait for document bookkeeping.
///
/// The registry is the single source of truth for document counts and chunk
/// ids; status transitions are written by the document processor.
#[async_trait]
pub trait DocumentRegistry: Send + Sync {
    /// Fetch one document.
    async fn get(&self, id: &str) -> Result<Option<Document>, RegistryError>;

    /// List all documents, newest first.
    async fn list(&self) -> Result<Vec<Document>, RegistryError>;

    /// Insert a new document record.
    async fn create(&self, document: Document) -> Result<(), RegistryError>;

    /// Replace an existing document record.
    async fn update(&self, document: Document) -> Result<(), RegistryError>;

    /// Remove one document record.
    async fn delete(&self, id: &str) -> Result<(), RegistryError>;

    /// Remove all document records.
    async fn clear_all(&self) -> Result<(), RegistryError>;

    /// Number of registered documents.
    async fn count(&self) -> Result<usize, RegistryError> {
        Ok(self.list().await?.len())
    }
}
