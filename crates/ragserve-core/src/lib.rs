//! # ragserve-core
//!
//! Core types and traits for the ragserve Retrieval-Augmented Generation
//! engine.
//!
//! This crate provides the foundational abstractions used throughout
//! ragserve:
//!
//! - **Embedding**: [`EmbeddingProvider`] trait for mapping text to dense
//!   vectors
//! - **Vector storage**: [`VectorIndex`] trait for the durable
//!   nearest-neighbor store
//! - **Chat completion**: [`ChatModel`] trait for unary and streamed
//!   language-model responses
//! - **Bookkeeping**: [`DocumentRegistry`] trait mapping document identity to
//!   metadata, status, and chunk summary
//!
//! ## Architecture
//!
//! The crate is organized around two pipelines:
//!
//! ```text
//! Ingest:  file → extract → chunk → EmbeddingProvider → VectorIndex
//! Query:   question → EmbeddingProvider → VectorIndex → ChatModel → answer
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Document`] | Registry entry for an uploaded document |
//! | [`TextChunk`] | A windowed slice of extracted text |
//! | [`VectorRecord`] | A chunk with its embedding, as stored in the index |
//! | [`SearchHit`] | A matching record with similarity score |
//! | [`ChatMessage`] / [`StreamChunk`] | Language-model request and response frames |
//!
//! ## Related Crates
//!
//! - `ragserve-extract`: document text extraction with OCR fallback
//! - `ragserve-chunker`: sliding-window chunking
//! - `ragserve-embed`: embedding provider implementations
//! - `ragserve-store`: vector index implementations
//! - `ragserve-llm`: language-model provider implementations
//! - `ragserve-ingest`: document and batch processors
//! - `ragserve-query`: the RAG query pipeline
//! - `ragserve-config`: configuration snapshots and the provider factory

pub mod error;
pub mod language;
pub mod traits;
pub mod types;

pub use error::{
    ConfigurationError, EmbeddingError, Error, ExtractionError, LlmError, ProcessingError,
    RegistryError, Result, VectorStoreError,
};
pub use language::{detect_language, Language, LanguageDistribution};
pub use traits::*;
pub use types::*;
