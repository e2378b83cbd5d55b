//! # ragserve-embed
//!
//! Embedding provider implementations for ragserve.
//!
//! Providers implement [`ragserve_core::EmbeddingProvider`]; the only wired
//! backend is the OpenAI `/embeddings` API (and compatible endpoints via
//! [`OpenAiEmbeddings::with_base_url`]). Batching, pacing, and usage
//! accounting live here so callers can hand over arbitrarily long input
//! lists.

pub mod openai;

pub use openai::OpenAiEmbeddings;
