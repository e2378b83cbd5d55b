//! Core types for ragserve.
//!
//! This module contains all shared data structures used across ragserve:
//!
//! ## Document Bookkeeping
//! - [`Document`]: Registry entry for an uploaded document
//! - [`DocumentStatus`]: Lifecycle state of a document
//! - [`ChunkSummary`]: Per-chunk summary stored on the registry entry
//!
//! ## Chunks and Vectors
//! - [`TextChunk`]: Output of the chunker, with char offsets and language
//! - [`VectorRecord`]: A chunk with its embedding, as stored in the index
//! - [`ChunkMetadata`]: Provenance metadata carried by every record
//! - [`SearchHit`]: A matching record with similarity score
//!
//! ## Embeddings
//! - [`EmbeddingOutput`]: Vectors plus usage accounting for one request
//!
//! ## Chat
//! - [`ChatMessage`], [`ChatRole`]: Language-model conversation turns
//! - [`ChatResponse`]: Unary completion result
//! - [`StreamChunk`]: One frame of a streamed completion
//! - [`TokenUsage`]: Token accounting reported by a backend
//!
//! ## Processing
//! - [`ProcessOptions`]: Per-document processing knobs
//! - [`ProcessedChunk`]: A chunk paired with its embedding, ready to store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::language::Language;

// ============================================================================
// Documents
// ============================================================================

/// Registry entry for an uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Opaque document identifier
    pub id: String,
    /// Original filename as uploaded
    pub filename: String,
    /// Lowercased file extension without the dot
    pub extension: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Where the uploaded file lives on disk
    pub storage_path: PathBuf,
    /// Current lifecycle state
    pub status: DocumentStatus,
    /// Upload timestamp
    pub uploaded_at: DateTime<Utc>,
    /// When processing finished (None until Indexed or Error)
    pub processed_at: Option<DateTime<Utc>>,
    /// Per-chunk summary, written when the document reaches Indexed
    #[serde(default)]
    pub chunks: Vec<ChunkSummary>,
    /// Error message if status is Error
    pub error_message: Option<String>,
}

impl Document {
    /// Create a fresh Pending document for an uploaded file.
    pub fn new(filename: impl Into<String>, storage_path: PathBuf, size_bytes: u64) -> Self {
        let filename = filename.into();
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filename,
            extension,
            size_bytes,
            storage_path,
            status: DocumentStatus::Pending,
            uploaded_at: Utc::now(),
            processed_at: None,
            chunks: Vec::new(),
            error_message: None,
        }
    }

    /// Ids of the chunks recorded for this document.
    pub fn chunk_ids(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.id.clone()).collect()
    }
}

/// Document lifecycle state.
///
/// Created Pending on upload, advanced to Processing by the document
/// processor, then to Indexed on success or Error on failure. Immutable once
/// Indexed except by reindex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Indexed,
    Error,
}

/// Per-chunk summary stored on the registry entry.
///
/// The registry copy of chunk ids is authoritative for deletes: removing a
/// document removes exactly these ids from the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSummary {
    /// Chunk id, `<documentId>_chunk_<index>`
    pub id: String,
    /// Chunk text
    pub content: String,
    /// Start char offset in the extracted text (inclusive)
    pub start_char: usize,
    /// End char offset in the extracted text (exclusive)
    pub end_char: usize,
}

// ============================================================================
// Chunks
// ============================================================================

/// A windowed slice of extracted text, produced by the chunker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Chunk text, trimmed
    pub content: String,
    /// Start char offset in the source text (inclusive)
    pub start_char: usize,
    /// End char offset in the source text (exclusive)
    pub end_char: usize,
    /// Detected language of this chunk (may differ from the document's)
    pub language: Language,
}

/// Provenance metadata carried by every vector record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Owning document id
    #[serde(rename = "documentId")]
    pub document_id: String,
    /// Original filename of the owning document
    pub filename: String,
    /// Zero-based chunk index within the document
    #[serde(rename = "chunkIndex")]
    pub chunk_index: usize,
    /// Start char offset in the extracted text
    #[serde(rename = "startChar")]
    pub start_char: usize,
    /// End char offset in the extracted text
    #[serde(rename = "endChar")]
    pub end_char: usize,
}

/// A record as stored in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Globally unique id, `<documentId>_chunk_<index>`
    pub id: String,
    /// Chunk text
    pub content: String,
    /// Embedding, length D for the owning index
    pub embedding: Vec<f32>,
    /// Provenance metadata
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

/// A chunk paired with its embedding, ready for storage.
///
/// Same shape as [`VectorRecord`]; named separately because it is the output
/// contract of the document processor.
pub type ProcessedChunk = VectorRecord;

/// A search result from the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Record id
    pub id: String,
    /// Record text
    pub content: String,
    /// Similarity score in [0, 1], 1 = most similar
    pub score: f32,
    /// Provenance metadata
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

// ============================================================================
// Embeddings
// ============================================================================

/// Output of one embedding request, possibly spanning several backend calls.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    /// One vector per input text, in input order
    pub vectors: Vec<Vec<f32>>,
    /// Summed usage across backend sub-calls, if reported
    pub usage: Option<TokenUsage>,
    /// Backend model identifier, if reported
    pub model: Option<String>,
}

// ============================================================================
// Chat
// ============================================================================

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Token accounting reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Accumulate usage from another call.
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Result of a unary chat completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
    pub model: Option<String>,
    pub finish_reason: Option<String>,
}

/// One frame of a streamed chat completion.
///
/// The stream is finite and terminated by exactly one frame with
/// `done = true`, which carries the final usage when the backend reports it.
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    /// Content delta, if any
    pub content: Option<String>,
    /// Terminal frame marker
    pub done: bool,
    /// Final usage, only on the terminal frame
    pub usage: Option<TokenUsage>,
}

/// Sampling parameters shared by the language-model providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatParameters {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    1.0
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for ChatParameters {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            stop: None,
        }
    }
}

// ============================================================================
// Processing
// ============================================================================

/// Per-document processing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Target chunk size in chars
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in chars
    pub chunk_overlap: usize,
    /// Attach provenance metadata to each record
    pub extract_metadata: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            extract_metadata: true,
        }
    }
}

/// Outcome of a sequential batch ingest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Documents that reached Indexed
    pub processed: usize,
    /// Documents that ended in Error
    pub failed: usize,
}

/// Chunk id for a document and index, `<documentId>_chunk_<index>`.
pub fn chunk_id(document_id: &str, index: usize) -> String {
    format!("{document_id}_chunk_{index}")
}
