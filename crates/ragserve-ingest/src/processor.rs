//! Per-document processing pipeline.
//!
//! Orchestrates extract → chunk → embed → store for one document, with
//! intra-document parallelism: embedding batches of 20 chunks and storage
//! batches of 50 records each fan out concurrently. The registry is updated
//! through every status transition, and its chunk-id list is the source of
//! truth for later deletes.

use chrono::Utc;
use futures_util::future::{join_all, try_join_all};
use ragserve_core::{
    chunk_id, ChunkMetadata, ChunkSummary, Document, DocumentRegistry, DocumentStatus,
    EmbeddingProvider, ProcessOptions, ProcessedChunk, ProcessingError, VectorIndex,
};
use ragserve_extract::DocumentExtractor;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Chunks per embedding request batch.
const EMBED_BATCH: usize = 20;

/// Records per storage upsert batch.
const STORE_BATCH: usize = 50;

/// Orchestrates the ingest pipeline for single documents.
pub struct DocumentProcessor {
    extractor: Arc<DocumentExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    registry: Arc<dyn DocumentRegistry>,
}

impl DocumentProcessor {
    pub fn new(
        extractor: Arc<DocumentExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        registry: Arc<dyn DocumentRegistry>,
    ) -> Self {
        Self {
            extractor,
            embedder,
            index,
            registry,
        }
    }

    /// Process one document end to end.
    ///
    /// Advances the registry entry Pending→Processing→Indexed, or →Error
    /// with the underlying message recorded. Returns only after every
    /// produced vector is durably stored.
    pub async fn process(
        &self,
        document: &Document,
        options: &ProcessOptions,
    ) -> Result<Vec<ProcessedChunk>, ProcessingError> {
        let mut record = document.clone();
        record.status = DocumentStatus::Processing;
        record.error_message = None;
        self.registry.update(record.clone()).await?;

        match self.run_pipeline(&record, options).await {
            Ok(chunks) => {
                record.status = DocumentStatus::Indexed;
                record.processed_at = Some(Utc::now());
                record.chunks = chunks
                    .iter()
                    .map(|c| ChunkSummary {
                        id: c.id.clone(),
                        content: c.content.clone(),
                        start_char: c.metadata.start_char,
                        end_char: c.metadata.end_char,
                    })
                    .collect();
                self.registry.update(record).await?;

                info!(
                    document = %document.id,
                    chunks = chunks.len(),
                    "document indexed"
                );
                Ok(chunks)
            }
            Err(e) => {
                error!(document = %document.id, error = %e, "processing failed");
                record.status = DocumentStatus::Error;
                record.processed_at = Some(Utc::now());
                record.error_message = Some(e.to_string());
                self.registry.update(record).await?;
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        document: &Document,
        options: &ProcessOptions,
    ) -> Result<Vec<ProcessedChunk>, ProcessingError> {
        let text = self
            .extractor
            .extract(&document.storage_path, &document.extension)
            .await?;

        let chunks: Vec<_> =
            ragserve_chunker::split(&text, options.chunk_size, options.chunk_overlap)
                .into_iter()
                .filter(|c| !c.content.is_empty())
                .collect();

        // An empty document indexes cleanly with zero chunks: no embedding
        // calls, no vector writes.
        if chunks.is_empty() {
            debug!(document = %document.id, "no content, indexing empty");
            return Ok(Vec::new());
        }

        // Embedding batches fan out concurrently; each backend request is
        // already capped inside the provider.
        let batches: Vec<_> = chunks.chunks(EMBED_BATCH).enumerate().collect();
        let embedded = try_join_all(batches.into_iter().map(|(batch_index, batch)| {
            let embedder = Arc::clone(&self.embedder);
            async move {
                let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
                let output = embedder.embed_many(&texts).await?;
                if output.vectors.len() != batch.len() {
                    return Err(ragserve_core::EmbeddingError::InvalidResponse(format!(
                        "expected {} vectors, got {}",
                        batch.len(),
                        output.vectors.len()
                    )));
                }
                Ok::<_, ragserve_core::EmbeddingError>((batch_index, batch, output.vectors))
            }
        }))
        .await?;

        // try_join_all preserves input order, so batches come back aligned
        // with their indices.
        let mut records: Vec<ProcessedChunk> = Vec::with_capacity(chunks.len());
        for (batch_index, batch, vectors) in embedded {
            for (i, (chunk, embedding)) in batch.iter().zip(vectors).enumerate() {
                let index = batch_index * EMBED_BATCH + i;
                let metadata = if options.extract_metadata {
                    ChunkMetadata {
                        document_id: document.id.clone(),
                        filename: document.filename.clone(),
                        chunk_index: index,
                        start_char: chunk.start_char,
                        end_char: chunk.end_char,
                    }
                } else {
                    ChunkMetadata::default()
                };
                records.push(ProcessedChunk {
                    id: chunk_id(&document.id, index),
                    content: chunk.content.clone(),
                    embedding,
                    metadata,
                });
            }
        }

        // Storage batches fan out concurrently as well; each add_documents
        // call is atomic from our perspective.
        try_join_all(records.chunks(STORE_BATCH).map(|batch| {
            let index = Arc::clone(&self.index);
            async move { index.add_documents(batch).await }
        }))
        .await?;

        Ok(records)
    }

    /// Clear the index, then re-process the given documents concurrently.
    pub async fn reindex(
        &self,
        documents: &[Document],
        options: &ProcessOptions,
    ) -> Result<(), ProcessingError> {
        self.index.clear().await?;

        let results = join_all(
            documents
                .iter()
                .map(|document| self.process(document, options)),
        )
        .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(failed, total = documents.len(), "reindex completed with failures");
        }
        Ok(())
    }

    /// Remove every chunk belonging to a document from the vector index.
    ///
    /// Chunk ids come from the registry entry, never from guessing id
    /// ranges.
    pub async fn delete_document_chunks(
        &self,
        document_id: &str,
    ) -> Result<usize, ProcessingError> {
        let Some(document) = self.registry.get(document_id).await? else {
            return Ok(0);
        };

        let ids = document.chunk_ids();
        if !ids.is_empty() {
            self.index.delete(&ids).await?;
        }
        Ok(ids.len())
    }

    /// Delete a document entirely: vectors, registry entry, and stored file.
    pub async fn delete_document(&self, document_id: &str) -> Result<(), ProcessingError> {
        let Some(document) = self.registry.get(document_id).await? else {
            return Ok(());
        };

        let ids = document.chunk_ids();
        if !ids.is_empty() {
            self.index.delete(&ids).await?;
        }
        self.registry.delete(document_id).await?;

        if let Err(e) = tokio::fs::remove_file(&document.storage_path).await {
            warn!(
                path = %document.storage_path.display(),
                error = %e,
                "could not remove uploaded file"
            );
        }
        Ok(())
    }

    /// Drop everything: the vector index, all registry entries, and the
    /// uploaded files (best-effort).
    pub async fn clear_all_documents(&self) -> Result<(), ProcessingError> {
        let documents = self.registry.list().await?;

        self.index.clear().await?;
        self.registry.clear_all().await?;

        for document in documents {
            if let Err(e) = tokio::fs::remove_file(&document.storage_path).await {
                warn!(
                    path = %document.storage_path.display(),
                    error = %e,
                    "could not remove uploaded file"
                );
            }
        }
        Ok(())
    }

    pub fn registry(&self) -> Arc<dyn DocumentRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn index(&self) -> Arc<dyn VectorIndex> {
        Arc::clone(&self.index)
    }
}
