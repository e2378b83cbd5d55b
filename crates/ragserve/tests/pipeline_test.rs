//! Integration tests for the full ragserve pipeline.
//!
//! Tests the complete flow against the real local vector index: extract →
//! chunk → embed → store → retrieve → answer. The embedder is a
//! deterministic bag-of-words mock so retrieval behaves semantically
//! without a network.

use async_trait::async_trait;
use futures_util::StreamExt;
use ragserve_core::{
    ChatMessage, ChatModel, ChatResponse, ChatStream, Document, DocumentRegistry, DocumentStatus,
    EmbeddingError, EmbeddingOutput, EmbeddingProvider, LlmError, ProcessOptions, StreamChunk,
    TokenUsage, VectorIndex,
};
use ragserve_extract::DocumentExtractor;
use ragserve_ingest::{BatchProcessor, DocumentProcessor, MemoryRegistry};
use ragserve_query::{QueryFrame, QueryOptions, RagPipeline};
use ragserve_store::LocalVectorIndex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const DIM: usize = 64;

/// Deterministic bag-of-words embedder: shared words produce similar
/// vectors, so retrieval ranks by lexical overlap.
struct BagOfWordsEmbedder;

impl BagOfWordsEmbedder {
    fn embed(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIM];
        for word in text.to_lowercase().split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if word.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() % DIM as u64) as usize] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in vector.iter_mut() {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed_many(&self, texts: &[String]) -> Result<EmbeddingOutput, EmbeddingError> {
        Ok(EmbeddingOutput {
            vectors: texts.iter().map(|t| Self::embed(t)).collect(),
            usage: None,
            model: Some("bag-of-words".to_string()),
        })
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

/// LLM that echoes how many context passages it was given.
struct EchoLlm;

#[async_trait]
impl ChatModel for EchoLlm {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        context: &[String],
    ) -> Result<ChatResponse, LlmError> {
        Ok(ChatResponse {
            content: format!("answered with {} passages", context.len()),
            usage: Some(TokenUsage {
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
            }),
            model: Some("echo".to_string()),
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn chat_stream(
        &self,
        _messages: &[ChatMessage],
        context: &[String],
    ) -> Result<ChatStream, LlmError> {
        let frames = vec![
            Ok(StreamChunk {
                content: Some(format!("streamed with {} passages", context.len())),
                done: false,
                usage: None,
            }),
            Ok(StreamChunk {
                content: None,
                done: true,
                usage: None,
            }),
        ];
        Ok(Box::pin(futures_util::stream::iter(frames)))
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

struct TestEngine {
    processor: Arc<DocumentProcessor>,
    registry: Arc<MemoryRegistry>,
    index: Arc<LocalVectorIndex>,
    pipeline: RagPipeline,
    _source_dir: tempfile::TempDir,
    _index_dir: tempfile::TempDir,
    source_path: std::path::PathBuf,
}

async fn engine() -> TestEngine {
    let source_dir = tempdir().unwrap();
    let index_dir = tempdir().unwrap();

    let registry = Arc::new(MemoryRegistry::new());
    let index = Arc::new(LocalVectorIndex::new(index_dir.path(), DIM));
    index.initialize().await.unwrap();
    let embedder = Arc::new(BagOfWordsEmbedder);

    let processor = Arc::new(DocumentProcessor::new(
        Arc::new(DocumentExtractor::new()),
        Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
        Arc::clone(&index) as Arc<dyn VectorIndex>,
        Arc::clone(&registry) as Arc<dyn DocumentRegistry>,
    ));

    let pipeline = RagPipeline::new(
        embedder,
        Arc::clone(&index) as Arc<dyn VectorIndex>,
        Arc::new(EchoLlm),
        QueryOptions {
            max_sources: 5,
            min_score: 0.1,
            context_window: 4000,
        },
    );

    let source_path = source_dir.path().to_path_buf();
    TestEngine {
        processor,
        registry,
        index,
        pipeline,
        _source_dir: source_dir,
        _index_dir: index_dir,
        source_path,
    }
}

async fn upload(engine: &TestEngine, name: &str, content: &str) -> Document {
    let path = engine.source_path.join(name);
    std::fs::write(&path, content).unwrap();
    let document = Document::new(name, path, content.len() as u64);
    engine.registry.create(document.clone()).await.unwrap();
    document
}

#[tokio::test]
async fn test_ingest_then_query_finds_relevant_document() {
    let e = engine().await;

    let notes = upload(
        &e,
        "notes.txt",
        "The quick brown fox jumps over the lazy dog. Foxes are cunning animals.",
    )
    .await;
    let db = upload(
        &e,
        "database.txt",
        "PostgreSQL and MySQL are relational database systems queried with SQL.",
    )
    .await;

    let outcome = BatchProcessor::new(Arc::clone(&e.processor))
        .process_files_sequentially(&[notes.clone(), db], &ProcessOptions::default(), None)
        .await;
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.failed, 0);

    let answer = e.pipeline.query("brown fox", &[]).await.unwrap();

    assert!(!answer.sources.is_empty());
    assert!(answer.sources[0].content.contains("brown fox"));
    assert_eq!(answer.sources[0].metadata.filename, "notes.txt");
    assert!(answer.sources[0].score >= 0.1);
    assert!(answer.sources[0].id.starts_with(&notes.id));
    assert!(answer.content.contains("passages"));
}

#[tokio::test]
async fn test_same_file_twice_gets_disjoint_chunk_ids() {
    let e = engine().await;

    let first = upload(&e, "dup1.txt", "Identical content about llamas and alpacas.").await;
    let second = upload(&e, "dup2.txt", "Identical content about llamas and alpacas.").await;

    e.processor
        .process(&first, &ProcessOptions::default())
        .await
        .unwrap();
    e.processor
        .process(&second, &ProcessOptions::default())
        .await
        .unwrap();

    // Two documents, disjoint chunk-id prefixes.
    assert_ne!(first.id, second.id);
    assert_eq!(e.index.count().await.unwrap(), 2);

    // Deleting one leaves the other fully searchable.
    e.processor.delete_document(&first.id).await.unwrap();
    let hits = e.pipeline.query("llamas alpacas", &[]).await.unwrap();
    assert_eq!(hits.sources.len(), 1);
    assert!(hits.sources[0].id.starts_with(&second.id));
}

#[tokio::test]
async fn test_empty_document_indexes_with_no_vectors() {
    let e = engine().await;
    let empty = upload(&e, "empty.txt", "").await;

    let chunks = e
        .processor
        .process(&empty, &ProcessOptions::default())
        .await
        .unwrap();

    assert!(chunks.is_empty());
    let stored = e.registry.get(&empty.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DocumentStatus::Indexed);
    assert_eq!(e.index.count().await.unwrap(), 0);

    // Queries over the empty index return no sources and still answer.
    let answer = e.pipeline.query("anything", &[]).await.unwrap();
    assert!(answer.sources.is_empty());
    assert_eq!(answer.content, "answered with 0 passages");
}

#[tokio::test]
async fn test_streaming_query_frame_protocol() {
    let e = engine().await;
    let doc = upload(&e, "facts.txt", "Gravity makes apples fall from trees.").await;
    e.processor
        .process(&doc, &ProcessOptions::default())
        .await
        .unwrap();

    let mut stream = e.pipeline.query_stream("apples gravity", &[]).await;
    let mut frames = Vec::new();
    while let Some(frame) = stream.next().await {
        frames.push(frame.unwrap());
    }

    assert!(matches!(&frames[0], QueryFrame::Sources(s) if !s.is_empty()));
    assert!(matches!(frames.last().unwrap(), QueryFrame::Done(_)));
    assert_eq!(
        frames
            .iter()
            .filter(|f| matches!(f, QueryFrame::Sources(_)))
            .count(),
        1
    );
    assert_eq!(
        frames
            .iter()
            .filter(|f| matches!(f, QueryFrame::Done(_)))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_reindex_is_idempotent_for_queries() {
    let e = engine().await;
    let doc = upload(&e, "stable.txt", "Reindexing should not change results.").await;
    e.processor
        .process(&doc, &ProcessOptions::default())
        .await
        .unwrap();

    e.processor
        .reindex(&[doc.clone()], &ProcessOptions::default())
        .await
        .unwrap();
    let first: Vec<String> = e
        .pipeline
        .query("reindexing results", &[])
        .await
        .unwrap()
        .sources
        .into_iter()
        .map(|h| h.id)
        .collect();

    e.processor
        .reindex(&[doc], &ProcessOptions::default())
        .await
        .unwrap();
    let second: Vec<String> = e
        .pipeline
        .query("reindexing results", &[])
        .await
        .unwrap()
        .sources
        .into_iter()
        .map(|h| h.id)
        .collect();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_index_survives_restart() {
    let source_dir = tempdir().unwrap();
    let index_dir = tempdir().unwrap();
    let registry = Arc::new(MemoryRegistry::new());
    let embedder = Arc::new(BagOfWordsEmbedder);

    let path = source_dir.path().join("persistent.txt");
    std::fs::write(&path, "Data that must survive a restart.").unwrap();
    let document = Document::new("persistent.txt", path, 10);
    registry.create(document.clone()).await.unwrap();

    {
        let index = Arc::new(LocalVectorIndex::new(index_dir.path(), DIM));
        index.initialize().await.unwrap();
        let processor = DocumentProcessor::new(
            Arc::new(DocumentExtractor::new()),
            Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
            index,
            Arc::clone(&registry) as Arc<dyn DocumentRegistry>,
        );
        processor
            .process(&document, &ProcessOptions::default())
            .await
            .unwrap();
    }

    // A fresh index instance over the same directory sees the vectors.
    let reopened = Arc::new(LocalVectorIndex::new(index_dir.path(), DIM));
    reopened.initialize().await.unwrap();
    assert!(reopened.count().await.unwrap() > 0);

    let query_vector = BagOfWordsEmbedder::embed("survive restart");
    let hits = reopened.search(&query_vector, 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].id.starts_with(&document.id));
}

#[tokio::test]
async fn test_sentence_boundary_chunking_end_to_end() {
    // Chunker behavior observed through the whole pipeline: small windows
    // cut at sentence terminators.
    let chunks = ragserve_chunker::split("The quick brown fox. Jumps over lazy dog. End.", 20, 5);
    assert_eq!(chunks[0].content, "The quick brown fox.");
    assert_eq!(chunks[0].end_char, 20);

    let e = engine().await;
    let doc = upload(&e, "fox.txt", "The quick brown fox. Jumps over lazy dog. End.").await;
    let options = ProcessOptions {
        chunk_size: 20,
        chunk_overlap: 5,
        extract_metadata: true,
    };
    let processed = e.processor.process(&doc, &options).await.unwrap();

    assert_eq!(processed[0].content, "The quick brown fox.");
    assert_eq!(processed[0].metadata.end_char, 20);
}

#[tokio::test]
async fn test_clear_all_resets_engine() {
    let e = engine().await;
    let doc = upload(&e, "gone.txt", "This content is about to vanish.").await;
    e.processor
        .process(&doc, &ProcessOptions::default())
        .await
        .unwrap();
    assert!(e.index.count().await.unwrap() > 0);

    e.processor.clear_all_documents().await.unwrap();

    assert_eq!(e.index.count().await.unwrap(), 0);
    assert_eq!(e.registry.count().await.unwrap(), 0);
    assert!(!Path::new(&doc.storage_path).exists());
}
