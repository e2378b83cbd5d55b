//! The RAG query pipeline.

use futures_util::{Stream, StreamExt};
use ragserve_core::{
    ChatMessage, ChatModel, EmbeddingProvider, Error, SearchHit, TokenUsage, VectorIndex,
};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::context::assemble_context;

/// Retrieval knobs.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Maximum hits fetched from the index
    pub max_sources: usize,
    /// Minimum similarity score a hit must reach
    pub min_score: f32,
    /// Character budget for assembled context
    pub context_window: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_sources: 5,
            min_score: 0.5,
            context_window: 4000,
        }
    }
}

/// Unary query result.
#[derive(Debug, Clone)]
pub struct QueryAnswer {
    pub content: String,
    pub sources: Vec<SearchHit>,
    pub usage: Option<TokenUsage>,
}

/// One frame of a streamed query response.
#[derive(Debug, Clone)]
pub enum QueryFrame {
    /// Retrieved sources; always the first frame, sent exactly once.
    Sources(Vec<SearchHit>),
    /// A content delta.
    Content(String),
    /// Terminal frame, sent exactly once.
    Done(Option<TokenUsage>),
}

/// A framed query response stream.
pub type QueryStream = Pin<Box<dyn Stream<Item = Result<QueryFrame, Error>> + Send>>;

/// Embed → search → filter → assemble → complete.
pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    llm: Arc<dyn ChatModel>,
    options: QueryOptions,
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn ChatModel>,
        options: QueryOptions,
    ) -> Self {
        Self {
            embedder,
            index,
            llm,
            options,
        }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Retrieve the hits relevant to a question.
    async fn retrieve(&self, question: &str) -> Result<Vec<SearchHit>, Error> {
        let vector = self.embedder.embed_one(question).await?;
        let hits = self.index.search(&vector, self.options.max_sources).await?;

        let filtered: Vec<SearchHit> = hits
            .into_iter()
            .filter(|hit| hit.score >= self.options.min_score)
            .collect();

        debug!(sources = filtered.len(), "retrieved context");
        Ok(filtered)
    }

    fn build_messages(question: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(question));
        messages
    }

    /// Answer a question in one shot.
    pub async fn query(
        &self,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<QueryAnswer, Error> {
        let sources = self.retrieve(question).await?;
        let context = assemble_context(&sources, self.options.context_window);
        let messages = Self::build_messages(question, history);

        let response = self.llm.chat(&messages, &context).await?;

        Ok(QueryAnswer {
            content: response.content,
            sources,
            usage: response.usage,
        })
    }

    /// Answer a question as a framed stream.
    ///
    /// Exactly one [`QueryFrame::Sources`] frame precedes all content
    /// frames; exactly one [`QueryFrame::Done`] frame terminates the
    /// stream. Dropping the returned stream cancels the completion.
    pub async fn query_stream(
        &self,
        question: &str,
        history: &[ChatMessage],
    ) -> QueryStream {
        let embedder = Arc::clone(&self.embedder);
        let index = Arc::clone(&self.index);
        let llm = Arc::clone(&self.llm);
        let options = self.options.clone();
        let question = question.to_string();
        let history = history.to_vec();

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<QueryFrame, Error>>(32);

        tokio::spawn(async move {
            let sources = async {
                let vector = embedder.embed_one(&question).await?;
                let hits = index.search(&vector, options.max_sources).await?;
                Ok::<_, Error>(
                    hits.into_iter()
                        .filter(|hit| hit.score >= options.min_score)
                        .collect::<Vec<_>>(),
                )
            }
            .await;

            let sources = match sources {
                Ok(sources) => sources,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            if tx
                .send(Ok(QueryFrame::Sources(sources.clone())))
                .await
                .is_err()
            {
                return;
            }

            let context = assemble_context(&sources, options.context_window);
            let messages = Self::build_messages(&question, &history);

            let mut stream = match llm.chat_stream(&messages, &context).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            };

            while let Some(item) = stream.next().await {
                match item {
                    Ok(chunk) => {
                        if chunk.done {
                            let _ = tx.send(Ok(QueryFrame::Done(chunk.usage))).await;
                            return;
                        }
                        if let Some(content) = chunk.content {
                            if tx.send(Ok(QueryFrame::Content(content))).await.is_err() {
                                // Receiver dropped: cancel the completion.
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    }
                }
            }

            // Upstream ended without a done frame; terminate properly anyway.
            let _ = tx.send(Ok(QueryFrame::Done(None))).await;
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragserve_core::{
        ChatResponse, ChatStream, ChunkMetadata, EmbeddingError, EmbeddingOutput, LlmError,
        StreamChunk, VectorStoreError,
    };
    use std::sync::Mutex;

    const DIM: usize = 4;

    // ==================== Mocks ====================

    struct MockEmbedder;

    #[async_trait]
    impl EmbeddingProvider for MockEmbedder {
        fn model_name(&self) -> &str {
            "mock"
        }

        fn dimension(&self) -> usize {
            DIM
        }

        async fn embed_many(&self, texts: &[String]) -> Result<EmbeddingOutput, EmbeddingError> {
            Ok(EmbeddingOutput {
                vectors: texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect(),
                usage: None,
                model: None,
            })
        }

        async fn test_connection(&self) -> bool {
            true
        }
    }

    struct MockIndex {
        hits: Vec<SearchHit>,
    }

    #[async_trait]
    impl VectorIndex for MockIndex {
        async fn initialize(&self) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn add_documents(
            &self,
            _records: &[ragserve_core::VectorRecord],
        ) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn search(
            &self,
            _query: &[f32],
            k: usize,
        ) -> Result<Vec<SearchHit>, VectorStoreError> {
            Ok(self.hits.iter().take(k).cloned().collect())
        }

        async fn delete(&self, _ids: &[String]) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn clear(&self) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn count(&self) -> Result<usize, VectorStoreError> {
            Ok(self.hits.len())
        }

        async fn test_connection(&self) -> bool {
            true
        }
    }

    struct MockLlm {
        reply: String,
        seen: Mutex<Option<(Vec<ChatMessage>, Vec<String>)>>,
    }

    impl MockLlm {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ChatModel for MockLlm {
        fn model_name(&self) -> &str {
            "mock-llm"
        }

        async fn chat(
            &self,
            messages: &[ChatMessage],
            context: &[String],
        ) -> Result<ChatResponse, LlmError> {
            *self.seen.lock().unwrap() = Some((messages.to_vec(), context.to_vec()));
            Ok(ChatResponse {
                content: self.reply.clone(),
                usage: Some(TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                model: Some("mock-llm".to_string()),
                finish_reason: Some("stop".to_string()),
            })
        }

        async fn chat_stream(
            &self,
            messages: &[ChatMessage],
            context: &[String],
        ) -> Result<ChatStream, LlmError> {
            *self.seen.lock().unwrap() = Some((messages.to_vec(), context.to_vec()));
            let frames: Vec<Result<StreamChunk, LlmError>> = self
                .reply
                .split_whitespace()
                .map(|word| {
                    Ok(StreamChunk {
                        content: Some(format!("{word} ")),
                        done: false,
                        usage: None,
                    })
                })
                .chain(std::iter::once(Ok(StreamChunk {
                    content: None,
                    done: true,
                    usage: Some(TokenUsage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                        total_tokens: 15,
                    }),
                })))
                .collect();
            Ok(Box::pin(futures_util::stream::iter(frames)))
        }

        async fn test_connection(&self) -> bool {
            true
        }
    }

    fn hit(id: &str, score: f32) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            content: format!("content of {id}"),
            score,
            metadata: ChunkMetadata {
                document_id: "d1".to_string(),
                filename: "notes.txt".to_string(),
                chunk_index: 0,
                start_char: 0,
                end_char: 10,
            },
        }
    }

    fn pipeline(hits: Vec<SearchHit>, llm: Arc<MockLlm>) -> RagPipeline {
        RagPipeline::new(
            Arc::new(MockEmbedder),
            Arc::new(MockIndex { hits }),
            llm,
            QueryOptions::default(),
        )
    }

    // ==================== Unary tests ====================

    #[tokio::test]
    async fn test_query_returns_answer_and_sources() {
        let llm = Arc::new(MockLlm::new("the answer"));
        let p = pipeline(vec![hit("a", 0.9), hit("b", 0.8)], Arc::clone(&llm));

        let answer = p.query("what?", &[]).await.unwrap();

        assert_eq!(answer.content, "the answer");
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].id, "a");
        assert_eq!(answer.sources[0].metadata.filename, "notes.txt");
        assert_eq!(answer.usage.unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn test_low_score_hits_filtered_out() {
        let llm = Arc::new(MockLlm::new("filtered"));
        let p = pipeline(vec![hit("good", 0.7), hit("bad", 0.3)], Arc::clone(&llm));

        let answer = p.query("q", &[]).await.unwrap();

        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].id, "good");

        // Context carries only the surviving hit.
        let (_, context) = llm.seen.lock().unwrap().clone().unwrap();
        assert_eq!(context, vec!["content of good"]);
    }

    #[tokio::test]
    async fn test_empty_index_prompts_with_no_context() {
        let llm = Arc::new(MockLlm::new("no docs"));
        let p = pipeline(vec![], Arc::clone(&llm));

        let answer = p.query("q", &[]).await.unwrap();

        assert!(answer.sources.is_empty());
        let (_, context) = llm.seen.lock().unwrap().clone().unwrap();
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn test_history_precedes_question() {
        let llm = Arc::new(MockLlm::new("ok"));
        let p = pipeline(vec![], Arc::clone(&llm));

        let history = vec![
            ChatMessage::user("earlier question"),
            ChatMessage::assistant("earlier answer"),
        ];
        p.query("new question", &history).await.unwrap();

        let (messages, _) = llm.seen.lock().unwrap().clone().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "earlier question");
        assert_eq!(messages[2].content, "new question");
    }

    // ==================== Streaming tests ====================

    #[tokio::test]
    async fn test_stream_frame_ordering() {
        let llm = Arc::new(MockLlm::new("alpha beta"));
        let p = pipeline(vec![hit("a", 0.9)], llm);

        let mut stream = p.query_stream("q", &[]).await;
        let mut frames = Vec::new();
        while let Some(frame) = stream.next().await {
            frames.push(frame.unwrap());
        }

        // Exactly one sources frame first, exactly one done frame last.
        assert!(matches!(&frames[0], QueryFrame::Sources(s) if s.len() == 1));
        assert!(matches!(frames.last().unwrap(), QueryFrame::Done(_)));

        let sources_frames = frames
            .iter()
            .filter(|f| matches!(f, QueryFrame::Sources(_)))
            .count();
        let done_frames = frames
            .iter()
            .filter(|f| matches!(f, QueryFrame::Done(_)))
            .count();
        assert_eq!(sources_frames, 1);
        assert_eq!(done_frames, 1);

        let content: String = frames
            .iter()
            .filter_map(|f| match f {
                QueryFrame::Content(c) => Some(c.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(content.trim(), "alpha beta");
    }

    #[tokio::test]
    async fn test_stream_with_no_documents_sends_empty_sources() {
        let llm = Arc::new(MockLlm::new("still answers"));
        let p = pipeline(vec![], llm);

        let mut stream = p.query_stream("q", &[]).await;
        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first, QueryFrame::Sources(s) if s.is_empty()));

        let mut saw_done = false;
        while let Some(frame) = stream.next().await {
            if matches!(frame.unwrap(), QueryFrame::Done(_)) {
                saw_done = true;
            }
        }
        assert!(saw_done);
    }

    #[tokio::test]
    async fn test_stream_done_carries_usage() {
        let llm = Arc::new(MockLlm::new("x"));
        let p = pipeline(vec![], llm);

        let mut stream = p.query_stream("q", &[]).await;
        let mut usage = None;
        while let Some(frame) = stream.next().await {
            if let QueryFrame::Done(u) = frame.unwrap() {
                usage = u;
            }
        }
        assert_eq!(usage.unwrap().completion_tokens, 5);
    }

    #[tokio::test]
    async fn test_dropping_stream_early_does_not_panic() {
        let llm = Arc::new(MockLlm::new("one two three four five"));
        let p = pipeline(vec![hit("a", 0.9)], llm);

        let mut stream = p.query_stream("q", &[]).await;
        let _ = stream.next().await;
        drop(stream);
        // Give the producer task a tick to observe the closed channel.
        tokio::task::yield_now().await;
    }
}
