//! # ragserve-query
//!
//! The RAG query pipeline: embed the question, search the vector index,
//! filter and assemble context under a character budget, and prompt the
//! language model, either unary ([`RagPipeline::query`]) or streamed
//! ([`RagPipeline::query_stream`]).
//!
//! Streamed responses are framed: exactly one [`QueryFrame::Sources`] frame
//! precedes all content, and exactly one [`QueryFrame::Done`] terminates the
//! stream. Dropping the stream cancels the underlying completion promptly.

pub mod context;
pub mod pipeline;

pub use context::assemble_context;
pub use pipeline::{QueryAnswer, QueryFrame, QueryOptions, QueryStream, RagPipeline};
