//! # ragserve-ingest
//!
//! The ingest side of ragserve: per-document processing
//! ([`DocumentProcessor`]), sequential multi-document ingest
//! ([`BatchProcessor`]), and the in-memory reference
//! [`MemoryRegistry`].
//!
//! The processor owns every document status transition
//! (Pending→Processing→{Indexed|Error}) and guarantees that `process`
//! returns only after all of the document's vectors are durably stored.

pub mod batch;
pub mod processor;
pub mod registry;

pub use batch::{BatchProcessor, ProgressFn};
pub use processor::DocumentProcessor;
pub use registry::MemoryRegistry;
