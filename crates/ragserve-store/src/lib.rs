//! # ragserve-store
//!
//! Vector index implementations for ragserve.
//!
//! All backends implement [`ragserve_core::VectorIndex`]:
//!
//! - [`LocalVectorIndex`]: file-backed flat inner-product index
//!   (`index.bin` + `documents.json`, atomic writes)
//! - [`PineconeIndex`]: Pinecone HTTP backend (feature `pinecone`)
//! - [`ChromaIndex`]: Chroma HTTP backend (feature `chroma`)
//!
//! Remote backends may be compiled out; the configuration factory reports a
//! clear error naming the missing backend rather than a link failure.

pub mod codec;
pub mod local;

#[cfg(feature = "chroma")]
pub mod chroma;
#[cfg(feature = "pinecone")]
pub mod pinecone;

pub use local::{IndexKind, LocalVectorIndex};

#[cfg(feature = "chroma")]
pub use chroma::ChromaIndex;
#[cfg(feature = "pinecone")]
pub use pinecone::PineconeIndex;
