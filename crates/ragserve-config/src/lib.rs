//! # ragserve-config
//!
//! Configuration handling for ragserve: immutable provider snapshots
//! ([`ConfigRecord`]), a JSON-file-backed [`ConfigStore`], the provider
//! [`factory::ProviderFactory`], and the [`ConfigCoordinator`] that
//! validates records against their backends and exposes the active RAG
//! pipeline.
//!
//! On first start, [`ConfigCoordinator::bootstrap_default`] creates and
//! activates a default OpenAI + local-index configuration when an
//! `OPENAI_API_KEY` is present in the environment.

pub mod coordinator;
pub mod factory;
pub mod snapshot;
pub mod store;

pub use coordinator::{ConfigCoordinator, SystemStatus, DEFAULT_OWNER};
pub use factory::{DefaultProviderFactory, ProviderFactory};
pub use snapshot::{
    default_config_from_env, ConfigPatch, ConfigRecord, EmbeddingProviderConfig,
    LlmProviderConfig, VectorProviderConfig,
};
pub use store::ConfigStore;
