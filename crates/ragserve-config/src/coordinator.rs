//! Configuration coordination.
//!
//! Materializes live provider instances from configuration records,
//! validates them against their backends, and exposes the active RAG
//! pipeline. Activation is serialized so at most one configuration per
//! owner is active at any instant.

use ragserve_core::{ConfigurationError, DocumentRegistry};
use ragserve_query::{QueryOptions, RagPipeline};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::factory::ProviderFactory;
use crate::snapshot::{default_config_from_env, ConfigPatch, ConfigRecord};
use crate::store::ConfigStore;

/// Owner used when no multi-user layer sits above the engine.
pub const DEFAULT_OWNER: &str = "default";

/// Health snapshot of the configured providers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub has_active_config: bool,
    pub llm_status: bool,
    pub vector_status: bool,
    pub embedding_status: bool,
    pub document_count: usize,
}

/// Coordinates configuration records and the active pipeline.
pub struct ConfigCoordinator {
    store: Arc<ConfigStore>,
    registry: Arc<dyn DocumentRegistry>,
    factory: Arc<dyn ProviderFactory>,
    pipeline: RwLock<Option<Arc<RagPipeline>>>,
    activation: Mutex<()>,
}

impl ConfigCoordinator {
    pub fn new(
        store: Arc<ConfigStore>,
        registry: Arc<dyn DocumentRegistry>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            store,
            registry,
            factory,
            pipeline: RwLock::new(None),
            activation: Mutex::new(()),
        }
    }

    /// Validate all three providers of a record against their backends.
    async fn validate(&self, record: &ConfigRecord) -> Result<(), ConfigurationError> {
        let llm = self.factory.build_llm(&record.llm)?;
        let embedding = self.factory.build_embedding(&record.embedding)?;
        let vector = self.factory.build_vector(&record.vector)?;

        if !llm.test_connection().await {
            return Err(ConfigurationError::Validation(
                "llm provider failed connection test".to_string(),
            ));
        }
        if !embedding.test_connection().await {
            return Err(ConfigurationError::Validation(
                "embedding provider failed connection test".to_string(),
            ));
        }
        if !vector.test_connection().await {
            return Err(ConfigurationError::Validation(
                "vector provider failed connection test".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the RAG pipeline for a record.
    async fn build_pipeline(
        &self,
        record: &ConfigRecord,
    ) -> Result<Arc<RagPipeline>, ConfigurationError> {
        let embedding = self.factory.build_embedding(&record.embedding)?;
        let vector = self.factory.build_vector(&record.vector)?;
        let llm = self.factory.build_llm(&record.llm)?;

        vector
            .initialize()
            .await
            .map_err(|e| ConfigurationError::Validation(e.to_string()))?;

        let options = QueryOptions {
            max_sources: record.vector.top_k(),
            ..QueryOptions::default()
        };

        Ok(Arc::new(RagPipeline::new(embedding, vector, llm, options)))
    }

    async fn rebuild_active_pipeline(
        &self,
        record: &ConfigRecord,
    ) -> Result<(), ConfigurationError> {
        let pipeline = self.build_pipeline(record).await?;
        *self.pipeline.write().await = Some(pipeline);
        debug!(config = %record.id, "active pipeline rebuilt");
        Ok(())
    }

    /// Validate and persist a new configuration.
    ///
    /// A record arriving with `active = true` also becomes the owner's
    /// active configuration.
    pub async fn create(&self, record: ConfigRecord) -> Result<ConfigRecord, ConfigurationError> {
        self.validate(&record).await?;

        let activate = record.active;
        let mut stored = record;
        stored.active = false;
        self.store.insert(stored.clone()).await?;

        if activate {
            return self.activate(&stored.id, &stored.owner).await;
        }
        Ok(stored)
    }

    /// Merge a patch into an existing record, re-validating when any
    /// provider selection changed.
    pub async fn update(
        &self,
        id: &str,
        patch: ConfigPatch,
    ) -> Result<ConfigRecord, ConfigurationError> {
        let mut record = self
            .store
            .get(id)
            .await
            .ok_or_else(|| ConfigurationError::NotFound(id.to_string()))?;

        let providers_changed = !patch.is_empty();
        if let Some(llm) = patch.llm {
            record.llm = llm;
        }
        if let Some(embedding) = patch.embedding {
            record.embedding = embedding;
        }
        if let Some(vector) = patch.vector {
            record.vector = vector;
        }

        if providers_changed {
            self.validate(&record).await?;
        }
        self.store.replace(record.clone()).await?;

        if record.active {
            self.rebuild_active_pipeline(&record).await?;
        }
        Ok(record)
    }

    /// Activate one configuration, deactivating the owner's others.
    pub async fn activate(
        &self,
        id: &str,
        owner: &str,
    ) -> Result<ConfigRecord, ConfigurationError> {
        let _guard = self.activation.lock().await;

        let record = self
            .store
            .get(id)
            .await
            .ok_or_else(|| ConfigurationError::NotFound(id.to_string()))?;
        self.validate(&record).await?;

        let activated = self.store.set_active(id, owner).await?;
        self.rebuild_active_pipeline(&activated).await?;

        info!(config = %id, owner, "configuration activated");
        Ok(activated)
    }

    pub async fn get(&self, id: &str) -> Option<ConfigRecord> {
        self.store.get(id).await
    }

    /// The currently active record, if any.
    pub async fn active_record(&self) -> Option<ConfigRecord> {
        self.store.any_active().await
    }

    pub async fn list(&self) -> Vec<ConfigRecord> {
        self.store.list().await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ConfigurationError> {
        let was_active = self.store.get(id).await.map(|r| r.active).unwrap_or(false);
        self.store.delete(id).await?;
        if was_active {
            *self.pipeline.write().await = None;
        }
        Ok(())
    }

    /// The active RAG pipeline, constructed lazily on first use.
    pub async fn active_pipeline(&self) -> Result<Arc<RagPipeline>, ConfigurationError> {
        if let Some(pipeline) = self.pipeline.read().await.clone() {
            return Ok(pipeline);
        }

        let record = self
            .store
            .any_active()
            .await
            .ok_or(ConfigurationError::NoActiveConfiguration)?;

        let pipeline = self.build_pipeline(&record).await?;
        let mut cached = self.pipeline.write().await;
        if cached.is_none() {
            *cached = Some(Arc::clone(&pipeline));
        }
        Ok(pipeline)
    }

    /// Fresh connection tests against the active configuration's backends.
    ///
    /// The document count comes from the registry, which is the single
    /// source of truth, never from the vector index.
    pub async fn system_status(&self) -> SystemStatus {
        let document_count = self.registry.count().await.unwrap_or(0);

        let Some(record) = self.store.any_active().await else {
            return SystemStatus {
                has_active_config: false,
                llm_status: false,
                vector_status: false,
                embedding_status: false,
                document_count,
            };
        };

        let llm_status = match self.factory.build_llm(&record.llm) {
            Ok(provider) => provider.test_connection().await,
            Err(_) => false,
        };
        let embedding_status = match self.factory.build_embedding(&record.embedding) {
            Ok(provider) => provider.test_connection().await,
            Err(_) => false,
        };
        let vector_status = match self.factory.build_vector(&record.vector) {
            Ok(provider) => provider.test_connection().await,
            Err(_) => false,
        };

        SystemStatus {
            has_active_config: true,
            llm_status,
            vector_status,
            embedding_status,
            document_count,
        }
    }

    /// First-start bootstrap: create and activate the default configuration
    /// when none exists and an OpenAI credential is present.
    pub async fn bootstrap_default(&self) -> Result<Option<ConfigRecord>, ConfigurationError> {
        if !self.store.is_empty().await {
            return Ok(None);
        }

        let env = |key: &str| std::env::var(key).ok();
        let Some(record) = default_config_from_env(&env, DEFAULT_OWNER) else {
            warn!("no OPENAI_API_KEY in environment, skipping default configuration");
            return Ok(None);
        };

        let id = record.id.clone();
        self.store.insert(record).await?;
        let activated = self.activate(&id, DEFAULT_OWNER).await?;
        info!(config = %activated.id, "default configuration bootstrapped");
        Ok(Some(activated))
    }
}
