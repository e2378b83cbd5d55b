//! Configuration persistence.
//!
//! Records live in memory and, when a path is attached, mirror to a JSON
//! file written via temp-file + rename. Activation flips are applied under
//! one write lock so I5 (at most one active configuration per owner) holds
//! at every instant.

use ragserve_core::ConfigurationError;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::snapshot::ConfigRecord;

/// In-memory configuration store with optional file persistence.
pub struct ConfigStore {
    records: RwLock<Vec<ConfigRecord>>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// Volatile store (tests, ephemeral deployments).
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            path: None,
        }
    }

    /// Store mirrored to `path`; loads existing records when present.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigurationError> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "configuration file is corrupt, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(ConfigurationError::Persist(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };

        debug!(records = records.len(), path = %path.display(), "configuration store opened");
        Ok(Self {
            records: RwLock::new(records),
            path: Some(path),
        })
    }

    async fn persist(&self, records: &[ConfigRecord]) -> Result<(), ConfigurationError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigurationError::Persist(format!("create dir: {e}")))?;
        }

        let bytes = serde_json::to_vec_pretty(records)
            .map_err(|e| ConfigurationError::Persist(format!("serialize: {e}")))?;
        write_atomic(path, &bytes).await
    }

    pub async fn list(&self) -> Vec<ConfigRecord> {
        self.records.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<ConfigRecord> {
        self.records.read().await.iter().find(|r| r.id == id).cloned()
    }

    pub async fn active_for(&self, owner: &str) -> Option<ConfigRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.active && r.owner == owner)
            .cloned()
    }

    /// First active record regardless of owner (single-user deployments).
    pub async fn any_active(&self) -> Option<ConfigRecord> {
        self.records.read().await.iter().find(|r| r.active).cloned()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn insert(&self, record: ConfigRecord) -> Result<(), ConfigurationError> {
        let mut records = self.records.write().await;
        records.push(record);
        self.persist(&records).await
    }

    pub async fn replace(&self, record: ConfigRecord) -> Result<(), ConfigurationError> {
        let mut records = self.records.write().await;
        let position = records
            .iter()
            .position(|r| r.id == record.id)
            .ok_or_else(|| ConfigurationError::NotFound(record.id.clone()))?;
        records[position] = record;
        self.persist(&records).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ConfigurationError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(ConfigurationError::NotFound(id.to_string()));
        }
        self.persist(&records).await
    }

    /// Activate one record and deactivate the owner's others, atomically.
    pub async fn set_active(
        &self,
        id: &str,
        owner: &str,
    ) -> Result<ConfigRecord, ConfigurationError> {
        let mut records = self.records.write().await;

        if !records.iter().any(|r| r.id == id && r.owner == owner) {
            return Err(ConfigurationError::NotFound(id.to_string()));
        }

        for record in records.iter_mut() {
            if record.owner == owner {
                record.active = record.id == id;
            }
        }

        self.persist(&records).await?;
        records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| ConfigurationError::NotFound(id.to_string()))
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ConfigurationError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| ConfigurationError::Persist(format!("write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| ConfigurationError::Persist(format!("rename {}: {e}", path.display())))?;
    Ok(())
}
