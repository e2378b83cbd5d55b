//! In-memory document registry.
//!
//! Reference implementation of [`DocumentRegistry`] used by the CLI and
//! tests; deployments with a database bring their own.

use async_trait::async_trait;
use ragserve_core::{Document, DocumentRegistry, RegistryError};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Registry backed by a process-local map.
#[derive(Default)]
pub struct MemoryRegistry {
    documents: RwLock<HashMap<String, Document>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRegistry for MemoryRegistry {
    async fn get(&self, id: &str) -> Result<Option<Document>, RegistryError> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Document>, RegistryError> {
        let mut documents: Vec<Document> =
            self.documents.read().await.values().cloned().collect();
        documents.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(documents)
    }

    async fn create(&self, document: Document) -> Result<(), RegistryError> {
        self.documents
            .write()
            .await
            .insert(document.id.clone(), document);
        Ok(())
    }

    async fn update(&self, document: Document) -> Result<(), RegistryError> {
        let mut documents = self.documents.write().await;
        if !documents.contains_key(&document.id) {
            return Err(RegistryError::NotFound(document.id));
        }
        documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RegistryError> {
        self.documents
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    async fn clear_all(&self) -> Result<(), RegistryError> {
        self.documents.write().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize, RegistryError> {
        Ok(self.documents.read().await.len())
    }
}
