//! Local file-backed vector index.
//!
//! Records live in memory and are mirrored to two files under the index
//! directory: `index.bin` (the flat inner-product index) and
//! `documents.json` (the ordered record array). Both files are written
//! together via temp-file + rename on every mutation, so a crash leaves
//! either the old pair or the new pair, never a mix. On load, a missing or
//! corrupt file degrades to an empty index with a warning; when only the
//! JSON survives, the binary index is rebuilt from it.

use async_trait::async_trait;
use ragserve_core::{SearchHit, VectorIndex, VectorRecord, VectorStoreError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::codec::{decode_index, encode_index};

/// Requested index algorithm. Only flat inner-product is implemented; the
/// advanced algorithms are accepted and transparently downgraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    FlatIp,
    HnswFlat,
    IvfFlat,
}

impl IndexKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "flat-ip" => Some(IndexKind::FlatIp),
            "hnsw-flat" => Some(IndexKind::HnswFlat),
            "ivf-flat" => Some(IndexKind::IvfFlat),
            _ => None,
        }
    }
}

struct IndexState {
    records: Vec<VectorRecord>,
    positions: HashMap<String, usize>,
}

impl IndexState {
    fn empty() -> Self {
        Self {
            records: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn from_records(records: Vec<VectorRecord>) -> Self {
        let positions = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        Self { records, positions }
    }
}

/// File-backed flat inner-product index.
pub struct LocalVectorIndex {
    dimension: usize,
    index_path: PathBuf,
    threshold: f32,
    state: RwLock<IndexState>,
}

impl LocalVectorIndex {
    /// Create an index rooted at `index_path` (a directory).
    pub fn new(index_path: impl Into<PathBuf>, dimension: usize) -> Self {
        Self {
            dimension,
            index_path: index_path.into(),
            threshold: 0.0,
            state: RwLock::new(IndexState::empty()),
        }
    }

    /// Drop hits scoring below `threshold`.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Request an index algorithm; non-flat kinds downgrade with a warning.
    pub fn with_index_kind(self, kind: IndexKind) -> Self {
        if kind != IndexKind::FlatIp {
            warn!(
                ?kind,
                "requested index algorithm is not available, downgrading to flat-ip"
            );
        }
        self
    }

    fn index_file(&self) -> PathBuf {
        self.index_path.join("index.bin")
    }

    fn documents_file(&self) -> PathBuf {
        self.index_path.join("documents.json")
    }

    /// Write both files via temp-file + rename.
    async fn persist(&self, state: &IndexState) -> Result<(), VectorStoreError> {
        tokio::fs::create_dir_all(&self.index_path)
            .await
            .map_err(|e| VectorStoreError::Persist(format!("create index dir: {e}")))?;

        let vectors: Vec<Vec<f32>> = state.records.iter().map(|r| r.embedding.clone()).collect();
        let index_bytes = encode_index(self.dimension, &vectors);
        let documents_bytes = serde_json::to_vec(&state.records)
            .map_err(|e| VectorStoreError::Persist(format!("serialize records: {e}")))?;

        write_atomic(&self.index_file(), &index_bytes).await?;
        write_atomic(&self.documents_file(), &documents_bytes).await?;

        debug!(
            records = state.records.len(),
            path = %self.index_path.display(),
            "persisted index"
        );
        Ok(())
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot / (norm_a * norm_b)
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), VectorStoreError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| VectorStoreError::Persist(format!("write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| VectorStoreError::Persist(format!("rename {}: {e}", path.display())))?;
    Ok(())
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    async fn initialize(&self) -> Result<(), VectorStoreError> {
        tokio::fs::create_dir_all(&self.index_path)
            .await
            .map_err(|e| VectorStoreError::Init(format!("create index dir: {e}")))?;

        let documents_path = self.documents_file();
        let records: Vec<VectorRecord> = match tokio::fs::read(&documents_path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "documents.json is corrupt, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(error = %e, "documents.json unreadable, starting empty");
                Vec::new()
            }
        };

        // The binary index is advisory on load: a disagreement means the pair
        // was not written together, so rebuild it from the JSON side.
        let mut rebuild = false;
        match tokio::fs::read(self.index_file()).await {
            Ok(bytes) => match decode_index(&bytes) {
                Ok((dim, vectors)) => {
                    if dim != self.dimension || vectors.len() != records.len() {
                        warn!(
                            file_dim = dim,
                            file_count = vectors.len(),
                            expected = records.len(),
                            "index.bin disagrees with documents.json, rebuilding"
                        );
                        rebuild = true;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "index.bin is corrupt, rebuilding");
                    rebuild = true;
                }
            },
            Err(_) if !records.is_empty() => rebuild = true,
            Err(_) => {}
        }

        let state = IndexState::from_records(records);
        if rebuild {
            self.persist(&state).await?;
        }

        info!(
            records = state.records.len(),
            path = %self.index_path.display(),
            "local vector index initialized"
        );
        *self.state.write().await = state;
        Ok(())
    }

    async fn add_documents(&self, records: &[VectorRecord]) -> Result<(), VectorStoreError> {
        for record in records {
            if record.embedding.len() != self.dimension {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: self.dimension,
                    actual: record.embedding.len(),
                });
            }
        }

        let mut guard = self.state.write().await;
        let state = &mut *guard;
        for record in records {
            match state.positions.get(&record.id) {
                Some(&pos) => state.records[pos] = record.clone(),
                None => {
                    state
                        .positions
                        .insert(record.id.clone(), state.records.len());
                    state.records.push(record.clone());
                }
            }
        }

        self.persist(state).await
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, VectorStoreError> {
        let state = self.state.read().await;
        if state.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &VectorRecord)> = state
            .records
            .iter()
            .map(|record| {
                let score = Self::cosine_similarity(query, &record.embedding).clamp(0.0, 1.0);
                (score, record)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let k = k.min(state.records.len());
        let hits = scored
            .into_iter()
            .take(k)
            .filter(|(score, _)| *score >= self.threshold)
            .map(|(score, record)| SearchHit {
                id: record.id.clone(),
                content: record.content.clone(),
                score,
                metadata: record.metadata.clone(),
            })
            .collect();

        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<(), VectorStoreError> {
        let mut state = self.state.write().await;
        let before = state.records.len();
        let doomed: std::collections::HashSet<&str> = ids.iter().map(String::as_str).collect();

        let records: Vec<VectorRecord> = state
            .records
            .drain(..)
            .filter(|r| !doomed.contains(r.id.as_str()))
            .collect();
        *state = IndexState::from_records(records);

        debug!(deleted = before - state.records.len(), "deleted records");
        self.persist(&state).await
    }

    async fn clear(&self) -> Result<(), VectorStoreError> {
        let mut state = self.state.write().await;
        *state = IndexState::empty();
        self.persist(&state).await
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        Ok(self.state.read().await.records.len())
    }

    async fn test_connection(&self) -> bool {
        tokio::fs::create_dir_all(&self.index_path).await.is_ok()
    }
}
