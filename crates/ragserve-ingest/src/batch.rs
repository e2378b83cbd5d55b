//! Sequential batch ingest.
//!
//! Documents are processed strictly one at a time to cap memory; the
//! intra-document parallelism of the processor still applies. Per-document
//! failures are logged and counted but never abort the batch.

use ragserve_core::{BatchOutcome, Document, ProcessOptions};
use std::sync::Arc;
use tracing::{info, warn};

use crate::processor::DocumentProcessor;

/// Progress callback: `(current, total, filename)`.
pub type ProgressFn = dyn Fn(usize, usize, &str) + Send + Sync;

/// Processes many documents sequentially atop [`DocumentProcessor`].
pub struct BatchProcessor {
    processor: Arc<DocumentProcessor>,
}

impl BatchProcessor {
    pub fn new(processor: Arc<DocumentProcessor>) -> Self {
        Self { processor }
    }

    /// Process documents one at a time, reporting progress per document.
    pub async fn process_files_sequentially(
        &self,
        documents: &[Document],
        options: &ProcessOptions,
        on_progress: Option<&ProgressFn>,
    ) -> BatchOutcome {
        let total = documents.len();
        let mut outcome = BatchOutcome::default();

        for (i, document) in documents.iter().enumerate() {
            if let Some(progress) = on_progress {
                progress(i + 1, total, &document.filename);
            }

            match self.processor.process(document, options).await {
                Ok(chunks) => {
                    info!(
                        document = %document.filename,
                        chunks = chunks.len(),
                        "batch item indexed"
                    );
                    outcome.processed += 1;
                }
                Err(e) => {
                    warn!(
                        document = %document.filename,
                        error = %e,
                        "batch item failed, continuing"
                    );
                    outcome.failed += 1;
                }
            }
        }

        info!(
            processed = outcome.processed,
            failed = outcome.failed,
            "batch complete"
        );
        outcome
    }
}
