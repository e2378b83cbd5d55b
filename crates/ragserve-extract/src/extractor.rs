//! Extension-dispatched document extraction.
//!
//! [`DocumentExtractor`] converts an uploaded file into one normalized UTF-8
//! string. Extraction never returns binary garbage: when the native pass
//! produces empty or low-quality text for a PDF, the OCR fallback is invoked
//! and its output replaces the original only when it is longer. OCR errors
//! are non-fatal.

use ragserve_core::ExtractionError;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::docx::extract_docx;
use crate::html::strip_html;
use crate::ocr::OcrEngine;
use crate::pdf::extract_pdf;
use crate::quality::needs_ocr;

/// Legacy office formats that get a placeholder instead of an error.
const PLACEHOLDER_FORMATS: &[&str] = &["doc", "odt", "rtf", "pptx", "xlsx", "ppt", "xls"];

/// Converts a document file into a normalized UTF-8 string.
pub struct DocumentExtractor {
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl DocumentExtractor {
    /// Extractor without an OCR fallback.
    pub fn new() -> Self {
        Self { ocr: None }
    }

    /// Attach an OCR engine for the scanned-document fallback.
    pub fn with_ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    /// Extract text from a file, dispatching on its extension.
    pub async fn extract(&self, path: &Path, extension: &str) -> Result<String, ExtractionError> {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        debug!(path = %path.display(), ext, "extracting document");

        match ext.as_str() {
            "txt" | "md" | "markdown" => Ok(tokio::fs::read_to_string(path).await?),
            "json" => self.extract_json(path).await,
            "html" | "htm" => {
                let raw = tokio::fs::read_to_string(path).await?;
                Ok(strip_html(&raw))
            }
            "docx" => {
                let bytes = tokio::fs::read(path).await?;
                tokio::task::spawn_blocking(move || extract_docx(&bytes))
                    .await
                    .map_err(|e| ExtractionError::Parse(format!("docx task failed: {e}")))?
            }
            "pdf" => self.extract_pdf_with_fallback(path).await,
            other if PLACEHOLDER_FORMATS.contains(&other) => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(format!(
                    "[{other} document: {filename}; text extraction not supported for this format]"
                ))
            }
            other => self.extract_unknown(path, other).await,
        }
    }

    /// Parse and pretty-print JSON, stabilizing its whitespace.
    async fn extract_json(&self, path: &Path) -> Result<String, ExtractionError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| ExtractionError::Parse(format!("invalid json: {e}")))?;
        serde_json::to_string_pretty(&value)
            .map_err(|e| ExtractionError::Parse(format!("json serialization: {e}")))
    }

    /// Native PDF extraction with the OCR quality fallback.
    async fn extract_pdf_with_fallback(&self, path: &Path) -> Result<String, ExtractionError> {
        match extract_pdf(path).await {
            Ok(pdf) => {
                let mut text = pdf.text;
                if needs_ocr(&text) {
                    if let Some(engine) = &self.ocr {
                        match engine.recognize_pdf(path, Some(pdf.page_count)).await {
                            Ok(outcome)
                                if outcome.text.chars().count() > text.chars().count() =>
                            {
                                debug!(
                                    pages = outcome.pages,
                                    "ocr output replaces native extraction"
                                );
                                text = outcome.text;
                            }
                            Ok(_) => {
                                debug!("ocr output not longer than native text, keeping native");
                            }
                            Err(e) => {
                                warn!(error = %e, "ocr fallback failed, keeping native text");
                            }
                        }
                    }
                }
                Ok(text)
            }
            // Native pass could not even open the file; OCR is the only
            // remaining route.
            Err(native_err) => {
                if let Some(engine) = &self.ocr {
                    match engine.recognize_pdf(path, None).await {
                        Ok(outcome) if !outcome.text.is_empty() => {
                            warn!(error = %native_err, "native extraction failed, using ocr");
                            return Ok(outcome.text);
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "ocr fallback also failed"),
                    }
                }
                Err(native_err)
            }
        }
    }

    /// Unknown extension: accept the file when it is text-like.
    async fn extract_unknown(&self, path: &Path, ext: &str) -> Result<String, ExtractionError> {
        let text_like = mime_guess::from_path(path)
            .first()
            .map(|m| m.type_() == mime_guess::mime::TEXT)
            .unwrap_or(false);

        let bytes = tokio::fs::read(path).await?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(_) if text_like => Err(ExtractionError::Parse(format!(
                "file with text extension .{ext} is not valid utf-8"
            ))),
            Err(_) => Err(ExtractionError::UnsupportedFormat(ext.to_string())),
        }
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}
