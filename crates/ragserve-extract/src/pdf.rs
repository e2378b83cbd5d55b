//! PDF text extraction.
//!
//! Pages are read with lopdf and extracted in parallel batches: one batch of
//! up to five pages at a time, four concurrent workers inside the batch.
//! Results are collated in page order and joined with blank lines. Every
//! page passes the normalization filter before it is kept. Per-page
//! extraction failures are tolerated; the page is skipped with a warning.

use futures_util::stream::{self, StreamExt};
use ragserve_core::ExtractionError;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::normalize::normalize_page;

/// Pages per extraction batch.
const PAGE_BATCH_SIZE: usize = 5;

/// Concurrent workers inside one batch.
const PAGE_WORKERS: usize = 4;

/// Extracted PDF text with the authoritative page count.
#[derive(Debug, Clone)]
pub struct PdfText {
    /// Normalized page texts joined with `\n\n`
    pub text: String,
    /// Page count from the PDF catalog
    pub page_count: u32,
}

/// Extract and normalize text from a PDF file.
pub async fn extract_pdf(path: &Path) -> Result<PdfText, ExtractionError> {
    let bytes = tokio::fs::read(path).await?;

    let doc = tokio::task::spawn_blocking(move || lopdf::Document::load_mem(&bytes))
        .await
        .map_err(|e| ExtractionError::Parse(format!("pdf load task failed: {e}")))?
        .map_err(|e| ExtractionError::Parse(format!("pdf load failed: {e}")))?;

    let doc = Arc::new(doc);
    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    let page_count = page_numbers.len() as u32;

    let mut pages: Vec<String> = Vec::with_capacity(page_numbers.len());
    for batch in page_numbers.chunks(PAGE_BATCH_SIZE) {
        let extracted: Vec<Option<String>> = stream::iter(batch.iter().copied().map(|page| {
            let doc = Arc::clone(&doc);
            async move {
                let result =
                    tokio::task::spawn_blocking(move || doc.extract_text(&[page])).await;
                match result {
                    Ok(Ok(text)) => Some(text),
                    Ok(Err(e)) => {
                        warn!(page, error = %e, "page extraction failed, skipping");
                        None
                    }
                    Err(e) => {
                        warn!(page, error = %e, "page extraction task failed, skipping");
                        None
                    }
                }
            }
        }))
        .buffered(PAGE_WORKERS)
        .collect()
        .await;

        pages.extend(extracted.into_iter().flatten());
    }

    let normalized: Vec<String> = pages
        .iter()
        .map(|p| normalize_page(p))
        .filter(|p| !p.is_empty())
        .collect();

    debug!(
        pages = page_count,
        kept = normalized.len(),
        "extracted pdf text"
    );

    Ok(PdfText {
        text: normalized.join("\n\n"),
        page_count,
    })
}

/// Build a PDF with one page per input line, for tests elsewhere in the
/// crate.
#[cfg(test)]
pub(crate) fn build_test_pdf(lines: &[&str]) -> lopdf::Document {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for line in lines {
        let operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(*line)]),
            Operation::new("ET", vec![]),
        ];
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}
