//! # ragserve-extract
//!
//! Document text extraction for the ragserve ingest pipeline.
//!
//! One entry point, [`DocumentExtractor`], converts a file of any supported
//! format (txt, md, json, html, docx, pdf) into a single normalized UTF-8
//! string. PDF pages are extracted in parallel batches and filtered for
//! multilingual content; scanned documents fall back to a sidecar OCR engine
//! ([`TesseractOcr`]) when the native text fails a quality test.

pub mod docx;
pub mod extractor;
pub mod html;
pub mod normalize;
pub mod ocr;
pub mod pdf;
pub mod quality;

pub use extractor::DocumentExtractor;
pub use normalize::normalize_page;
pub use ocr::{OcrEngine, OcrOutcome, TesseractOcr};
pub use pdf::{extract_pdf, PdfText};
pub use quality::needs_ocr;
