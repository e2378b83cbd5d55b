//! DOCX text extraction.
//!
//! A .docx file is a ZIP archive; the main document text lives in
//! `word/document.xml` as `<w:t>` runs. Paragraph boundaries (`<w:p>`) map
//! to newlines so the chunker can still find natural breaks.

use ragserve_core::ExtractionError;
use std::io::Read;

/// Decompression cap for the main document part (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extract the main-document text from DOCX bytes.
pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractionError::Parse(format!("not a docx archive: {e}")))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| ExtractionError::Parse("word/document.xml not found".to_string()))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| ExtractionError::Parse(format!("document.xml read failed: {e}")))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(ExtractionError::Parse(
                "word/document.xml exceeds size limit".to_string(),
            ));
        }
    }

    extract_text_runs(&doc_xml)
}

/// Collect `<w:t>` text runs, inserting newlines at paragraph ends.
fn extract_text_runs(xml: &[u8]) -> Result<String, ExtractionError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(t)) if in_text => {
                out.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !out.ends_with('\n') && !out.is_empty() {
                        out.push('\n');
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractionError::Parse(format!("document.xml: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}
