//! Extraction-quality heuristics.
//!
//! After native extraction a quality test decides whether the document needs
//! an OCR pass. The three signals target the failure modes of scanned or
//! badly-encoded PDFs: almost no readable text, text dominated by
//! out-of-script codepoints, and table-ruling artifacts (pipe runs,
//! underscore rules, dot leaders, column gaps).

use ragserve_core::Language;

/// Minimum readable (non-whitespace) chars before OCR is considered
/// unnecessary.
const MIN_READABLE_CHARS: usize = 50;

/// Minimum fraction of recognized codepoints.
const MIN_SUPPORTED_FRACTION: f32 = 0.5;

/// Maximum tolerated artifact density.
const MAX_ARTIFACT_DENSITY: f32 = 0.1;

/// Whether extracted text is poor enough to warrant an OCR pass.
///
/// True when ANY of: fewer than 50 readable chars, under half of the
/// codepoints recognized (supported script, ASCII punctuation, or digit), or
/// artifact density above 0.1.
pub fn needs_ocr(text: &str) -> bool {
    let readable = readable_chars(text);
    if readable < MIN_READABLE_CHARS {
        return true;
    }
    if supported_fraction(text) < MIN_SUPPORTED_FRACTION {
        return true;
    }
    artifact_density(text) > MAX_ARTIFACT_DENSITY
}

/// Count of non-whitespace chars.
pub fn readable_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Fraction of non-whitespace codepoints recognized as a supported script,
/// ASCII punctuation, or digit.
pub fn supported_fraction(text: &str) -> f32 {
    let mut total = 0usize;
    let mut supported = 0usize;
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        total += 1;
        if is_supported_codepoint(c) {
            supported += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    supported as f32 / total as f32
}

/// Density of OCR-artifact patterns over non-whitespace chars.
///
/// Counted as artifacts: chars inside runs of 2+ pipes, 3+ underscores, 4+
/// dots, or 5+ spaces, plus every codepoint outside the supported scripts
/// and common punctuation.
pub fn artifact_density(text: &str) -> f32 {
    let total = readable_chars(text);
    if total == 0 {
        return 0.0;
    }

    let mut artifacts = 0usize;
    artifacts += run_chars(text, '|', 2);
    artifacts += run_chars(text, '_', 3);
    artifacts += run_chars(text, '.', 4);
    artifacts += run_chars(text, ' ', 5);
    artifacts += text
        .chars()
        .filter(|&c| !c.is_whitespace() && !is_supported_codepoint(c))
        .count();

    artifacts as f32 / total as f32
}

/// Total chars inside runs of `c` at least `min_len` long.
fn run_chars(text: &str, c: char, min_len: usize) -> usize {
    let mut count = 0usize;
    let mut run = 0usize;
    for ch in text.chars() {
        if ch == c {
            run += 1;
        } else {
            if run >= min_len {
                count += run;
            }
            run = 0;
        }
    }
    if run >= min_len {
        count += run;
    }
    count
}

fn is_supported_codepoint(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c.is_ascii_punctuation()
        || Language::any_indic(c)
}
