//! # ragserve-chunker
//!
//! Sliding-window chunking with overlap and natural-boundary selection.
//!
//! The splitter walks the input in windows of `size` chars. Within each
//! window it prefers to cut at the last sentence terminator, then the last
//! paragraph break, then the last whitespace in the back half, falling back
//! to the raw window end. Consecutive windows overlap by `overlap` chars so
//! no retrieval-relevant phrase is lost at a cut. Offsets are half-open char
//! offsets into the input and always bracket the emitted content exactly.

use ragserve_core::{detect_language, TextChunk};
use tracing::debug;

/// Default window size in chars.
pub const DEFAULT_CHUNK_SIZE: usize = 800;

/// Default overlap between consecutive windows in chars.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Split text into overlapping windowed chunks at natural boundaries.
///
/// `overlap` must be smaller than `size`; degenerate values are clamped.
/// Empty input yields exactly one empty chunk. Each chunk is tagged with its
/// own detected language, which may differ from the document's primary.
pub fn split(text: &str, size: usize, overlap: usize) -> Vec<TextChunk> {
    let size = size.max(1);
    let overlap = overlap.min(size - 1);

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    if total == 0 {
        return vec![empty_chunk()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let end = (start + size).min(total);
        let boundary = if end == total {
            total
        } else {
            choose_boundary(&chars, start, end, size)
        };

        // Trim the window; offsets follow the trimmed region so content is
        // exactly input[start_char..end_char).
        let mut chunk_start = start;
        let mut chunk_end = boundary;
        while chunk_start < chunk_end && chars[chunk_start].is_whitespace() {
            chunk_start += 1;
        }
        while chunk_end > chunk_start && chars[chunk_end - 1].is_whitespace() {
            chunk_end -= 1;
        }

        if chunk_end > chunk_start {
            let content: String = chars[chunk_start..chunk_end].iter().collect();
            let (language, _) = detect_language(&content);
            chunks.push(TextChunk {
                content,
                start_char: chunk_start,
                end_char: chunk_end,
                language,
            });
        }

        if boundary >= total {
            break;
        }

        // Advance with overlap; fall back to the bare boundary when the
        // overlapped start would not make progress.
        let mut next = boundary.saturating_sub(overlap);
        if next <= start {
            next = boundary;
        }
        start = next;
    }

    if chunks.is_empty() {
        // Whitespace-only input trims away entirely.
        return vec![empty_chunk()];
    }

    debug!(chunks = chunks.len(), size, overlap, "split text");
    chunks
}

/// Split with the default window size and overlap.
pub fn split_default(text: &str) -> Vec<TextChunk> {
    split(text, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
}

fn empty_chunk() -> TextChunk {
    TextChunk {
        content: String::new(),
        start_char: 0,
        end_char: 0,
        language: Default::default(),
    }
}

/// Choose a cut position in `(start, end]`.
///
/// Preference order: last sentence terminator in the back half of the
/// window, last paragraph break past 30% of the window, last whitespace in
/// the back half, raw window end.
fn choose_boundary(chars: &[char], start: usize, end: usize, size: usize) -> usize {
    let half = start + size / 2;

    // Last sentence terminator in [half, end).
    for i in (half..end).rev() {
        if matches!(chars[i], '.' | '?' | '!') {
            return i + 1;
        }
    }

    // Last paragraph break in [start + 0.3 * size, end).
    let para_floor = start + (size * 3) / 10;
    let mut i = end.saturating_sub(1);
    while i > para_floor && i > start {
        if chars[i] == '\n' && chars[i - 1] == '\n' {
            return i + 1;
        }
        i -= 1;
    }

    // Last whitespace in [half, end).
    for i in (half..end).rev() {
        if chars[i].is_whitespace() {
            return i + 1;
        }
    }

    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragserve_core::Language;

    fn char_slice(text: &str, start: usize, end: usize) -> String {
        text.chars().skip(start).take(end - start).collect()
    }

    #[test]
    fn test_empty_input_yields_one_empty_chunk() {
        let chunks = split("", 800, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "");
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].end_char, 0);
    }

    #[test]
    fn test_whitespace_only_input_yields_one_empty_chunk() {
        let chunks = split("   \n\n   ", 800, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "");
    }

    #[test]
    fn test_short_text_single_chunk() {
        let text = "Just a short note.";
        let chunks = split(text, 800, 100);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].end_char, text.chars().count());
    }

    #[test]
    fn test_breaks_at_sentence_terminator() {
        // First window [0, 20) holds exactly "The quick brown fox." and the
        // terminator at index 19 is the preferred boundary.
        let text = "The quick brown fox. Jumps over lazy dog. End.";
        let chunks = split(text, 20, 5);

        assert_eq!(chunks[0].content, "The quick brown fox.");
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].end_char, 20);
    }

    #[test]
    fn test_offsets_bracket_content_exactly() {
        let text = "First sentence here. Second sentence follows. Third one ends the text.";
        let chunks = split(text, 30, 10);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(
                chunk.content,
                char_slice(text, chunk.start_char, chunk.end_char)
            );
            assert!(chunk.end_char - chunk.start_char <= 30);
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = "word ".repeat(200);
        let chunks = split(&text, 100, 25);

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            // Overlapped start never jumps past the previous end by more
            // than the window size.
            assert!(pair[1].start_char < pair[0].end_char + 100);
            assert!(pair[1].start_char > pair[0].start_char);
        }
    }

    #[test]
    fn test_prefers_paragraph_break_without_terminator() {
        // No sentence terminators; the double newline past 30% of the
        // window should win over a raw cut.
        let text = format!("{}\n\n{}", "alpha bravo charlie delta", "echo foxtrot golf");
        let chunks = split(&text, 30, 5);

        assert_eq!(chunks[0].content, "alpha bravo charlie delta");
    }

    #[test]
    fn test_unbroken_input_exact_cover_without_overlap() {
        // No terminators, paragraph breaks, or whitespace anywhere: every
        // window falls back to the raw end.
        let text = "a".repeat(10_000);
        let chunks = split(&text, 100, 0);

        assert_eq!(chunks.len(), 100);
        let covered: usize = chunks.iter().map(|c| c.end_char - c.start_char).sum();
        assert_eq!(covered, 10_000);
    }

    #[test]
    fn test_terminates_on_unbroken_input_with_maximal_overlap() {
        // Worst case for progress: raw-end boundaries and overlap one short
        // of the window. Each step still advances at least one char.
        let text = "a".repeat(2_000);
        let chunks = split(&text, 100, 99);

        assert!(!chunks.is_empty());
        assert!(chunks.len() <= 2_000);
        assert_eq!(chunks.last().unwrap().end_char, 2_000);
        for chunk in &chunks {
            assert!(chunk.end_char - chunk.start_char <= 100);
        }
    }

    #[test]
    fn test_degenerate_overlap_is_clamped() {
        let text = "some text that should not loop forever at all";
        let chunks = split(text, 10, 10);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_chunks_tagged_with_their_own_language() {
        let hindi = "नमस्ते दुनिया यह हिंदी पाठ है और यह काफी लंबा है ताकि विभाजन हो सके";
        let chunks = split(hindi, 30, 5);

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert_eq!(chunk.language, Language::Hindi);
        }
    }

    #[test]
    fn test_unicode_offsets_are_char_based() {
        let text = "мир мир мир мир мир мир мир мир мир мир";
        let chunks = split(text, 15, 3);

        for chunk in &chunks {
            assert_eq!(
                chunk.content,
                char_slice(text, chunk.start_char, chunk.end_char)
            );
        }
    }

    #[test]
    fn test_default_constants() {
        assert_eq!(DEFAULT_CHUNK_SIZE, 800);
        assert_eq!(DEFAULT_CHUNK_OVERLAP, 100);
        let chunks = split_default("tiny");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_concatenation_reproduces_input_modulo_whitespace() {
        let text = "One two three. Four five six. Seven eight nine. Ten eleven twelve.";
        let chunks = split(text, 25, 0);

        let rebuilt: String = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(normalize(&rebuilt), normalize(text));
    }
}
