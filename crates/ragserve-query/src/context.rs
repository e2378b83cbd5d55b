//! Context assembly under a character budget.

use ragserve_core::SearchHit;

/// Minimum leftover budget worth filling with a truncated passage.
const MIN_TRUNCATION_BUDGET: usize = 100;

/// Collect hit contents in rank order within `window` chars total.
///
/// A hit that would overflow the window is truncated with a trailing `...`
/// only when more than 100 chars of budget remain; assembly stops at the
/// first overflow either way.
pub fn assemble_context(hits: &[SearchHit], window: usize) -> Vec<String> {
    let mut passages = Vec::new();
    let mut used = 0usize;

    for hit in hits {
        let length = hit.content.chars().count();
        let remaining = window.saturating_sub(used);

        if length <= remaining {
            passages.push(hit.content.clone());
            used += length;
        } else {
            if remaining > MIN_TRUNCATION_BUDGET {
                let prefix: String = hit.content.chars().take(remaining).collect();
                passages.push(format!("{prefix}..."));
            }
            break;
        }
    }

    passages
}
