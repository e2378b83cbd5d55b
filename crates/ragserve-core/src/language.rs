//! Script-range language detection.
//!
//! Each supported language maps to a Unicode codepoint range (English uses
//! ASCII letters). Detection scores a string by the fraction of its
//! characters falling in each range and is deterministic and
//! side-effect-free.

use serde::{Deserialize, Serialize};

/// Minimum fraction a language must reach to become the primary tag.
const PRIMARY_THRESHOLD: f32 = 0.3;

/// Languages recognized by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "hi")]
    Hindi,
    #[serde(rename = "bn")]
    Bengali,
    #[serde(rename = "or")]
    Oriya,
    #[serde(rename = "ta")]
    Tamil,
    #[serde(rename = "te")]
    Telugu,
    #[serde(rename = "kn")]
    Kannada,
    #[serde(rename = "ml")]
    Malayalam,
}

impl Language {
    /// All supported languages, English first.
    pub const ALL: [Language; 8] = [
        Language::English,
        Language::Hindi,
        Language::Bengali,
        Language::Oriya,
        Language::Tamil,
        Language::Telugu,
        Language::Kannada,
        Language::Malayalam,
    ];

    /// BCP-47 style tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Hindi => "hi",
            Language::Bengali => "bn",
            Language::Oriya => "or",
            Language::Tamil => "ta",
            Language::Telugu => "te",
            Language::Kannada => "kn",
            Language::Malayalam => "ml",
        }
    }

    /// Whether a character belongs to this language's script.
    pub fn contains(&self, c: char) -> bool {
        let cp = c as u32;
        match self {
            Language::English => c.is_ascii_alphabetic(),
            Language::Hindi => (0x0900..=0x097F).contains(&cp),
            Language::Bengali => (0x0980..=0x09FF).contains(&cp),
            Language::Oriya => (0x0B00..=0x0B7F).contains(&cp),
            Language::Tamil => (0x0B80..=0x0BFF).contains(&cp),
            Language::Telugu => (0x0C00..=0x0C7F).contains(&cp),
            Language::Kannada => (0x0C80..=0x0CFF).contains(&cp),
            Language::Malayalam => (0x0D00..=0x0D7F).contains(&cp),
        }
    }

    /// Whether a character belongs to any supported non-Latin script.
    pub fn any_indic(c: char) -> bool {
        Language::ALL[1..].iter().any(|lang| lang.contains(c))
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::English
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Per-language character fractions for a scored string.
pub type LanguageDistribution = Vec<(Language, f32)>;

/// Detect the primary language of a string.
///
/// Returns the language with the highest character fraction when that
/// fraction reaches 0.3, English otherwise, together with the full
/// distribution. Fractions are computed over all characters of the input.
pub fn detect_language(text: &str) -> (Language, LanguageDistribution) {
    let total = text.chars().count();
    if total == 0 {
        return (Language::English, Vec::new());
    }

    let mut counts = [0usize; Language::ALL.len()];
    for c in text.chars() {
        for (i, lang) in Language::ALL.iter().enumerate() {
            if lang.contains(c) {
                counts[i] += 1;
            }
        }
    }

    let distribution: LanguageDistribution = Language::ALL
        .iter()
        .zip(counts.iter())
        .map(|(lang, &count)| (*lang, count as f32 / total as f32))
        .collect();

    let primary = distribution
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .filter(|(_, fraction)| *fraction >= PRIMARY_THRESHOLD)
        .map(|(lang, _)| *lang)
        .unwrap_or(Language::English);

    (primary, distribution)
}
