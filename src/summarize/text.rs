use once_cell::sync::Lazy;
use regex::Regex;

/// Inputs shorter than this (in characters, after normalization) are returned verbatim.
pub const VERY_SHORT_CHARS: usize = 100;

/// Fragments at or below this many characters are dropped as noise.
pub const MIN_FRAGMENT_CHARS: usize = 10;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static TERMINATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").expect("terminator regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub text: String,
    pub original_index: usize,
}

impl Sentence {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

pub fn normalize(raw: &str) -> String {
    WHITESPACE.replace_all(raw, " ").trim().to_string()
}

pub fn is_very_short(normalized: &str) -> bool {
    normalized.chars().count() < VERY_SHORT_CHARS
}

pub fn segment(normalized: &str) -> Vec<Sentence> {
    TERMINATORS
        .split(normalized)
        .map(str::trim)
        .filter(|piece| piece.chars().count() > MIN_FRAGMENT_CHARS)
        .enumerate()
        .map(|(original_index, piece)| Sentence {
            text: piece.to_string(),
            original_index,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_runs_and_trims() {
        assert_eq!(normalize("  a\n\n b\t\tc  "), "a b c");
        assert_eq!(normalize("\r\n"), "");
    }

    #[test]
    fn very_short_threshold_counts_chars_not_bytes() {
        let ascii = "x".repeat(99);
        assert!(is_very_short(&ascii));
        assert!(!is_very_short(&"x".repeat(100)));
        // 99 two-byte chars: 198 bytes but still short
        assert!(is_very_short(&"é".repeat(99)));
    }

    #[test]
    fn segment_splits_on_terminator_runs_and_drops_fragments() {
        let text = "This is sentence one... Huh?! Short. Another reasonably long one!";
        let sentences = segment(text);
        let texts: Vec<_> = sentences.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["This is sentence one", "Another reasonably long one"]);
        assert_eq!(sentences[0].original_index, 0);
        assert_eq!(sentences[1].original_index, 1);
    }

    #[test]
    fn segment_boundary_is_strictly_greater_than_ten() {
        // exactly ten chars is dropped, eleven survives
        let sentences = segment("abcdefghij. abcdefghijk.");
        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].text, "abcdefghijk");
    }

    #[test]
    fn segment_without_terminators_yields_whole_text() {
        let sentences = segment("no terminal punctuation in this text at all");
        assert_eq!(sentences.len(), 1);
    }

    #[test]
    fn segment_of_punctuation_only_is_empty() {
        assert!(segment("... !!! ??? . ! ?").is_empty());
    }
}
