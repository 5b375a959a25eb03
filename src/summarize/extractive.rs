use crate::errors::SummarizeError;
use crate::summarize::text::{self, Sentence};
use crate::summarize::{score, select, Outcome, SummaryMode, SummaryRequest, SummaryResult, Summarizer};

pub const VERY_SHORT_LABEL: &str = "This document is very short. Key content: ";
pub const NO_CONTENT_MESSAGE: &str = "No meaningful content could be extracted for summarization.";
const FALLBACK_PREFIX_CHARS: usize = 500;

/// Position, length and keyword scoring over terminal-punctuation sentences.
#[derive(Default)]
pub struct ExtractiveSummarizer;

impl Summarizer for ExtractiveSummarizer {
    fn summarize(&self, req: &SummaryRequest) -> SummaryResult {
        let normalized = text::normalize(&req.text);
        if text::is_very_short(&normalized) {
            return SummaryResult {
                body: format!("{VERY_SHORT_LABEL}{normalized}"),
                sentence_count: 0,
                selected_count: 0,
                outcome: Outcome::VeryShort,
            };
        }

        let sentences = text::segment(&normalized);
        tracing::debug!(sentences = sentences.len(), mode = req.mode.as_str(), "segmented text");
        if sentences.is_empty() {
            return SummaryResult {
                body: NO_CONTENT_MESSAGE.to_string(),
                sentence_count: 0,
                selected_count: 0,
                outcome: Outcome::NoContent,
            };
        }

        match rank_and_render(&sentences, req.mode) {
            Ok((body, selected_count)) => SummaryResult {
                body,
                sentence_count: sentences.len(),
                selected_count,
                outcome: Outcome::Summarized,
            },
            Err(e) => {
                tracing::warn!(error = %e, "summarization failed, using fallback prefix");
                fallback(&req.text, sentences.len())
            }
        }
    }
}

fn rank_and_render(sentences: &[Sentence], mode: SummaryMode) -> Result<(String, usize), SummarizeError> {
    let scored = score::score_all(sentences)?;
    if scored.len() != sentences.len() {
        return Err(SummarizeError::ProcessingFailure("scored set size mismatch".into()));
    }
    let selected = select::select(&scored, mode)?;
    Ok((select::render(&selected, mode, sentences.len()), selected.len()))
}

pub(crate) fn fallback(raw: &str, sentence_count: usize) -> SummaryResult {
    let mut prefix: String = raw.chars().take(FALLBACK_PREFIX_CHARS).collect();
    if raw.chars().count() > FALLBACK_PREFIX_CHARS {
        prefix.push_str("...");
    }
    SummaryResult {
        body: format!(
            "**Summary:**\n\n{prefix}\n\n*Note: Using fallback summary due to processing limitations.*"
        ),
        sentence_count,
        selected_count: 0,
        outcome: Outcome::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, mode: SummaryMode) -> SummaryResult {
        ExtractiveSummarizer.summarize(&SummaryRequest {
            text: text.to_string(),
            mode,
        })
    }

    const SCENARIO: &str = "This is the first sentence of the document. This is a filler sentence without keywords. This sentence contains the important findings and conclusion of the study. Final remark here.";

    #[test]
    fn brief_picks_first_keyword_and_last_sentences() {
        let text = SCENARIO.replace("without keywords", "without any cue words");
        let res = run(&text, SummaryMode::Brief);
        assert_eq!(res.outcome, Outcome::Summarized);
        assert_eq!(res.sentence_count, 4);
        assert_eq!(res.selected_count, 3);
        assert_eq!(
            res.body,
            "**Brief Summary:**\n\nThis is the first sentence of the document. \
             This sentence contains the important findings and conclusion of the study. \
             Final remark here.\n\n*Summary generated from 4 total sentences.*"
        );
    }

    #[test]
    fn substring_keyword_in_filler_outranks_last_sentence_on_tie() {
        // "keywords" contains "key": filler scores 3, ties the last sentence and wins on order
        let res = run(SCENARIO, SummaryMode::Brief);
        assert_eq!(
            res.body,
            "**Brief Summary:**\n\nThis is the first sentence of the document. \
             This is a filler sentence without keywords. \
             This sentence contains the important findings and conclusion of the study.\
             \n\n*Summary generated from 4 total sentences.*"
        );
    }

    #[test]
    fn very_short_input_is_returned_with_label() {
        let res = run("  Tiny\n\ndocument.  ", SummaryMode::Detailed);
        assert_eq!(res.outcome, Outcome::VeryShort);
        assert_eq!(res.body, format!("{VERY_SHORT_LABEL}Tiny document."));
    }

    #[test]
    fn only_fragments_yields_no_content_message() {
        let text = "Short one. ".repeat(20);
        let res = run(&text, SummaryMode::Brief);
        assert_eq!(res.outcome, Outcome::NoContent);
        assert_eq!(res.body, NO_CONTENT_MESSAGE);
    }

    #[test]
    fn identical_requests_produce_identical_output() {
        let text = format!("{SCENARIO} {SCENARIO} Is there a main goal here? Results follow.");
        for mode in [SummaryMode::Brief, SummaryMode::Detailed] {
            assert_eq!(run(&text, mode).body, run(&text, mode).body);
        }
    }

    #[test]
    fn detailed_output_is_ordered_subsequence_within_cap() {
        let text = (0..30)
            .map(|i| format!("Sentence number {i} talks about the key results of part {i}"))
            .collect::<Vec<_>>()
            .join(". ");
        let res = run(&text, SummaryMode::Detailed);
        assert_eq!(res.sentence_count, 30);
        assert_eq!(res.selected_count, 8);
        let numbers: Vec<usize> = res
            .body
            .lines()
            .filter_map(|l| l.strip_prefix("• Sentence number "))
            .filter_map(|l| l.split_whitespace().next())
            .filter_map(|n| n.parse().ok())
            .collect();
        assert_eq!(numbers.len(), 8);
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn fallback_truncates_on_char_boundary() {
        let raw = "ü".repeat(600);
        let res = fallback(&raw, 0);
        assert_eq!(res.outcome, Outcome::Fallback);
        assert!(res.body.contains(&format!("{}...", "ü".repeat(500))));
        let short = fallback("brief raw text", 1);
        assert!(short.body.starts_with("**Summary:**\n\nbrief raw text\n\n*Note"));
    }
}
