use crate::errors::SummarizeError;
use crate::summarize::score::ScoredSentence;
use crate::summarize::text::Sentence;
use crate::summarize::SummaryMode;

/// Picks the top `mode.cap()` sentences by score and returns them in reading order.
///
/// Ties keep their original relative order (stable sort), so earlier sentences win.
pub fn select(scored: &[ScoredSentence], mode: SummaryMode) -> Result<Vec<Sentence>, SummarizeError> {
    let mut ranked: Vec<&ScoredSentence> = scored.iter().collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked.truncate(mode.cap());
    ranked.sort_by_key(|s| s.sentence.original_index);

    let selected: Vec<Sentence> = ranked.into_iter().map(|s| s.sentence.clone()).collect();
    if selected.len() > scored.len() {
        return Err(SummarizeError::ProcessingFailure(
            "selected more sentences than available".into(),
        ));
    }
    if selected
        .windows(2)
        .any(|w| w[0].original_index >= w[1].original_index)
    {
        return Err(SummarizeError::ProcessingFailure(
            "selection lost reading order".into(),
        ));
    }
    Ok(selected)
}

pub fn render(selected: &[Sentence], mode: SummaryMode, total_sentences: usize) -> String {
    let footer = format!("\n\n*Summary generated from {total_sentences} total sentences.*");
    match mode {
        SummaryMode::Brief => {
            let joined = selected
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join(". ");
            format!("**Brief Summary:**\n\n{joined}.{footer}")
        }
        SummaryMode::Detailed => {
            let bullets = selected
                .iter()
                .map(|s| format!("• {}.", s.text))
                .collect::<Vec<_>>()
                .join("\n");
            format!("**Detailed Summary:**\n\n{bullets}{footer}")
        }
    }
}
