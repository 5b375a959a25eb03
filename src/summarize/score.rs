use crate::errors::SummarizeError;
use crate::summarize::text::Sentence;

pub const KEYWORDS: [&str; 12] = [
    "summary",
    "conclusion",
    "important",
    "key",
    "main",
    "primary",
    "purpose",
    "objective",
    "goal",
    "findings",
    "results",
    "discussion",
];

const FIRST_BONUS: i64 = 3;
const LAST_BONUS: i64 = 2;
const EARLY_BONUS: i64 = 1;
const EARLY_WINDOW: usize = 5;
const LENGTH_BONUS: i64 = 2;
const KEYWORD_BONUS: i64 = 2;
const QUESTION_PENALTY: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredSentence {
    pub sentence: Sentence,
    pub score: i64,
}

/// Scores every sentence independently. The output has one entry per input, in input order.
pub fn score_all(sentences: &[Sentence]) -> Result<Vec<ScoredSentence>, SummarizeError> {
    let Some(last_index) = sentences.len().checked_sub(1) else {
        return Ok(Vec::new());
    };
    sentences
        .iter()
        .map(|s| {
            Ok(ScoredSentence {
                score: score_one(s, last_index)?,
                sentence: s.clone(),
            })
        })
        .collect()
}

fn score_one(sentence: &Sentence, last_index: usize) -> Result<i64, SummarizeError> {
    let idx = sentence.original_index;
    if idx > last_index {
        return Err(SummarizeError::ProcessingFailure(format!(
            "sentence index {idx} beyond last index {last_index}"
        )));
    }

    let mut score: i64 = 0;
    let mut add = |delta: i64| -> Result<(), SummarizeError> {
        score = score
            .checked_add(delta)
            .ok_or_else(|| SummarizeError::ProcessingFailure("score overflow".into()))?;
        Ok(())
    };

    // first and last are independent; a single sentence gets both
    if idx == 0 {
        add(FIRST_BONUS)?;
    }
    if idx == last_index {
        add(LAST_BONUS)?;
    }
    if idx < EARLY_WINDOW {
        add(EARLY_BONUS)?;
    }

    let len = sentence.char_len();
    if len > 50 && len < 200 {
        add(LENGTH_BONUS)?;
    }

    let lowered = sentence.text.to_lowercase();
    for keyword in KEYWORDS {
        if lowered.contains(keyword) {
            add(KEYWORD_BONUS)?;
        }
    }

    if sentence.text.contains('?') {
        add(-QUESTION_PENALTY)?;
    }

    Ok(score)
}
