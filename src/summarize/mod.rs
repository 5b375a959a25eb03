use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    Brief,
    Detailed,
}

impl SummaryMode {
    /// Upper bound on the number of sentences kept for this mode.
    pub fn cap(self) -> usize {
        match self {
            SummaryMode::Brief => 3,
            SummaryMode::Detailed => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SummaryMode::Brief => "brief",
            SummaryMode::Detailed => "detailed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brief" => Some(SummaryMode::Brief),
            "detailed" => Some(SummaryMode::Detailed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub text: String,
    pub mode: SummaryMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Summarized,
    VeryShort,
    NoContent,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct SummaryResult {
    pub body: String,
    pub sentence_count: usize,
    pub selected_count: usize,
    pub outcome: Outcome,
}

pub trait Summarizer: Send + Sync {
    fn summarize(&self, req: &SummaryRequest) -> SummaryResult;
}

mod extractive;
mod score;
mod select;
mod text;

use std::sync::Arc;

pub use extractive::ExtractiveSummarizer;

pub fn build_summarizer() -> Arc<dyn Summarizer> {
    Arc::new(ExtractiveSummarizer::default())
}
