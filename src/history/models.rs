use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime};
use serde::Serialize;

use crate::assistant::Answer;

/// One question and its answer, as written to the session log
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub question: String,
    pub answer: String,
    /// Distinct note paths the answer drew on
    pub sources: Vec<String>,
    pub timestamp: DateTime<FixedOffset>,
}

impl Exchange {
    pub fn new(question: impl Into<String>, answer: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            sources,
            timestamp: Local::now().into(),
        }
    }

    pub fn from_answer(answer: &Answer) -> Self {
        let sources = answer.source_paths().into_iter().map(str::to_string).collect();
        Self::new(answer.question.clone(), answer.text.clone(), sources)
    }
}

/// A logged session file, for listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub path: PathBuf,
    /// Parsed from the file name; `None` for files named some other way
    pub started_at: Option<NaiveDateTime>,
    pub exchange_count: usize,
}
