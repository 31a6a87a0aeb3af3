//! The question-answering pipeline: embed, retrieve, prompt, generate.

use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::llm::{LlmError, LlmProvider};
use crate::prompt::PromptTemplate;
use crate::rag::{EmbeddingError, EmbeddingProvider, RetrievedChunk, Retriever, VectorIndex, VectorIndexError};

pub const FALLBACK_ANSWER: &str = "I couldn't find specific information about that in your notes, \
but I'm here to help. Could you provide more details or ask another question?";

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Retrieval failed: {0}")]
    Index(#[from] VectorIndexError),

    #[error("Language model failed: {0}")]
    Llm(#[from] LlmError),
}

pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub sources: Vec<RetrievedChunk>,
    #[serde(rename = "elapsedMs", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// True when the model returned nothing and the fallback was used.
    pub fallback: bool,
}

impl Answer {
    /// Distinct source paths in retrieval order.
    pub fn source_paths(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for chunk in &self.sources {
            if !seen.contains(&chunk.source.as_str()) {
                seen.push(chunk.source.as_str());
            }
        }
        seen
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

pub struct Assistant {
    index: VectorIndex,
    retriever: Retriever,
    embedder: Box<dyn EmbeddingProvider>,
    llm: Box<dyn LlmProvider>,
    prompt: PromptTemplate,
}

impl Assistant {
    pub fn new(
        index: VectorIndex,
        retriever: Retriever,
        embedder: Box<dyn EmbeddingProvider>,
        llm: Box<dyn LlmProvider>,
        prompt: PromptTemplate,
    ) -> Self {
        Self {
            index,
            retriever,
            embedder,
            llm,
            prompt,
        }
    }

    pub fn llm(&self) -> &dyn LlmProvider {
        self.llm.as_ref()
    }

    /// Passages most relevant to `question`, without calling the model.
    pub fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>> {
        let query = self.embedder.embed(question)?;
        Ok(self.retriever.retrieve(&self.index, &query)?)
    }

    pub fn ask(&self, question: &str) -> Result<Answer> {
        let started = Instant::now();

        let sources = self.retrieve(question)?;
        log::debug!("Retrieved {} passages for question", sources.len());

        let prompt = self.prompt.render(&sources, question);
        let raw = self.llm.generate(&prompt)?;

        let trimmed = raw.trim();
        let fallback = trimmed.is_empty();
        if fallback {
            log::warn!("{} returned an empty answer, using fallback", self.llm.name());
        }
        let text = if fallback { FALLBACK_ANSWER } else { trimmed }.to_string();

        let elapsed = started.elapsed();
        log::info!(
            "Answered with {}/{} in {:.1}s using {} passages",
            self.llm.name(),
            self.llm.model(),
            elapsed.as_secs_f32(),
            sources.len()
        );

        Ok(Answer {
            question: question.to_string(),
            text,
            sources,
            elapsed,
            fallback,
        })
    }
}
