//! Hosted language-model providers.

mod gemini;
mod openai;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use gemini::GeminiProvider;
pub use openai::OpenAiChatProvider;

pub const GEMINI_DEFAULT_MODEL: &str = gemini::DEFAULT_MODEL;
pub const OPENAI_DEFAULT_MODEL: &str = openai::DEFAULT_MODEL;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("Unexpected response from {provider}: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, LlmError>;

/// A text-in, text-out language model.
pub trait LlmProvider {
    /// Provider name for logs and history (e.g. "gemini").
    fn name(&self) -> &str;

    /// Model identifier sent to the API.
    fn model(&self) -> &str;

    /// Generate a completion for a single user prompt.
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Sampling parameters shared by all providers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            max_output_tokens: 2048,
        }
    }
}

fn http_client() -> Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(300))
        .connect_timeout(Duration::from_secs(30))
        .build()?)
}
