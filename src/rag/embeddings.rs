//! Embedding providers.

use std::time::Duration;

use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of inputs sent in one embeddings request.
const MAX_BATCH_SIZE: usize = 96;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Empty embedding response")]
    Empty,
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Turns text into vectors.
pub trait EmbeddingProvider {
    /// Embed several texts, returning one vector per input in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Model identifier, recorded with the index to detect stale embeddings.
    fn model_name(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or(EmbeddingError::Empty)
    }
}

/// OpenAI (or OpenAI-compatible) embeddings using the `/v1/embeddings` endpoint.
pub struct OpenAiEmbeddings {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: SecretString, model: String, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        log::debug!("Requesting {} embeddings from {}", texts.len(), self.model);

        let response = self
            .client
            .post(embeddings_endpoint(&self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let parsed: EmbeddingResponse = response.json()?;
        ordered_embeddings(parsed, texts.len())
    }
}

impl EmbeddingProvider for OpenAiEmbeddings {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            embeddings.extend(self.request_batch(batch)?);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Put response vectors back into input order.
fn ordered_embeddings(response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: data.len(),
        });
    }
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

fn has_version_suffix(base_url: &str) -> bool {
    let Some(last_segment) = base_url.rsplit('/').next() else {
        return false;
    };
    let Some(rest) = last_segment.strip_prefix('v') else {
        return false;
    };
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

/// Resolve an OpenAI-style endpoint such as `embeddings` or
/// `chat/completions` against a base URL that may or may not carry a
/// version segment or the full path already.
pub(crate) fn openai_endpoint(base_url: &str, path: &str) -> String {
    let normalized = base_url.trim_end_matches('/');
    if normalized.ends_with(&format!("/{}", path)) {
        return normalized.to_string();
    }
    if has_version_suffix(normalized) {
        return format!("{}/{}", normalized, path);
    }
    format!("{}/v1/{}", normalized, path)
}

fn embeddings_endpoint(base_url: &str) -> String {
    openai_endpoint(base_url, "embeddings")
}

/// Pull `error.message` out of an OpenAI-style error body, else return it raw.
pub(crate) fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn test_endpoint_from_host_base_uses_v1_embeddings() {
        assert_eq!(
            embeddings_endpoint("https://api.openai.com"),
            "https://api.openai.com/v1/embeddings"
        );
    }

    #[test]
    fn test_endpoint_from_versioned_base_appends_embeddings_once() {
        assert_eq!(
            embeddings_endpoint("https://example.com/api/v4/"),
            "https://example.com/api/v4/embeddings"
        );
    }

    #[test]
    fn test_endpoint_preserves_explicit_embeddings_url() {
        assert_eq!(
            embeddings_endpoint("https://api.example.com/v1/embeddings"),
            "https://api.example.com/v1/embeddings"
        );
    }

    #[test]
    fn test_response_is_reordered_by_index() {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#,
        )
        .unwrap();
        let ordered = ordered_embeddings(response, 2).unwrap();
        assert_eq!(ordered, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_response_count_mismatch() {
        let response: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[{"embedding":[1.0]}]}"#).unwrap();
        assert!(matches!(
            ordered_embeddings(response, 3),
            Err(EmbeddingError::CountMismatch { expected: 3, actual: 1 })
        ));
    }

    #[test]
    fn test_api_error_message() {
        assert_eq!(
            api_error_message(r#"{"error":{"message":"quota exceeded","type":"insufficient_quota"}}"#),
            "quota exceeded"
        );
        assert_eq!(api_error_message("  bad gateway "), "bad gateway");
    }

    fn embedder(base_url: &str) -> OpenAiEmbeddings {
        OpenAiEmbeddings::new(
            SecretString::new("sk-test".to_string()),
            "text-embedding-3-small".to_string(),
            base_url,
        )
        .unwrap()
    }

    #[test]
    fn test_embed_batch_splits_requests_and_keeps_order() {
        let mut server = mockito::Server::new();
        let texts: Vec<String> = (0..200).map(|i| format!("note {}", i)).collect();

        // Each batch answers in reverse order, tagged with in-batch indexes
        let mocks: Vec<_> = [(0, 96), (96, 192), (192, 200)]
            .into_iter()
            .map(|(start, end)| {
                let data: Vec<_> = (start..end)
                    .rev()
                    .map(|i| json!({ "index": i - start, "embedding": [i as f32] }))
                    .collect();
                server
                    .mock("POST", "/v1/embeddings")
                    .match_header("authorization", "Bearer sk-test")
                    .match_body(Matcher::Json(json!({
                        "model": "text-embedding-3-small",
                        "input": &texts[start..end],
                    })))
                    .with_status(200)
                    .with_header("content-type", "application/json")
                    .with_body(json!({ "data": data }).to_string())
                    .create()
            })
            .collect();

        let embeddings = embedder(&server.url()).embed_batch(&texts).unwrap();

        for mock in &mocks {
            mock.assert();
        }
        assert_eq!(embeddings.len(), 200);
        for (i, embedding) in embeddings.iter().enumerate() {
            assert_eq!(embedding, &vec![i as f32]);
        }
    }

    #[test]
    fn test_error_status_becomes_api_error() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/v1/embeddings")
            .with_status(429)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#)
            .create();

        let err = embedder(&server.url()).embed("hello").unwrap_err();

        mock.assert();
        match err {
            EmbeddingError::Api { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "Rate limit reached");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
