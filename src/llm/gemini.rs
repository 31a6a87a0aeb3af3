use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{http_client, GenerationConfig, LlmError, LlmProvider, Result};
use crate::rag::api_error_message;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Google Gemini via the Generative Language `generateContent` endpoint.
pub struct GeminiProvider {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    generation: GenerationConfig,
}

impl GeminiProvider {
    pub fn new(api_key: SecretString, model: String, base_url: Option<&str>, generation: GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_key,
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
            model,
            generation,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        let request = build_request(prompt, &self.generation);

        log::debug!("Sending {} character prompt to gemini/{}", prompt.len(), self.model);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret().as_str())
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                provider: "gemini",
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let parsed: GenerateContentResponse = response.json()?;
        Ok(extract_text(parsed))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    /// Set on "thinking" parts, which are not part of the answer
    #[serde(default)]
    thought: bool,
}

fn build_request<'a>(prompt: &'a str, generation: &GenerationConfig) -> GenerateContentRequest<'a> {
    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![RequestPart { text: prompt }],
        }],
        generation_config: GeminiGenerationConfig {
            temperature: generation.temperature,
            max_output_tokens: generation.max_output_tokens,
        },
    }
}

/// Concatenate the answer text of the first candidate. A response without
/// candidates (e.g. blocked by safety filters) yields an empty string.
fn extract_text(response: GenerateContentResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request = build_request("hello", &GenerationConfig::default());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
                "generationConfig": {"temperature": 0.8f32, "maxOutputTokens": 2048}
            })
        );
    }

    #[test]
    fn test_extract_text_joins_parts_and_skips_thoughts() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[
                {"text":"planning...","thought":true},
                {"text":"Hello, "},
                {"text":"friend."}
            ]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response), "Hello, friend.");
    }

    #[test]
    fn test_blocked_response_is_empty() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert_eq!(extract_text(response), "");
    }

    #[test]
    fn test_endpoint() {
        let provider = GeminiProvider::new(
            SecretString::new("key".to_string()),
            "gemini-2.5-pro".to_string(),
            Some("http://localhost:8080/"),
            GenerationConfig::default(),
        )
        .unwrap();
        assert_eq!(
            provider.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }

    fn provider(base_url: &str) -> GeminiProvider {
        GeminiProvider::new(
            SecretString::new("gm-key".to_string()),
            "gemini-test".to_string(),
            Some(base_url),
            GenerationConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_generate_sends_api_key_header() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/v1beta/models/gemini-test:generateContent")
            .match_header("x-goog-api-key", "gm-key")
            .match_header("authorization", Matcher::Missing)
            .match_body(Matcher::PartialJson(json!({
                "contents": [{ "role": "user", "parts": [{ "text": "Summarize my week" }] }],
                "generationConfig": { "maxOutputTokens": 2048 },
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"A calm week."}]}}]}"#)
            .create();

        let text = provider(&server.url()).generate("Summarize my week").unwrap();

        mock.assert();
        assert_eq!(text, "A calm week.");
    }

    #[test]
    fn test_rate_limit_becomes_api_error() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/v1beta/models/gemini-test:generateContent")
            .with_status(429)
            .with_body(r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#)
            .create();

        let err = provider(&server.url()).generate("hi").unwrap_err();

        mock.assert();
        assert!(matches!(
            err,
            LlmError::Api { provider: "gemini", status: 429, ref message } if message == "Resource has been exhausted"
        ));
    }
}
