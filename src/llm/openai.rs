use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{http_client, GenerationConfig, LlmError, LlmProvider, Result};
use crate::rag::{api_error_message, openai_endpoint};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiChatProvider {
    client: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    generation: GenerationConfig,
}

impl OpenAiChatProvider {
    pub fn new(api_key: SecretString, model: String, base_url: Option<&str>, generation: GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_key,
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).to_string(),
            model,
            generation,
        })
    }
}

impl LlmProvider for OpenAiChatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.generation.temperature,
            max_tokens: self.generation.max_output_tokens,
        };

        log::debug!("Sending {} character prompt to openai/{}", prompt.len(), self.model);

        let response = self
            .client
            .post(openai_endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                provider: "openai",
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let parsed: ChatResponse = response.json()?;
        first_choice_text(parsed)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_choice_text(response: ChatResponse) -> Result<String> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: "openai",
            message: "response contained no choices".to_string(),
        })?;
    // A null content (e.g. refusal or tool call) is an empty answer
    Ok(choice.message.content.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.5,
            max_tokens: 100,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert_eq!(json["max_tokens"], 100);
        assert_eq!(json["temperature"], 0.5);
    }

    #[test]
    fn test_first_choice_text() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"id":"x","choices":[
                {"index":0,"message":{"role":"assistant","content":"First"},"finish_reason":"stop"},
                {"index":1,"message":{"role":"assistant","content":"Second"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_text(response).unwrap(), "First");
    }

    #[test]
    fn test_null_content_is_empty() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#).unwrap();
        assert_eq!(first_choice_text(response).unwrap(), "");
    }

    #[test]
    fn test_no_choices_is_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            first_choice_text(response),
            Err(LlmError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_chat_endpoint() {
        assert_eq!(
            openai_endpoint("https://api.openai.com", "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            openai_endpoint("http://localhost:11434/v1/", "chat/completions"),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    fn provider(base_url: &str) -> OpenAiChatProvider {
        OpenAiChatProvider::new(
            SecretString::new("sk-chat".to_string()),
            "gpt-test".to_string(),
            Some(base_url),
            GenerationConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_generate_sends_bearer_auth() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-chat")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-test",
                "messages": [{ "role": "user", "content": "What did I plant?" }],
                "max_tokens": 2048,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Tomatoes."}}]}"#)
            .create();

        let text = provider(&server.url()).generate("What did I plant?").unwrap();

        mock.assert();
        assert_eq!(text, "Tomatoes.");
    }

    #[test]
    fn test_rate_limit_becomes_api_error() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota"}}"#)
            .create();

        let err = provider(&server.url()).generate("hi").unwrap_err();

        mock.assert();
        match err {
            LlmError::Api {
                provider,
                status,
                message,
            } => {
                assert_eq!(provider, "openai");
                assert_eq!(status, 429);
                assert_eq!(message, "You exceeded your current quota");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
