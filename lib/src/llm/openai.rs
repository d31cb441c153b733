//! OpenAI-compatible chat-completions provider.
//!
//! This speaks the `/chat/completions` wire format shared by OpenAI and the
//! many gateways that mirror it, so pointing [`OpenAiProvider`] at a
//! different base URL is enough to reach most hosted models.

use super::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role, TokenUsage};
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

/// OpenAI API base URL
const API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    /// Create a new provider
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Create from environment variable OPENAI_API_KEY
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| LlmError::Configuration("OPENAI_API_KEY not set".to_string()))?;
        Ok(Self::new(api_key))
    }

    /// Point the provider at a different OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build headers for API requests
    fn build_headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| LlmError::Configuration(format!("Invalid API key: {}", e)))?,
        );
        Ok(headers)
    }

    /// Convert our request format to the wire format
    fn to_api_request(&self, request: &CompletionRequest) -> ApiRequest {
        let messages = request
            .messages
            .iter()
            .map(|m: &ChatMessage| ApiMessage {
                role: match m.role {
                    Role::System => "system".to_string(),
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                },
                content: m.content.clone(),
            })
            .collect();

        ApiRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
        }
    }

    /// Parse the wire response into our format
    fn parse_response(
        &self,
        model: &str,
        api_response: ApiResponse,
    ) -> Result<CompletionResponse, LlmError> {
        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::EmptyCompletion {
                model: model.to_string(),
            })?;

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content,
            usage: api_response
                .usage
                .map(|u| TokenUsage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                })
                .unwrap_or_default(),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let headers = self.build_headers()?;
        let api_request = self.to_api_request(&request);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .headers(headers)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        self.parse_response(&request.model, api_response)
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn is_ready(&self) -> bool {
        !self.api_key.is_empty()
    }
}

// API request/response types

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let provider = OpenAiProvider::new("test-key");
        assert_eq!(provider.name(), "openai");
        assert!(provider.is_ready());
    }

    #[test]
    fn test_not_ready_without_key() {
        let provider = OpenAiProvider::new("");
        assert!(!provider.is_ready());
    }

    #[test]
    fn test_response_parsing() {
        let provider = OpenAiProvider::new("test-key");
        let api_response: ApiResponse = serde_json::from_str(
            r#"{
                "id": "chatcmpl-1",
                "model": "gpt-4o",
                "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3}
            }"#,
        )
        .unwrap();
        let response = provider.parse_response("gpt-4o", api_response).unwrap();
        assert_eq!(response.content, "Hello!");
        assert_eq!(response.usage.total(), 15);
    }

    #[test]
    fn test_empty_choices_is_an_error() {
        let provider = OpenAiProvider::new("test-key");
        let api_response: ApiResponse =
            serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let err = provider.parse_response("gpt-4o", api_response).unwrap_err();
        assert!(matches!(err, LlmError::EmptyCompletion { .. }));
    }
}
