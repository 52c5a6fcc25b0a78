//! `OpenAI` backend.

use super::{GenerativeBackend, LlmHttpConfig, StreamEvent, build_http_client, max_tokens_for};
use crate::models::EffortLevel;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};

/// `OpenAI` generative backend.
pub struct OpenAiBackend {
    /// API key.
    api_key: Option<String>,
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl OpenAiBackend {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    /// Creates a new `OpenAI` backend.
    #[must_use]
    pub fn new() -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        Self {
            api_key,
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            client: build_http_client(LlmHttpConfig::from_env()),
        }
    }

    /// Creates a backend from configuration.
    #[must_use]
    pub fn from_config(config: &crate::config::LlmConfig) -> Self {
        let mut backend = Self::new().with_http_config(LlmHttpConfig::from_config(config));
        if let Some(model) = &config.model {
            backend = backend.with_model(model);
        }
        if let Some(endpoint) = &config.endpoint {
            backend = backend.with_endpoint(endpoint);
        }
        backend
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets HTTP client timeouts for backend requests.
    #[must_use]
    pub fn with_http_config(mut self, config: LlmHttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }

    /// Validates that the backend is configured.
    fn validate(&self) -> Result<()> {
        if self.api_key.is_none() {
            return Err(Error::OperationFailed {
                operation: "openai_request".to_string(),
                cause: "OPENAI_API_KEY not set".to_string(),
            });
        }
        Ok(())
    }

    fn build_request(&self, prompt: &str, effort: EffortLevel, stream: bool) -> ChatCompletionRequest {
        // Higher effort buys a larger completion budget and a less greedy
        // sampling temperature; the model itself stays fixed per backend.
        let temperature = if effort >= EffortLevel::High { 0.7 } else { 0.2 };
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: Some(max_tokens_for(effort)),
            temperature: Some(temperature),
            stream,
        }
    }

    fn send(&self, request: &ChatCompletionRequest) -> Result<reqwest::blocking::Response> {
        self.validate()?;

        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::OperationFailed {
                operation: "openai_request".to_string(),
                cause: "API key not configured".to_string(),
            })?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Unavailable(format!("openai request timed out: {e}"))
                } else {
                    Error::OperationFailed {
                        operation: "openai_request".to_string(),
                        cause: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::OperationFailed {
                operation: "openai_request".to_string(),
                cause: format!("API returned status: {status} - {body}"),
            });
        }

        Ok(response)
    }
}

impl Default for OpenAiBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerativeBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn generate(&self, prompt: &str, effort: EffortLevel) -> Result<String> {
        let request = self.build_request(prompt, effort, false);
        let response = self.send(&request)?;

        let response: ChatCompletionResponse =
            response.json().map_err(|e| Error::OperationFailed {
                operation: "openai_response".to_string(),
                cause: e.to_string(),
            })?;

        response
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| Error::OperationFailed {
                operation: "openai_response".to_string(),
                cause: "No choices in response".to_string(),
            })
    }

    fn generate_streaming(
        &self,
        prompt: &str,
        effort: EffortLevel,
        on_event: &mut dyn FnMut(StreamEvent),
    ) -> Result<()> {
        let request = self.build_request(prompt, effort, true);
        let response = self.send(&request)?;

        // Server-sent events: one `data: {...}` line per delta, closed by
        // a `data: [DONE]` sentinel.
        let reader = BufReader::new(response);
        for line in reader.lines() {
            let line = line.map_err(|e| Error::OperationFailed {
                operation: "openai_stream".to_string(),
                cause: e.to_string(),
            })?;

            let Some(payload) = line.strip_prefix("data: ") else {
                continue;
            };
            if payload == "[DONE]" {
                break;
            }

            let chunk: StreamChunk =
                serde_json::from_str(payload).map_err(|e| Error::OperationFailed {
                    operation: "openai_stream".to_string(),
                    cause: format!("Invalid JSON: {e}"),
                })?;

            if let Some(content) = chunk
                .choices
                .first()
                .and_then(|choice| choice.delta.content.as_ref())
            {
                if !content.is_empty() {
                    on_event(StreamEvent::Chunk(content.clone()));
                }
            }
        }

        Ok(())
    }
}

/// Request to the Chat Completions API.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

/// A message in the chat.
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Response from the Chat Completions API.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// A choice in the response.
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// A streamed completion delta.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_creation() {
        let backend = OpenAiBackend::new();
        assert_eq!(backend.name(), "openai");
        assert_eq!(backend.model, OpenAiBackend::DEFAULT_MODEL);
    }

    #[test]
    fn test_backend_configuration() {
        let backend = OpenAiBackend::new()
            .with_api_key("test-key")
            .with_endpoint("https://custom.endpoint")
            .with_model("gpt-4o");

        assert_eq!(backend.api_key, Some("test-key".to_string()));
        assert_eq!(backend.endpoint, "https://custom.endpoint");
        assert_eq!(backend.model, "gpt-4o");
    }

    #[test]
    fn test_validate_no_key() {
        let backend = OpenAiBackend {
            api_key: None,
            endpoint: OpenAiBackend::DEFAULT_ENDPOINT.to_string(),
            model: OpenAiBackend::DEFAULT_MODEL.to_string(),
            client: reqwest::blocking::Client::new(),
        };

        assert!(backend.validate().is_err());
    }

    #[test]
    fn test_effort_shapes_request() {
        let backend = OpenAiBackend::new().with_api_key("test-key");

        let fast = backend.build_request("hi", EffortLevel::Minimal, false);
        let deep = backend.build_request("hi", EffortLevel::High, false);

        assert!(fast.max_tokens < deep.max_tokens);
        assert!(fast.temperature < deep.temperature);
    }

    #[test]
    fn test_stream_request_flag() {
        let backend = OpenAiBackend::new().with_api_key("test-key");
        let request = backend.build_request("hi", EffortLevel::Low, true);
        assert!(request.stream);
    }
}
