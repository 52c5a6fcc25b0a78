//! Ollama (local) backend.

use super::{GenerativeBackend, LlmHttpConfig, StreamEvent, build_http_client, max_tokens_for};
use crate::models::EffortLevel;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};

/// Ollama local generative backend.
pub struct OllamaBackend {
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl OllamaBackend {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "http://localhost:11434";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "llama3.2";

    /// Creates a new Ollama backend.
    #[must_use]
    pub fn new() -> Self {
        let endpoint =
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| Self::DEFAULT_ENDPOINT.to_string());
        let model =
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| Self::DEFAULT_MODEL.to_string());

        Self {
            endpoint,
            model,
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

    /// Checks if Ollama is available.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn build_request(&self, prompt: &str, effort: EffortLevel, stream: bool) -> GenerateRequest {
        GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream,
            options: GenerateOptions {
                num_predict: max_tokens_for(effort),
            },
        }
    }

    fn send(&self, request: &GenerateRequest) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(request)
            .send()
            .map_err(|e| {
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connect"
                } else if e.is_request() {
                    "request"
                } else {
                    "unknown"
                };
                tracing::error!(
                    backend = "ollama",
                    model = %self.model,
                    error = %e,
                    error_kind = error_kind,
                    "backend request failed"
                );
                if e.is_timeout() {
                    Error::Unavailable(format!("ollama request timed out: {e}"))
                } else {
                    Error::OperationFailed {
                        operation: "ollama_request".to_string(),
                        cause: format!("{error_kind} error: {e}"),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            tracing::error!(
                backend = "ollama",
                model = %self.model,
                status = %status,
                body = %body,
                "backend API returned error status"
            );
            return Err(Error::OperationFailed {
                operation: "ollama_request".to_string(),
                cause: format!("API returned status: {status} - {body}"),
            });
        }

        Ok(response)
    }
}

impl Default for OllamaBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerativeBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn generate(&self, prompt: &str, effort: EffortLevel) -> Result<String> {
        let request = self.build_request(prompt, effort, false);
        let response = self.send(&request)?;

        let response: GenerateResponse = response.json().map_err(|e| {
            tracing::error!(
                backend = "ollama",
                model = %self.model,
                error = %e,
                "failed to parse backend response"
            );
            Error::OperationFailed {
                operation: "ollama_response".to_string(),
                cause: e.to_string(),
            }
        })?;

        Ok(response.response)
    }

    fn generate_streaming(
        &self,
        prompt: &str,
        effort: EffortLevel,
        on_event: &mut dyn FnMut(StreamEvent),
    ) -> Result<()> {
        let request = self.build_request(prompt, effort, true);
        let response = self.send(&request)?;

        // Streaming responses arrive as newline-delimited JSON objects,
        // the final one flagged `done: true`.
        let reader = BufReader::new(response);
        for line in reader.lines() {
            let line = line.map_err(|e| Error::OperationFailed {
                operation: "ollama_stream".to_string(),
                cause: e.to_string(),
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let chunk: GenerateResponse =
                serde_json::from_str(&line).map_err(|e| Error::OperationFailed {
                    operation: "ollama_stream".to_string(),
                    cause: format!("Invalid JSON: {e}"),
                })?;

            if !chunk.response.is_empty() {
                on_event(StreamEvent::Chunk(chunk.response));
            }
            if chunk.done {
                break;
            }
        }

        Ok(())
    }
}

/// Request to the Generate API.
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

/// Generation options.
#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

/// Response from the Generate API.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_creation() {
        let backend = OllamaBackend::new();
        assert_eq!(backend.name(), "ollama");
    }

    #[test]
    fn test_backend_configuration() {
        let backend = OllamaBackend::new()
            .with_endpoint("http://localhost:12345")
            .with_model("codellama");

        assert_eq!(backend.endpoint, "http://localhost:12345");
        assert_eq!(backend.model, "codellama");
    }

    #[test]
    fn test_effort_shapes_token_budget() {
        let backend = OllamaBackend::new();
        let fast = backend.build_request("hi", EffortLevel::Minimal, false);
        let deep = backend.build_request("hi", EffortLevel::High, false);
        assert!(fast.options.num_predict < deep.options.num_predict);
    }
}
