//! Generative backend abstraction.
//!
//! Provides a unified interface for the external reasoning services the
//! router and agent call into. Every call carries a discrete
//! [`EffortLevel`] so a single backend can serve both the cheap dispatch
//! path and the deep background pass.

mod ollama;
mod openai;
mod scripted;

pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use scripted::ScriptedBackend;

use crate::models::EffortLevel;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Trait for generative backends.
///
/// Implementations must treat `generate` as retry-safe: callers may issue
/// the same prompt again after a timeout or transport failure.
pub trait GenerativeBackend: Send + Sync {
    /// The backend name.
    fn name(&self) -> &'static str;

    /// Generates a completion for the given prompt at the given effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    fn generate(&self, prompt: &str, effort: EffortLevel) -> Result<String>;

    /// Generates a completion, delivering incremental output through
    /// `on_event` as it arrives.
    ///
    /// Backends without native streaming deliver the full completion as a
    /// single chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    fn generate_streaming(
        &self,
        prompt: &str,
        effort: EffortLevel,
        on_event: &mut dyn FnMut(StreamEvent),
    ) -> Result<()> {
        let text = self.generate(prompt, effort)?;
        on_event(StreamEvent::Chunk(text));
        Ok(())
    }
}

/// An incremental event from a streaming generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamEvent {
    /// A fragment of the completion text.
    Chunk(String),
    /// Out-of-band grounding metadata for the completion.
    Citation(Citation),
}

/// A grounding reference emitted alongside streamed text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Human-readable source title.
    pub title: String,
    /// Source location, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Completion token budget for an effort level.
#[must_use]
pub const fn max_tokens_for(effort: EffortLevel) -> u32 {
    match effort {
        EffortLevel::Minimal => 256,
        EffortLevel::Low => 512,
        EffortLevel::Medium => 1024,
        EffortLevel::High => 4096,
    }
}

/// HTTP client configuration for backend requests.
#[derive(Debug, Clone, Copy)]
pub struct LlmHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl LlmHttpConfig {
    /// Loads HTTP configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Loads HTTP configuration from config file settings.
    #[must_use]
    pub fn from_config(config: &crate::config::LlmConfig) -> Self {
        let mut settings = Self::default();
        if let Some(timeout_ms) = config.timeout_ms {
            settings.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = config.connect_timeout_ms {
            settings.connect_timeout_ms = connect_timeout_ms;
        }
        settings
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("SYNAPT_LLM_TIMEOUT_MS") {
            if let Ok(timeout_ms) = v.parse::<u64>() {
                self.timeout_ms = timeout_ms;
            }
        }
        if let Ok(v) = std::env::var("SYNAPT_LLM_CONNECT_TIMEOUT_MS") {
            if let Ok(connect_timeout_ms) = v.parse::<u64>() {
                self.connect_timeout_ms = connect_timeout_ms;
            }
        }
        self
    }
}

/// Builds a blocking HTTP client for backend requests with configured timeouts.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build backend HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

/// Creates a generative backend from configuration.
///
/// # Errors
///
/// Returns an error if the configured backend name is unknown.
pub fn create_backend(config: &crate::config::LlmConfig) -> Result<Arc<dyn GenerativeBackend>> {
    match config.backend.as_str() {
        "openai" => Ok(Arc::new(OpenAiBackend::from_config(config))),
        "ollama" => Ok(Arc::new(OllamaBackend::from_config(config))),
        "scripted" => Ok(Arc::new(ScriptedBackend::new("ok"))),
        other => Err(Error::InvalidInput(format!(
            "unknown generative backend: {other}"
        ))),
    }
}

/// Extracts JSON from a backend response, handling markdown code blocks.
pub(crate) fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    // Handle ```json ... ``` blocks
    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Handle ``` ... ``` blocks (without json marker)
    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        // Skip language identifier if present (e.g., "json\n")
        let after_marker = &trimmed[content_start..];
        let json_start = after_marker
            .find('{')
            .map_or(content_start, |pos| content_start + pos);
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    // Handle raw JSON (find first { to last })
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            return &trimmed[start..=end];
        }
    }

    trimmed
}
