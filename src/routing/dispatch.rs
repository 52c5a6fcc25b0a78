//! Capability dispatch with staged escalation.
//!
//! Stage 1 is a keyword scan over the registered trigger phrases. On a
//! miss, a low-effort model call selects from the capability table; if the
//! resulting confidence is below the escalation threshold a high-effort
//! call is issued as a fallback. Keyword matches are never second-guessed.

use super::CapabilityRegistry;
use crate::llm::{GenerativeBackend, extract_json_from_response};
use crate::models::{DecisionMethod, Dispatch, EffortLevel};
use crate::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Confidence assigned to a trigger-phrase hit.
pub const KEYWORD_CONFIDENCE: f32 = 0.8;

/// Confidence assigned to a successful low-effort model classification.
pub const LOW_EFFORT_CONFIDENCE: f32 = 0.9;

/// Confidence assigned to a successful high-effort model classification.
pub const HIGH_EFFORT_CONFIDENCE: f32 = 0.95;

/// Decisions below this confidence escalate to the next stage.
pub const ESCALATION_THRESHOLD: f32 = 0.6;

/// Default per-call timeout for model-backed stages.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;

/// Structured output requested from the model-backed stages.
#[derive(Debug, Deserialize)]
struct CapabilityChoice {
    capability: Option<String>,
}

/// Capability dispatcher.
pub struct Dispatcher {
    registry: CapabilityRegistry,
    backend: Option<Arc<dyn GenerativeBackend>>,
    call_timeout: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher over the given registry with no model backend.
    ///
    /// Without a backend the keyword stage is authoritative: a miss yields
    /// a plain-conversation decision.
    #[must_use]
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self {
            registry,
            backend: None,
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
        }
    }

    /// Attaches the reasoning backend used by the model-backed stages.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn GenerativeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the per-call timeout for model-backed stages (zero disables).
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Returns the registry this dispatcher scans.
    #[must_use]
    pub const fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Decides which capability should handle `text`.
    ///
    /// Never fails: a failed model stage yields `capability: None` with the
    /// error recorded, which callers treat as plain conversation.
    #[instrument(skip(self, text), fields(operation = "dispatch"))]
    pub fn dispatch(&self, text: &str) -> Dispatch {
        let start = Instant::now();

        if let Some(name) = self.registry.scan(text) {
            let decision = Dispatch {
                capability: Some(name.to_string()),
                confidence: KEYWORD_CONFIDENCE,
                method: DecisionMethod::Keyword,
                error: None,
            };
            record_dispatch_metrics(&decision, start);
            return decision;
        }

        let Some(backend) = &self.backend else {
            let decision = Dispatch::conversation(DecisionMethod::Keyword, KEYWORD_CONFIDENCE);
            record_dispatch_metrics(&decision, start);
            return decision;
        };

        let mut decision = self.model_stage(
            backend,
            text,
            EffortLevel::Low,
            DecisionMethod::LowEffortModel,
            LOW_EFFORT_CONFIDENCE,
        );

        if decision.confidence < ESCALATION_THRESHOLD {
            metrics::counter!("dispatch_escalations_total").increment(1);
            let fallback = self.model_stage(
                backend,
                text,
                EffortLevel::High,
                DecisionMethod::HighEffortModel,
                HIGH_EFFORT_CONFIDENCE,
            );
            if fallback.confidence > decision.confidence {
                decision = fallback;
            } else if let Some(error) = &fallback.error {
                tracing::warn!(error = %error, "high-effort dispatch stage also failed");
            }
        }

        record_dispatch_metrics(&decision, start);
        decision
    }

    /// Runs one model-backed classification stage.
    ///
    /// Any failure (transport, timeout, malformed output, unknown
    /// capability) is converted into a zero-confidence decision with the
    /// error recorded, so the caller's threshold check drives escalation.
    fn model_stage(
        &self,
        backend: &Arc<dyn GenerativeBackend>,
        text: &str,
        effort: EffortLevel,
        method: DecisionMethod,
        success_confidence: f32,
    ) -> Dispatch {
        let prompt = self.build_prompt(text);

        let response = if self.call_timeout.is_zero() {
            backend.generate(&prompt, effort)
        } else {
            call_with_timeout(Arc::clone(backend), prompt, effort, self.call_timeout)
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    method = method.as_str(),
                    error = %e,
                    "dispatch stage call failed"
                );
                return Dispatch {
                    capability: None,
                    confidence: 0.0,
                    method,
                    error: Some(e.to_string()),
                };
            },
        };

        match parse_capability_choice(&response) {
            Ok(Some(name)) if self.registry.get(&name).is_none() => Dispatch {
                capability: None,
                confidence: 0.0,
                method,
                error: Some(format!("backend chose unknown capability: {name}")),
            },
            Ok(capability) => Dispatch {
                capability,
                confidence: success_confidence,
                method,
                error: None,
            },
            Err(e) => Dispatch {
                capability: None,
                confidence: 0.0,
                method,
                error: Some(e.to_string()),
            },
        }
    }

    fn build_prompt(&self, text: &str) -> String {
        format!(
            "You route user requests to capabilities.\n\n\
             Capabilities:\n{}\n\n\
             Request:\n{text}\n\n\
             Respond only with valid JSON: {{\"capability\": \"<name>\"}} to \
             select one, or {{\"capability\": null}} if none apply.",
            self.registry.describe()
        )
    }
}

/// Runs a backend call on a worker thread, abandoning it at the deadline.
///
/// An abandoned worker finishes in the background and its result is
/// dropped; the backend contract requires retry-safe calls.
fn call_with_timeout(
    backend: Arc<dyn GenerativeBackend>,
    prompt: String,
    effort: EffortLevel,
    timeout: Duration,
) -> Result<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let result = backend.generate(&prompt, effort);
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => Err(Error::Unavailable(format!(
            "dispatch call timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

/// Parses the structured capability choice from a model response.
///
/// The sentinel strings "none" and "null" are normalized to no capability.
fn parse_capability_choice(response: &str) -> Result<Option<String>> {
    let json_str = extract_json_from_response(response);
    let choice: CapabilityChoice =
        serde_json::from_str(json_str).map_err(|e| Error::OperationFailed {
            operation: "parse_capability_choice".to_string(),
            cause: format!("Invalid JSON: {e}. Response: {response}"),
        })?;

    Ok(choice.capability.filter(|name| {
        let normalized = name.trim().to_lowercase();
        !normalized.is_empty() && normalized != "none" && normalized != "null"
    }))
}

fn record_dispatch_metrics(decision: &Dispatch, start: Instant) {
    let status = if decision.error.is_some() { "error" } else { "ok" };
    metrics::counter!(
        "dispatch_total",
        "method" => decision.method.as_str(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!("dispatch_duration_seconds").record(start.elapsed().as_secs_f64());
}
