//! Scripted backend for tests, benchmarks, and offline operation.

use super::{Citation, GenerativeBackend, StreamEvent};
use crate::models::EffortLevel;
use crate::{Error, Result};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A recorded call made against a [`ScriptedBackend`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// The prompt as passed in.
    pub prompt: String,
    /// The requested effort level.
    pub effort: EffortLevel,
}

/// Deterministic backend that replays queued responses.
///
/// Responses are consumed front-to-back; once the queue is empty every call
/// returns the fallback response. Failure and latency injection cover the
/// escalation and timeout paths without a live service.
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    delay: Option<Duration>,
    failing: AtomicBool,
    citations: Vec<Citation>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    /// Creates a backend that always returns `fallback`.
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            delay: None,
            failing: AtomicBool::new(false),
            citations: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a response to be returned before the fallback.
    pub fn push_response(&self, response: impl Into<String>) {
        let mut responses = self.responses.lock().unwrap_or_else(|p| p.into_inner());
        responses.push_back(response.into());
    }

    /// Queues several responses in order.
    #[must_use]
    pub fn with_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for response in responses {
            self.push_response(response);
        }
        self
    }

    /// Adds artificial latency to every call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Attaches citations emitted after the streamed text.
    #[must_use]
    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    /// Toggles failure injection.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns all calls made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Returns the number of calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn next_response(&self) -> String {
        let mut responses = self.responses.lock().unwrap_or_else(|p| p.into_inner());
        responses.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

impl GenerativeBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn generate(&self, prompt: &str, effort: EffortLevel) -> Result<String> {
        {
            let mut calls = self.calls.lock().unwrap_or_else(|p| p.into_inner());
            calls.push(RecordedCall {
                prompt: prompt.to_string(),
                effort,
            });
        }

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("scripted backend failure".to_string()));
        }

        Ok(self.next_response())
    }

    fn generate_streaming(
        &self,
        prompt: &str,
        effort: EffortLevel,
        on_event: &mut dyn FnMut(StreamEvent),
    ) -> Result<()> {
        let text = self.generate(prompt, effort)?;

        for chunk in text.split_inclusive(' ') {
            on_event(StreamEvent::Chunk(chunk.to_string()));
        }
        for citation in &self.citations {
            on_event(StreamEvent::Citation(citation.clone()));
        }

        Ok(())
    }
}
