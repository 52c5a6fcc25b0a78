//! Durable fact log: trait and backends.
//!
//! The durable store is append-only and schema-on-write: it accepts bulk
//! appends of [`Fact`] rows, reports which rows it accepted, and serves a
//! bounded most-recent read. Only the synchronizer (and the explicit
//! commit-time forwarding path) writes to it.

use super::acquire_lock;
use crate::models::Fact;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::instrument;

/// Interface to the append-only durable fact log.
pub trait DurableStore: Send + Sync {
    /// The backend name.
    fn name(&self) -> &'static str;

    /// Appends facts in bulk.
    ///
    /// Returns the indices into `facts` of the rows the store accepted;
    /// partial acceptance is allowed and callers must only treat accepted
    /// rows as persisted.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable or rejects the whole
    /// batch.
    fn append_facts(&self, facts: &[Fact]) -> Result<Vec<usize>>;

    /// Reads the most recent `limit` facts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    fn recent_facts(&self, limit: usize) -> Result<Vec<Fact>>;
}

#[derive(Serialize)]
struct AppendRequest<'a> {
    facts: &'a [Fact],
}

#[derive(Deserialize)]
struct AppendResponse {
    accepted: Vec<usize>,
}

#[derive(Deserialize)]
struct RecentResponse {
    facts: Vec<Fact>,
}

/// HTTP-backed durable fact log client.
pub struct HttpFactStore {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_token: Option<String>,
}

impl HttpFactStore {
    /// Creates a fact log client with a default HTTP client.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_token: Option<String>) -> Self {
        Self::with_client(reqwest::blocking::Client::new(), endpoint, api_token)
    }

    /// Creates a fact log client with a preconfigured HTTP client
    /// (timeouts come from the client).
    #[must_use]
    pub fn with_client(
        client: reqwest::blocking::Client,
        endpoint: impl Into<String>,
        api_token: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_token,
        }
    }

    fn authorize(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl DurableStore for HttpFactStore {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip(self, facts), fields(operation = "append_facts", count = facts.len()))]
    fn append_facts(&self, facts: &[Fact]) -> Result<Vec<usize>> {
        if facts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/facts", self.endpoint);
        let response = self
            .authorize(self.client.post(&url))
            .json(&AppendRequest { facts })
            .send()
            .map_err(|e| Error::Unavailable(format!("fact log unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::OperationFailed {
                operation: "append_facts".to_string(),
                cause: format!("fact log returned status {status}"),
            });
        }

        let parsed: AppendResponse = response.json().map_err(|e| Error::OperationFailed {
            operation: "append_facts".to_string(),
            cause: format!("invalid response body: {e}"),
        })?;

        // An index past the batch would make the caller mark the wrong rows
        if parsed.accepted.iter().any(|&i| i >= facts.len()) {
            return Err(Error::OperationFailed {
                operation: "append_facts".to_string(),
                cause: "accepted index out of range".to_string(),
            });
        }

        Ok(parsed.accepted)
    }

    #[instrument(skip(self), fields(operation = "recent_facts", limit))]
    fn recent_facts(&self, limit: usize) -> Result<Vec<Fact>> {
        let url = format!("{}/facts/recent", self.endpoint);
        let response = self
            .authorize(self.client.get(&url))
            .query(&[("limit", limit)])
            .send()
            .map_err(|e| Error::Unavailable(format!("fact log unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::OperationFailed {
                operation: "recent_facts".to_string(),
                cause: format!("fact log returned status {status}"),
            });
        }

        let parsed: RecentResponse = response.json().map_err(|e| Error::OperationFailed {
            operation: "recent_facts".to_string(),
            cause: format!("invalid response body: {e}"),
        })?;

        Ok(parsed.facts)
    }
}

/// In-memory durable store for tests and offline operation.
///
/// Supports failure injection: `set_unreachable` makes every call fail, and
/// `with_accept_limit` caps how many rows each append accepts so partial
/// acceptance paths can be exercised.
#[derive(Default)]
pub struct MemoryFactStore {
    facts: Mutex<Vec<Fact>>,
    accept_limit: Option<usize>,
    unreachable: AtomicBool,
}

impl MemoryFactStore {
    /// Creates an empty in-memory fact store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of rows accepted per append call.
    #[must_use]
    pub const fn with_accept_limit(mut self, limit: usize) -> Self {
        self.accept_limit = Some(limit);
        self
    }

    /// Toggles simulated downtime.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Returns a snapshot of all stored facts, oldest first.
    #[must_use]
    pub fn facts(&self) -> Vec<Fact> {
        acquire_lock(&self.facts).clone()
    }

    /// Returns the number of stored facts.
    #[must_use]
    pub fn len(&self) -> usize {
        acquire_lock(&self.facts).len()
    }

    /// Returns true when no facts are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DurableStore for MemoryFactStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn append_facts(&self, facts: &[Fact]) -> Result<Vec<usize>> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("fact log unreachable".to_string()));
        }

        let take = self.accept_limit.map_or(facts.len(), |limit| limit.min(facts.len()));
        let mut stored = acquire_lock(&self.facts);
        stored.extend(facts.iter().take(take).cloned());
        Ok((0..take).collect())
    }

    fn recent_facts(&self, limit: usize) -> Result<Vec<Fact>> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("fact log unreachable".to_string()));
        }

        let stored = acquire_lock(&self.facts);
        Ok(stored.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(content: &str, timestamp: u64) -> Fact {
        Fact {
            timestamp,
            category: "user".to_string(),
            fact: content.to_string(),
            source_id: None,
        }
    }

    #[test]
    fn test_memory_store_accepts_all_by_default() {
        let store = MemoryFactStore::new();
        let batch = vec![fact("a", 1), fact("b", 2)];
        let accepted = store.append_facts(&batch).unwrap();
        assert_eq!(accepted, vec![0, 1]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_memory_store_partial_acceptance() {
        let store = MemoryFactStore::new().with_accept_limit(1);
        let batch = vec![fact("a", 1), fact("b", 2), fact("c", 3)];
        let accepted = store.append_facts(&batch).unwrap();
        assert_eq!(accepted, vec![0]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.facts()[0].fact, "a");
    }

    #[test]
    fn test_memory_store_unreachable() {
        let store = MemoryFactStore::new();
        store.set_unreachable(true);
        let err = store.append_facts(&[fact("a", 1)]).unwrap_err();
        assert!(err.is_unavailable());

        store.set_unreachable(false);
        assert!(store.append_facts(&[fact("a", 1)]).is_ok());
    }

    #[test]
    fn test_memory_store_recent_newest_first() {
        let store = MemoryFactStore::new();
        store
            .append_facts(&[fact("old", 1), fact("mid", 2), fact("new", 3)])
            .unwrap();

        let recent = store.recent_facts(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].fact, "new");
        assert_eq!(recent[1].fact, "mid");
    }

    #[test]
    fn test_append_empty_batch() {
        let store = MemoryFactStore::new();
        assert!(store.append_facts(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_http_store_trims_trailing_slash() {
        let store = HttpFactStore::new("https://facts.example.com/", None);
        assert_eq!(store.endpoint, "https://facts.example.com");
    }
}
