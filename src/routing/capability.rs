//! Capability handler contract and registry.
//!
//! Capabilities are external collaborators: the router only sees their
//! declared name and trigger table, never their internals.

use crate::Result;
use std::fmt;
use std::sync::Arc;

/// Trait for capability handlers.
pub trait CapabilityHandler: Send + Sync {
    /// The capability name, as referenced by routing decisions.
    fn name(&self) -> &'static str;

    /// Trigger phrases for the fast dispatch stage.
    fn triggers(&self) -> &[&'static str];

    /// Executes the capability.
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails.
    fn execute(&self, action: &str, params: &serde_json::Value) -> Result<String>;
}

/// Registry of capability handlers, scanned in registration order.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    handlers: Vec<Arc<dyn CapabilityHandler>>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Registration order determines scan priority.
    pub fn register(&mut self, handler: Arc<dyn CapabilityHandler>) {
        self.handlers.push(handler);
    }

    /// Registers a handler, builder-style.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn CapabilityHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Looks up a handler by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn CapabilityHandler>> {
        self.handlers.iter().find(|h| h.name() == name)
    }

    /// Returns the registered capability names in scan order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true when no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Scans `text` against every handler's trigger phrases.
    ///
    /// The first handler with a trigger appearing as a case-insensitive
    /// substring wins.
    #[must_use]
    pub fn scan(&self, text: &str) -> Option<&'static str> {
        let haystack = text.to_lowercase();
        for handler in &self.handlers {
            for trigger in handler.triggers() {
                if haystack.contains(&trigger.to_lowercase()) {
                    return Some(handler.name());
                }
            }
        }
        None
    }

    /// Serializes the capability table for a classification prompt, one
    /// `name: trigger, trigger` line per handler.
    #[must_use]
    pub fn describe(&self) -> String {
        self.handlers
            .iter()
            .map(|h| format!("- {}: {}", h.name(), h.triggers().join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::Error;

    pub(crate) struct StubCapability {
        name: &'static str,
        triggers: Vec<&'static str>,
        fail: bool,
    }

    impl StubCapability {
        pub(crate) fn new(name: &'static str, triggers: Vec<&'static str>) -> Self {
            Self {
                name,
                triggers,
                fail: false,
            }
        }

        pub(crate) fn failing(name: &'static str, triggers: Vec<&'static str>) -> Self {
            Self {
                name,
                triggers,
                fail: true,
            }
        }
    }

    impl CapabilityHandler for StubCapability {
        fn name(&self) -> &'static str {
            self.name
        }

        fn triggers(&self) -> &[&'static str] {
            &self.triggers
        }

        fn execute(&self, action: &str, _params: &serde_json::Value) -> Result<String> {
            if self.fail {
                return Err(Error::OperationFailed {
                    operation: "execute".to_string(),
                    cause: format!("{} cannot handle {action}", self.name),
                });
            }
            Ok(format!("{} handled {action}", self.name))
        }
    }

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::new()
            .with_handler(Arc::new(StubCapability::new(
                "weather",
                vec!["weather", "forecast"],
            )))
            .with_handler(Arc::new(StubCapability::new(
                "search",
                vec!["search for", "look up"],
            )))
    }

    #[test]
    fn test_scan_matches_substring_case_insensitive() {
        let registry = registry();
        assert_eq!(registry.scan("What's the WEATHER like?"), Some("weather"));
        assert_eq!(registry.scan("please look up rust traits"), Some("search"));
        assert_eq!(registry.scan("hello there"), None);
    }

    #[test]
    fn test_scan_first_registered_wins() {
        let registry = CapabilityRegistry::new()
            .with_handler(Arc::new(StubCapability::new("first", vec!["overlap"])))
            .with_handler(Arc::new(StubCapability::new("second", vec!["overlap"])));

        assert_eq!(registry.scan("overlap here"), Some("first"));
    }

    #[test]
    fn test_get_by_name() {
        let registry = registry();
        assert!(registry.get("weather").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_describe_lists_all_handlers() {
        let description = registry().describe();
        assert!(description.contains("- weather: weather, forecast"));
        assert!(description.contains("- search: search for, look up"));
    }

    #[test]
    fn test_execute_through_registry() {
        let registry = registry();
        let handler = registry.get("weather").unwrap();
        let result = handler
            .execute("current", &serde_json::json!({"city": "Oslo"}))
            .unwrap();
        assert_eq!(result, "weather handled current");
    }

    #[test]
    fn test_failing_handler_surfaces_error() {
        let registry = CapabilityRegistry::new()
            .with_handler(Arc::new(StubCapability::failing("broken", vec!["broken"])));

        let handler = registry.get("broken").unwrap();
        assert!(handler.execute("anything", &serde_json::Value::Null).is_err());
    }
}
