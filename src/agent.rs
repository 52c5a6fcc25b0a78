//! Turn orchestration: one request through the full pipeline.
//!
//! The agent owns nothing it cannot be handed: classifier, router,
//! dispatcher, stores, backend, and synchronizer are all injected (or
//! built from config) so tests can swap any seam. A turn is classified,
//! routed, optionally dispatched to a capability, answered, and both
//! sides are recorded locally. Complex turns additionally start a deep
//! background pass whose failure is logged and never replaces the fast
//! answer.

use crate::classify::{Classifier, extract_keywords};
use crate::config::CoreConfig;
use crate::llm::{GenerativeBackend, StreamEvent, create_backend};
use crate::models::{
    Classification, ConversationRecord, EffortLevel, Fact, ModelTier, RecordId, Role,
    RoutingDecision, TaskId, TaskPriority,
};
use crate::routing::{CapabilityHandler, CapabilityRegistry, Dispatcher, Router};
use crate::storage::{DurableStore, HttpFactStore, LocalStore, MemoryFactStore};
use crate::sync::{SyncStats, Synchronizer};
use crate::tasks::TaskHarness;
use crate::weights::WeightStore;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::instrument;

/// Maximum characters of request text quoted into task descriptions.
const TASK_DESCRIPTION_PREVIEW: usize = 80;

/// The outcome of one handled turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The reply shown to the user.
    pub reply: String,
    /// The routing decision the turn was answered under.
    pub decision: RoutingDecision,
    /// Id of the stored user record.
    pub user_record: RecordId,
    /// Id of the stored assistant record.
    pub reply_record: RecordId,
    /// Id of the background deep-pass task, when one was started.
    pub deep_task: Option<TaskId>,
}

/// Snapshot of the agent's stores and workers for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    /// Name of the generative backend in use.
    pub backend: &'static str,
    /// Name of the durable store in use.
    pub durable: &'static str,
    /// Total conversation records held locally.
    pub records: u64,
    /// Records not yet pushed to the durable store.
    pub unsynced: u64,
    /// Synchronizer lifecycle state.
    pub sync_state: crate::sync::SyncState,
    /// Synchronizer counters.
    pub sync: SyncStats,
    /// Task counts keyed by status.
    pub tasks: BTreeMap<&'static str, usize>,
    /// Number of learned keyword weights.
    pub weights: u64,
}

/// Builder for [`Agent`], allowing any dependency to be injected.
pub struct AgentBuilder {
    config: CoreConfig,
    backend: Option<Arc<dyn GenerativeBackend>>,
    durable: Option<Arc<dyn DurableStore>>,
    local: Option<Arc<LocalStore>>,
    weights: Option<Arc<WeightStore>>,
    tasks: Option<Arc<TaskHarness>>,
    registry: CapabilityRegistry,
    session_id: Option<String>,
}

impl AgentBuilder {
    /// Creates a builder over the given configuration.
    #[must_use]
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            backend: None,
            durable: None,
            local: None,
            weights: None,
            tasks: None,
            registry: CapabilityRegistry::new(),
            session_id: None,
        }
    }

    /// Injects a generative backend instead of building one from config.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn GenerativeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Injects a durable store instead of building one from config.
    #[must_use]
    pub fn with_durable(mut self, durable: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(durable);
        self
    }

    /// Injects a local record store.
    #[must_use]
    pub fn with_local(mut self, local: Arc<LocalStore>) -> Self {
        self.local = Some(local);
        self
    }

    /// Injects a keyword weight store.
    #[must_use]
    pub fn with_weights(mut self, weights: Arc<WeightStore>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Injects a task harness.
    #[must_use]
    pub fn with_tasks(mut self, tasks: Arc<TaskHarness>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    /// Registers a capability handler.
    #[must_use]
    pub fn with_capability(mut self, handler: Arc<dyn CapabilityHandler>) -> Self {
        self.registry.register(handler);
        self
    }

    /// Sets the session id stamped onto stored records.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Builds the agent, creating any dependency not injected.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be opened, the configured
    /// backend is unknown, or the sync worker cannot be spawned.
    pub fn build(self) -> Result<Agent> {
        let config = self.config;

        let backend = match self.backend {
            Some(backend) => backend,
            None => create_backend(&config.llm)?,
        };

        let needs_data_dir = self.local.is_none() || self.weights.is_none() || self.tasks.is_none();
        if needs_data_dir {
            std::fs::create_dir_all(&config.data_dir).map_err(|e| Error::OperationFailed {
                operation: "create_data_dir".to_string(),
                cause: format!("{}: {}", config.data_dir.display(), e),
            })?;
        }

        let local = match self.local {
            Some(local) => local,
            None => Arc::new(LocalStore::new(config.records_db_path())?),
        };
        let weights = match self.weights {
            Some(weights) => weights,
            None => Arc::new(WeightStore::new(config.weights_db_path())?),
        };
        let tasks = match self.tasks {
            Some(tasks) => tasks,
            None => Arc::new(TaskHarness::new(config.tasks_db_path())?),
        };

        // Without an endpoint, facts stay queued locally: the accept-nothing
        // sink defers every append instead of swallowing facts that would
        // vanish at process exit.
        let durable: Arc<dyn DurableStore> = match self.durable {
            Some(durable) => durable,
            None => config.durable.endpoint.as_ref().map_or_else(
                || Arc::new(MemoryFactStore::new().with_accept_limit(0)) as Arc<dyn DurableStore>,
                |endpoint| {
                    Arc::new(HttpFactStore::new(endpoint, config.durable.api_token.clone())) as _
                },
            ),
        };

        let router = Router::new().with_weights(Arc::clone(&weights));
        let dispatcher = Dispatcher::new(self.registry)
            .with_backend(Arc::clone(&backend))
            .with_call_timeout(Duration::from_millis(config.dispatch.call_timeout_ms));

        let synchronizer = Synchronizer::new(Arc::clone(&local), Arc::clone(&durable))
            .with_initial_delay(config.sync.initial_delay())
            .with_interval(config.sync.interval())
            .with_max_backoff(config.sync.max_backoff())
            .with_stop_timeout(config.sync.stop_timeout());
        if config.sync.auto_start {
            synchronizer.start()?;
        }

        Ok(Agent {
            classifier: Mutex::new(Classifier::new()),
            router,
            dispatcher,
            backend,
            local,
            durable,
            weights,
            tasks,
            synchronizer,
            session_id: self.session_id,
            context_window: config.context_window,
            boost_amount: config.weights.boost_amount,
        })
    }
}

/// The conversational core: classifies, routes, dispatches, answers, and
/// records one request at a time.
pub struct Agent {
    classifier: Mutex<Classifier>,
    router: Router,
    dispatcher: Dispatcher,
    backend: Arc<dyn GenerativeBackend>,
    local: Arc<LocalStore>,
    durable: Arc<dyn DurableStore>,
    weights: Arc<WeightStore>,
    tasks: Arc<TaskHarness>,
    synchronizer: Synchronizer,
    session_id: Option<String>,
    context_window: usize,
    boost_amount: f32,
}

impl Agent {
    /// Creates an agent with production wiring from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be opened or the configured
    /// backend is unknown.
    pub fn new(config: CoreConfig) -> Result<Self> {
        AgentBuilder::new(config).build()
    }

    /// Returns a builder for injecting dependencies.
    #[must_use]
    pub fn builder(config: CoreConfig) -> AgentBuilder {
        AgentBuilder::new(config)
    }

    /// Handles one turn end to end and returns the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is empty, generation fails, or a
    /// record cannot be stored. Dispatch and deep-pass failures degrade
    /// instead of failing the turn.
    #[instrument(skip(self, text), fields(operation = "handle_turn"))]
    pub fn handle_turn(&self, text: &str) -> Result<TurnOutcome> {
        let (context, decision) = self.prepare(text)?;

        let reply = match decision.capability.as_deref() {
            Some(capability) => match self.run_capability(capability, text) {
                Some(reply) => reply,
                None => self.generate_reply(&context, text, decision.effort)?,
            },
            None => self.generate_reply(&context, text, decision.effort)?,
        };

        self.finish_turn(text, reply, decision)
    }

    /// Handles one turn, streaming the reply through `on_event`.
    ///
    /// Capability-handled turns deliver their answer as a single chunk;
    /// generated turns forward the backend's chunk and citation events as
    /// they arrive. The accumulated reply is stored exactly like the
    /// non-streaming path.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is empty, generation fails, or a
    /// record cannot be stored.
    pub fn handle_turn_streaming(
        &self,
        text: &str,
        on_event: &mut dyn FnMut(StreamEvent),
    ) -> Result<TurnOutcome> {
        let (context, decision) = self.prepare(text)?;

        let reply = match decision.capability.as_deref() {
            Some(capability) => self.run_capability(capability, text),
            None => None,
        };
        let reply = match reply {
            Some(reply) => {
                on_event(StreamEvent::Chunk(reply.clone()));
                reply
            },
            None => {
                let prompt = build_prompt(&context, text);
                let mut accumulated = String::new();
                self.backend
                    .generate_streaming(&prompt, decision.effort, &mut |event| {
                        if let StreamEvent::Chunk(chunk) = &event {
                            accumulated.push_str(chunk);
                        }
                        on_event(event);
                    })?;
                accumulated
            },
        };

        self.finish_turn(text, reply, decision)
    }

    /// Classifies and routes a request without answering or storing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is empty or the context read fails.
    pub fn plan(&self, text: &str) -> Result<RoutingDecision> {
        self.prepare(text).map(|(_, decision)| decision)
    }

    /// Forces the next routed request onto a specific tier at a specific
    /// effort. Consumed by the next `plan` or turn.
    pub fn set_override(&self, tier: ModelTier, effort: EffortLevel) {
        self.router.set_override(tier, effort);
    }

    /// Stores a record outside the turn flow, extracting keywords.
    ///
    /// Knowledge records are additionally forwarded to the durable store
    /// right away when it is reachable; on failure they queue for the
    /// synchronizer silently.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is empty or the local write fails.
    pub fn store_record(&self, role: Role, content: &str) -> Result<RecordId> {
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("record content is empty".to_string()));
        }
        if role == Role::Knowledge {
            return self.commit_knowledge(content);
        }
        self.store_turn(role, content)
    }

    /// Stores a knowledge record and forwards it to the durable store at
    /// commit time, falling back silently to the sync queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the local write fails; durable-store failures
    /// never surface here.
    #[instrument(skip(self, content), fields(operation = "commit_knowledge"))]
    pub fn commit_knowledge(&self, content: &str) -> Result<RecordId> {
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("record content is empty".to_string()));
        }

        let record = self.build_record(Role::Knowledge, content);
        let id = self.local.store(&record)?;

        let fact = Fact::from_record(&record);
        match self.durable.append_facts(std::slice::from_ref(&fact)) {
            Ok(accepted) if !accepted.is_empty() => {
                if let Err(e) = self.local.mark_synced(std::slice::from_ref(&id)) {
                    tracing::warn!(error = %e, "failed to mark forwarded knowledge record");
                }
            },
            Ok(_) => {
                tracing::debug!("durable store deferred the knowledge fact; queued for sync");
            },
            Err(e) => {
                tracing::debug!(error = %e, "durable store unreachable; knowledge queued for sync");
            },
        }

        Ok(id)
    }

    /// Records explicit user feedback and, when positive, boosts the
    /// weights of the keywords in its context.
    ///
    /// # Errors
    ///
    /// Returns an error if the weight store write fails.
    pub fn record_feedback(&self, positive: bool, context_text: &str) -> Result<()> {
        self.weights.record_feedback(positive, context_text)?;
        if positive {
            let keywords = extract_keywords(context_text);
            if !keywords.is_empty() {
                self.weights.boost_keywords(&keywords, self.boost_amount)?;
            }
        }
        Ok(())
    }

    /// Assembles a status snapshot across stores and the synchronizer.
    ///
    /// # Errors
    ///
    /// Returns an error if a store read fails.
    pub fn status(&self) -> Result<AgentStatus> {
        let mut tasks: BTreeMap<&'static str, usize> = BTreeMap::new();
        for task in self.tasks.list(None)? {
            *tasks.entry(task.status.as_str()).or_insert(0) += 1;
        }

        Ok(AgentStatus {
            backend: self.backend.name(),
            durable: self.durable.name(),
            records: self.local.count()?,
            unsynced: self.local.unsynced_count()?,
            sync_state: self.synchronizer.state(),
            sync: self.synchronizer.stats(),
            tasks,
            weights: self.weights.len()?,
        })
    }

    /// Returns the local record store.
    #[must_use]
    pub fn local_store(&self) -> &Arc<LocalStore> {
        &self.local
    }

    /// Returns the keyword weight store.
    #[must_use]
    pub fn weight_store(&self) -> &Arc<WeightStore> {
        &self.weights
    }

    /// Returns the task harness.
    #[must_use]
    pub fn task_harness(&self) -> &Arc<TaskHarness> {
        &self.tasks
    }

    /// Returns the synchronizer.
    #[must_use]
    pub const fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    /// Stops the background sync worker, waiting up to its stop timeout.
    pub fn shutdown(&self) {
        self.synchronizer.stop();
    }

    /// Shared front half of a turn: validate, classify, route, dispatch.
    fn prepare(&self, text: &str) -> Result<(Vec<ConversationRecord>, RoutingDecision)> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("request text is empty".to_string()));
        }

        let context = self.local.get_context(self.context_window).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "context read failed; classifying without history");
            Vec::new()
        });

        let classification = self.classify(text, &context);
        let mut decision = self.router.route(text, &classification);

        // No capabilities installed means nothing to dispatch to.
        if !self.dispatcher.registry().is_empty() {
            let dispatch = self.dispatcher.dispatch(text);
            if let Some(error) = &dispatch.error {
                tracing::warn!(error = %error, "dispatch degraded to conversation");
            }
            decision = decision.with_dispatch(&dispatch);
        }

        tracing::debug!(
            tier = decision.tier.as_str(),
            effort = decision.effort.as_str(),
            complexity = decision.complexity.as_str(),
            parallel_deep = decision.parallel_deep,
            capability = decision.capability.as_deref().unwrap_or("-"),
            "routed request"
        );

        Ok((context, decision))
    }

    fn classify(&self, text: &str, context: &[ConversationRecord]) -> Classification {
        self.classifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .classify(text, context)
    }

    /// Executes the chosen capability, degrading to generation on failure.
    fn run_capability(&self, name: &str, text: &str) -> Option<String> {
        let handler = self.dispatcher.registry().get(name)?;
        match handler.execute("handle", &serde_json::json!({ "text": text })) {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::warn!(
                    capability = name,
                    error = %e,
                    "capability failed; falling back to generation"
                );
                metrics::counter!("capability_failures_total", "capability" => name.to_string())
                    .increment(1);
                None
            },
        }
    }

    fn generate_reply(
        &self,
        context: &[ConversationRecord],
        text: &str,
        effort: EffortLevel,
    ) -> Result<String> {
        let prompt = build_prompt(context, text);
        self.backend.generate(&prompt, effort)
    }

    /// Shared back half of a turn: store both sides and start the deep
    /// pass when the decision calls for one.
    fn finish_turn(
        &self,
        text: &str,
        reply: String,
        decision: RoutingDecision,
    ) -> Result<TurnOutcome> {
        let user_record = self.store_turn(Role::User, text)?;
        let reply_record = self.store_turn(Role::Assistant, &reply)?;

        let deep_task = decision
            .deep_pass()
            .and_then(|(tier, effort)| self.spawn_deep_pass(text, tier, effort));

        metrics::counter!("turns_total", "tier" => decision.tier.as_str()).increment(1);

        Ok(TurnOutcome {
            reply,
            decision,
            user_record,
            reply_record,
            deep_task,
        })
    }

    fn store_turn(&self, role: Role, content: &str) -> Result<RecordId> {
        self.local.store(&self.build_record(role, content))
    }

    fn build_record(&self, role: Role, content: &str) -> ConversationRecord {
        let mut record =
            ConversationRecord::new(role, content).with_keywords(extract_keywords(content));
        if let Some(session) = &self.session_id {
            record = record.with_session(session.clone());
        }
        record
    }

    /// Starts the background deep pass for a complex turn.
    ///
    /// The pass is tracked as a task so its result (or failure) is
    /// inspectable later; it never touches the already-returned fast
    /// answer. Returns `None` when the task cannot even be registered.
    fn spawn_deep_pass(
        &self,
        text: &str,
        tier: ModelTier,
        effort: EffortLevel,
    ) -> Option<TaskId> {
        let description = format!("deep pass: {}", preview(text));
        let task = match self.tasks.create(description, "deep-pass", TaskPriority::Low) {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(error = %e, "could not register deep-pass task");
                return None;
            },
        };
        if let Err(e) = self.tasks.start(&task.id) {
            tracing::warn!(error = %e, "could not start deep-pass task");
            return Some(task.id);
        }

        let backend = Arc::clone(&self.backend);
        let tasks = Arc::clone(&self.tasks);
        let id = task.id.clone();
        let prompt = format!(
            "Consider this request carefully and answer it as thoroughly as you can:\n\n{text}"
        );
        tracing::debug!(task.id = %id, tier = tier.as_str(), "starting deep pass");

        std::thread::spawn(move || {
            match backend.generate(&prompt, effort) {
                Ok(result) => {
                    if let Err(e) = tasks.complete(&id, result) {
                        tracing::warn!(task.id = %id, error = %e, "deep pass result discarded");
                    }
                },
                Err(e) => {
                    // The fast answer already went out; this only marks the task.
                    tracing::warn!(task.id = %id, error = %e, "deep pass failed");
                    let _ = tasks.fail(&id, e.to_string());
                },
            }
        });

        Some(task.id)
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.synchronizer.stop();
    }
}

/// Builds the generation prompt from the rolling context window.
fn build_prompt(context: &[ConversationRecord], text: &str) -> String {
    let mut prompt = String::new();
    for record in context {
        prompt.push_str(record.role.as_str());
        prompt.push_str(": ");
        prompt.push_str(&record.content);
        prompt.push('\n');
    }
    prompt.push_str("user: ");
    prompt.push_str(text);
    prompt.push_str("\nassistant:");
    prompt
}

/// Truncates request text for task descriptions.
fn preview(text: &str) -> String {
    if text.chars().count() <= TASK_DESCRIPTION_PREVIEW {
        text.to_string()
    } else {
        let cut: String = text.chars().take(TASK_DESCRIPTION_PREVIEW).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedBackend;
    use crate::models::{Complexity, TaskStatus};
    use std::time::Instant;

    struct StubCapability {
        name: &'static str,
        triggers: Vec<&'static str>,
        fail: bool,
    }

    impl StubCapability {
        fn new(name: &'static str, triggers: Vec<&'static str>) -> Self {
            Self {
                name,
                triggers,
                fail: false,
            }
        }

        fn failing(name: &'static str, triggers: Vec<&'static str>) -> Self {
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
                    cause: format!("{} is down", self.name),
                });
            }
            Ok(format!("{} handled {action}", self.name))
        }
    }

    fn test_config() -> CoreConfig {
        let mut config = CoreConfig::default();
        config.sync.auto_start = false;
        config
    }

    fn in_memory_builder(config: CoreConfig) -> AgentBuilder {
        Agent::builder(config)
            .with_local(Arc::new(LocalStore::in_memory().unwrap()))
            .with_weights(Arc::new(WeightStore::in_memory().unwrap()))
            .with_tasks(Arc::new(TaskHarness::in_memory().unwrap()))
            .with_durable(Arc::new(MemoryFactStore::new()) as _)
    }

    fn test_agent(backend: Arc<ScriptedBackend>) -> Agent {
        in_memory_builder(test_config())
            .with_backend(backend as _)
            .build()
            .unwrap()
    }

    fn wait_for_terminal(tasks: &TaskHarness, id: &TaskId) -> TaskStatus {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let status = tasks.get(id).unwrap().unwrap().status;
            if status.is_terminal() || Instant::now() > deadline {
                return status;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_turn_stores_both_sides() {
        let backend = Arc::new(ScriptedBackend::new("hello yourself!"));
        let agent = test_agent(backend);

        let outcome = agent.handle_turn("good morning").unwrap();

        assert_eq!(outcome.reply, "hello yourself!");
        assert_eq!(agent.local_store().count().unwrap(), 2);

        let context = agent.local_store().get_context(10).unwrap();
        assert_eq!(context[0].role, Role::User);
        assert_eq!(context[0].content, "good morning");
        assert_eq!(context[1].role, Role::Assistant);
        assert!(context[1].keywords.contains(&"hello".to_string()));
    }

    #[test]
    fn test_simple_turn_routes_cheapest_without_deep_pass() {
        let agent = test_agent(Arc::new(ScriptedBackend::new("hi")));
        let outcome = agent.handle_turn("hi").unwrap();

        assert_eq!(outcome.decision.tier, ModelTier::cheapest());
        assert_eq!(outcome.decision.complexity, Complexity::Simple);
        assert!(outcome.deep_task.is_none());
    }

    #[test]
    fn test_complex_turn_spawns_deep_pass() {
        let backend = Arc::new(ScriptedBackend::new("working on it"));
        let agent = test_agent(Arc::clone(&backend));

        let outcome = agent
            .handle_turn(
                "analyze the tradeoffs between these storage designs and compare \
                 their failure modes step by step",
            )
            .unwrap();

        assert!(outcome.decision.parallel_deep);
        let task_id = outcome.deep_task.expect("deep pass task");

        let status = wait_for_terminal(agent.task_harness(), &task_id);
        assert_eq!(status, TaskStatus::Completed);

        let task = agent.task_harness().get(&task_id).unwrap().unwrap();
        assert_eq!(task.kind, "deep-pass");
        assert_eq!(task.result.as_deref(), Some("working on it"));
        // Two generate calls: the fast answer and the deep pass
        assert_eq!(backend.call_count(), 2);
    }

    #[test]
    fn test_failed_deep_pass_keeps_fast_answer() {
        let backend = Arc::new(ScriptedBackend::new("fast answer"));
        let agent = test_agent(Arc::clone(&backend));

        let outcome = agent
            .handle_turn("analyze and compare the approaches, explain why each fails step by step")
            .unwrap();
        assert_eq!(outcome.reply, "fast answer");

        // Deep pass hits a dead backend
        backend.set_failing(true);
        let task_id = outcome.deep_task.expect("deep pass task");
        let status = wait_for_terminal(agent.task_harness(), &task_id);

        if status == TaskStatus::Failed {
            let task = agent.task_harness().get(&task_id).unwrap().unwrap();
            assert!(task.error.is_some());
        }
        // The stored reply is untouched either way
        let context = agent.local_store().get_context(10).unwrap();
        assert_eq!(context[1].content, "fast answer");
    }

    #[test]
    fn test_capability_answers_turn() {
        let backend = Arc::new(ScriptedBackend::new("generated instead"));
        let agent = in_memory_builder(test_config())
            .with_backend(Arc::clone(&backend) as _)
            .with_capability(Arc::new(StubCapability::new("weather", vec!["weather"])))
            .build()
            .unwrap();

        let outcome = agent.handle_turn("what's the weather like?").unwrap();

        assert_eq!(outcome.decision.capability.as_deref(), Some("weather"));
        assert_eq!(outcome.reply, "weather handled handle");
        // Keyword hit, so the model was never consulted for dispatch
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_failing_capability_degrades_to_generation() {
        let backend = Arc::new(ScriptedBackend::new("generated fallback"));
        let agent = in_memory_builder(test_config())
            .with_backend(Arc::clone(&backend) as _)
            .with_capability(Arc::new(StubCapability::failing("weather", vec!["weather"])))
            .build()
            .unwrap();

        let outcome = agent.handle_turn("what's the weather like?").unwrap();

        assert_eq!(outcome.reply, "generated fallback");
        assert_eq!(backend.call_count(), 1);
    }

    #[test]
    fn test_empty_turn_rejected() {
        let agent = test_agent(Arc::new(ScriptedBackend::new("x")));
        assert!(matches!(
            agent.handle_turn("   ").unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert_eq!(agent.local_store().count().unwrap(), 0);
    }

    #[test]
    fn test_commit_knowledge_forwards_when_reachable() {
        let durable = Arc::new(MemoryFactStore::new());
        let agent = in_memory_builder(test_config())
            .with_backend(Arc::new(ScriptedBackend::new("x")) as _)
            .with_durable(Arc::clone(&durable) as _)
            .build()
            .unwrap();

        agent.commit_knowledge("the API key lives in the vault").unwrap();

        assert_eq!(durable.len(), 1);
        assert_eq!(durable.facts()[0].category, "knowledge");
        // Forwarded records do not wait for the synchronizer
        assert_eq!(agent.local_store().unsynced_count().unwrap(), 0);
    }

    #[test]
    fn test_commit_knowledge_queues_when_unreachable() {
        let durable = Arc::new(MemoryFactStore::new());
        durable.set_unreachable(true);
        let agent = in_memory_builder(test_config())
            .with_backend(Arc::new(ScriptedBackend::new("x")) as _)
            .with_durable(Arc::clone(&durable) as _)
            .build()
            .unwrap();

        // The write path never surfaces the durable failure
        agent.commit_knowledge("remember this anyway").unwrap();

        assert_eq!(durable.len(), 0);
        assert_eq!(agent.local_store().unsynced_count().unwrap(), 1);
    }

    #[test]
    fn test_positive_feedback_boosts_keywords() {
        let agent = test_agent(Arc::new(ScriptedBackend::new("x")));

        agent.record_feedback(true, "rust macros answer").unwrap();
        let weight = agent.weight_store().weight_for("rust").unwrap().unwrap();
        assert!(weight > 1.0);

        agent.record_feedback(false, "python answer").unwrap();
        assert!(agent.weight_store().weight_for("python").unwrap().is_none());

        let history = agent.weight_store().feedback_history().unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_override_consumed_by_next_plan() {
        let agent = test_agent(Arc::new(ScriptedBackend::new("x")));

        agent.set_override(ModelTier::Pro, EffortLevel::High);
        let first = agent.plan("hello").unwrap();
        assert_eq!(first.tier, ModelTier::Pro);

        let second = agent.plan("hello").unwrap();
        assert_eq!(second.tier, ModelTier::cheapest());
    }

    #[test]
    fn test_plan_does_not_store() {
        let agent = test_agent(Arc::new(ScriptedBackend::new("x")));
        agent.plan("what's the weather?").unwrap();
        assert_eq!(agent.local_store().count().unwrap(), 0);
    }

    #[test]
    fn test_streaming_accumulates_reply() {
        let backend = Arc::new(ScriptedBackend::new("chunked streaming reply"));
        let agent = test_agent(backend);

        let mut chunks = Vec::new();
        let outcome = agent
            .handle_turn_streaming("stream me something", &mut |event| {
                if let StreamEvent::Chunk(chunk) = event {
                    chunks.push(chunk);
                }
            })
            .unwrap();

        assert!(chunks.len() > 1);
        assert_eq!(outcome.reply, "chunked streaming reply");
        let context = agent.local_store().get_context(10).unwrap();
        assert_eq!(context[1].content, "chunked streaming reply");
    }

    #[test]
    fn test_session_id_stamped_on_records() {
        let backend = Arc::new(ScriptedBackend::new("ok"));
        let agent = in_memory_builder(test_config())
            .with_backend(backend as _)
            .with_session("session-7")
            .build()
            .unwrap();

        agent.handle_turn("hello").unwrap();
        let context = agent.local_store().get_context(10).unwrap();
        assert!(context.iter().all(|r| r.session_id.as_deref() == Some("session-7")));
    }

    #[test]
    fn test_status_snapshot() {
        let agent = test_agent(Arc::new(ScriptedBackend::new("ok")));
        agent.handle_turn("hello").unwrap();

        let status = agent.status().unwrap();
        assert_eq!(status.backend, "scripted");
        assert_eq!(status.records, 2);
        assert_eq!(status.unsynced, 2);
        assert_eq!(status.sync_state, crate::sync::SyncState::Stopped);
    }
}
