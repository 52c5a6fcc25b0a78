//! Full-stack agent tests over file-backed stores.

// Test assertions may panic on failure.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use synapt::llm::ScriptedBackend;
use synapt::models::{EffortLevel, Role, TaskStatus};
use synapt::storage::MemoryFactStore;
use synapt::sync::SyncState;
use synapt::weights::WEIGHT_CAP;
use synapt::{Agent, CoreConfig, TaskHarness};

fn file_config(dir: &tempfile::TempDir) -> CoreConfig {
    let mut config = CoreConfig::default();
    config.data_dir = dir.path().join("data");
    config.sync.auto_start = false;
    config.weights.boost_amount = 0.1;
    config
}

fn scripted_agent(config: CoreConfig, reply: &str) -> Agent {
    Agent::builder(config)
        .with_backend(Arc::new(ScriptedBackend::new(reply)))
        .build()
        .unwrap()
}

fn wait_until(mut condition: impl FnMut() -> bool, deadline: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_turns_persist_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = file_config(&dir);

    {
        let agent = scripted_agent(config.clone(), "the borrow checker enforces aliasing");
        let turn = agent.handle_turn("why does rust have a borrow checker?").unwrap();
        assert_eq!(turn.reply, "the borrow checker enforces aliasing");
    }

    let agent = scripted_agent(config, "unused");
    assert_eq!(agent.local_store().count().unwrap(), 2);

    let found = agent.local_store().recall("borrow", 10).unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().any(|record| record.role == Role::User));
    assert!(found.iter().any(|record| record.role == Role::Assistant));
}

#[test]
fn test_repeated_feedback_caps_weight_and_raises_effort() {
    let dir = tempfile::tempdir().unwrap();
    let agent = scripted_agent(file_config(&dir), "noted");

    let question = "tell me about rust lifetimes";
    let before = agent.plan(question).unwrap();
    assert_eq!(before.effort, EffortLevel::Minimal);

    for _ in 0..50 {
        agent.record_feedback(true, "rust lifetimes ownership").unwrap();
    }

    let weight = agent.weight_store().weight_for("rust").unwrap().unwrap();
    assert!((weight - WEIGHT_CAP).abs() < f32::EPSILON);
    assert_eq!(agent.weight_store().feedback_history().unwrap().len(), 50);

    // The capped weights now bias routing toward more effort.
    let after = agent.plan(question).unwrap();
    assert_eq!(after.effort, EffortLevel::Low);
}

#[test]
fn test_deep_pass_task_persists_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = file_config(&dir);
    let agent = scripted_agent(config.clone(), "fast answer");

    let turn = agent
        .handle_turn("analyze the architecture and compare both storage layouts")
        .unwrap();
    assert_eq!(turn.reply, "fast answer");
    let task_id = turn.deep_task.expect("complex turn should spawn a deep pass");

    assert!(wait_until(
        || {
            agent
                .task_harness()
                .get(&task_id)
                .unwrap()
                .is_some_and(|task| task.status.is_terminal())
        },
        Duration::from_secs(2)
    ));
    drop(agent);

    let tasks = TaskHarness::new(config.tasks_db_path()).unwrap();
    let task = tasks.get(&task_id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.kind, "deep-pass");
    assert_eq!(task.result.as_deref(), Some("fast answer"));
}

#[test]
fn test_status_reports_file_backed_state() {
    let dir = tempfile::tempdir().unwrap();
    let agent = scripted_agent(file_config(&dir), "hello yourself");
    agent.handle_turn("good morning").unwrap();

    let status = agent.status().unwrap();
    assert_eq!(status.backend, "scripted");
    assert_eq!(status.durable, "memory");
    assert_eq!(status.records, 2);
    assert_eq!(status.unsynced, 2);
    assert_eq!(status.sync_state, SyncState::Stopped);
    assert_eq!(status.sync.cycles_completed, 0);
}

#[test]
fn test_knowledge_forwards_when_durable_reachable() {
    let dir = tempfile::tempdir().unwrap();
    let durable = Arc::new(MemoryFactStore::new());
    let agent = Agent::builder(file_config(&dir))
        .with_backend(Arc::new(ScriptedBackend::new("ok")))
        .with_durable(Arc::clone(&durable) as _)
        .build()
        .unwrap();

    agent
        .store_record(Role::Knowledge, "sqlite busy_timeout defaults to zero")
        .unwrap();

    assert_eq!(durable.len(), 1);
    assert_eq!(durable.facts()[0].category, "knowledge");
    assert_eq!(agent.local_store().unsynced_count().unwrap(), 0);
}

#[test]
fn test_unconfigured_durable_keeps_records_queued() {
    let dir = tempfile::tempdir().unwrap();
    let agent = scripted_agent(file_config(&dir), "ok");

    agent.store_record(Role::Knowledge, "queued fact").unwrap();
    assert_eq!(agent.local_store().unsynced_count().unwrap(), 1);

    // The placeholder sink accepts nothing, so a sync cycle is a no-op
    // and the record stays queued for a future endpoint.
    assert_eq!(agent.synchronizer().force_sync().unwrap(), 0);
    assert_eq!(agent.local_store().unsynced_count().unwrap(), 1);
}
