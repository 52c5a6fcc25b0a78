//! Status output.

use crate::agent::AgentStatus;
use std::io::{self, Write};

/// Writes the status snapshot as text sections.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_status<W: Write>(writer: &mut W, status: &AgentStatus) -> io::Result<()> {
    writeln!(writer, "Synapt Status")?;
    writeln!(writer, "=============")?;
    writeln!(writer)?;
    writeln!(writer, "Backend: {}", status.backend)?;
    writeln!(writer, "Durable Store: {}", status.durable)?;
    writeln!(writer)?;
    writeln!(
        writer,
        "Records: {} total, {} awaiting sync",
        status.records, status.unsynced
    )?;
    writeln!(writer, "Keyword Weights: {}", status.weights)?;
    writeln!(writer)?;
    writeln!(writer, "Sync Worker: {}", status.sync_state)?;
    writeln!(
        writer,
        "  Cycles: {} completed, {} failed",
        status.sync.cycles_completed, status.sync.cycles_failed
    )?;
    writeln!(writer, "  Records Synced: {}", status.sync.records_synced)?;
    if status.sync.consecutive_failures > 0 {
        writeln!(
            writer,
            "  Consecutive Failures: {}",
            status.sync.consecutive_failures
        )?;
    }
    if let Some(error) = &status.sync.last_error {
        writeln!(writer, "  Last Error: {error}")?;
    }
    writeln!(writer)?;
    if status.tasks.is_empty() {
        writeln!(writer, "Tasks: none")?;
    } else {
        writeln!(writer, "Tasks:")?;
        for (task_status, count) in &status.tasks {
            writeln!(writer, "  {task_status}: {count}")?;
        }
    }
    Ok(())
}

/// Writes the status snapshot as JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_status_json<W: Write>(
    writer: &mut W,
    status: &AgentStatus,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(status)?;
    writeln!(writer, "{json}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{SyncState, SyncStats};
    use std::collections::BTreeMap;

    fn sample_status() -> AgentStatus {
        let mut tasks = BTreeMap::new();
        tasks.insert("completed", 2);
        tasks.insert("running", 1);
        AgentStatus {
            backend: "scripted",
            durable: "memory",
            records: 12,
            unsynced: 3,
            sync_state: SyncState::WaitingInterval,
            sync: SyncStats {
                cycles_completed: 4,
                cycles_failed: 1,
                records_synced: 9,
                consecutive_failures: 0,
                last_error: None,
            },
            tasks,
            weights: 5,
        }
    }

    #[test]
    fn test_write_status_text() {
        let mut buffer = Vec::new();
        write_status(&mut buffer, &sample_status()).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        assert!(output.contains("Records: 12 total, 3 awaiting sync"));
        assert!(output.contains("Sync Worker: waiting-interval"));
        assert!(output.contains("  completed: 2"));
        assert!(!output.contains("Last Error"));
    }

    #[test]
    fn test_write_status_json() {
        let mut buffer = Vec::new();
        write_status_json(&mut buffer, &sample_status()).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        assert!(output.contains("\"backend\": \"scripted\""));
        assert!(output.contains("\"unsynced\": 3"));
    }
}
