//! Foreground sync watching.

use crate::sync::Synchronizer;
use std::io::{self, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

/// Polls the synchronizer until `stop` fires, writing a line whenever
/// its state or counters change.
///
/// The caller owns worker lifecycle and signal wiring; this only
/// renders. A closed `stop` channel counts as a stop request.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn run_watch<W: Write>(
    writer: &mut W,
    sync: &Synchronizer,
    poll: Duration,
    stop: &Receiver<()>,
) -> io::Result<()> {
    let mut last_line = String::new();

    loop {
        let line = status_line(sync);
        if line != last_line {
            writeln!(writer, "{line}")?;
            writer.flush()?;
            last_line = line;
        }

        match stop.recv_timeout(poll) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
            Err(RecvTimeoutError::Timeout) => {},
        }
    }
}

fn status_line(sync: &Synchronizer) -> String {
    let state = sync.state();
    let stats = sync.stats();
    let mut line = format!(
        "[{state}] cycles: {} ({} failed), records synced: {}",
        stats.cycles_completed, stats.cycles_failed, stats.records_synced
    );
    if let Some(error) = &stats.last_error {
        line.push_str(&format!(", last error: {error}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LocalStore, MemoryFactStore};
    use std::sync::Arc;
    use std::sync::mpsc;

    fn idle_synchronizer() -> Synchronizer {
        let local = Arc::new(LocalStore::in_memory().unwrap());
        let durable = Arc::new(MemoryFactStore::new());
        Synchronizer::new(local, durable)
    }

    #[test]
    fn test_watch_stops_on_signal() {
        let sync = idle_synchronizer();
        let (tx, rx) = mpsc::channel();
        tx.send(()).unwrap();

        let mut buffer = Vec::new();
        run_watch(&mut buffer, &sync, Duration::from_millis(10), &rx).unwrap();

        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("[stopped]"));
        assert!(output.contains("records synced: 0"));
    }

    #[test]
    fn test_watch_stops_when_sender_dropped() {
        let sync = idle_synchronizer();
        let (tx, rx) = mpsc::channel::<()>();
        drop(tx);

        let mut buffer = Vec::new();
        run_watch(&mut buffer, &sync, Duration::from_millis(10), &rx).unwrap();

        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_watch_prints_unchanged_state_once() {
        let sync = idle_synchronizer();
        let (tx, rx) = mpsc::channel();

        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let _ = tx.send(());
        });

        let mut buffer = Vec::new();
        run_watch(&mut buffer, &sync, Duration::from_millis(5), &rx).unwrap();
        sender.join().unwrap();

        let output = String::from_utf8(buffer).unwrap();
        assert_eq!(output.lines().count(), 1);
    }
}
