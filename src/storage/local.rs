//! Embedded low-latency store for conversation records.
//!
//! All writes are synchronous and local-only: nothing here ever talks to the
//! durable store. Cross-tier propagation is the synchronizer's job.

use super::{acquire_lock, escape_like_wildcards};
use crate::models::{ConversationRecord, RecordId, Role};
use crate::{Error, Result};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

/// `SQLite`-backed store for conversation records.
///
/// Single-writer from the foreground path, single-reader/marker from the
/// synchronizer. The `synced` flag is monotonic: [`LocalStore::mark_synced`]
/// only ever sets it, and no other operation touches it.
pub struct LocalStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the `SQLite` database (None for in-memory).
    db_path: Option<PathBuf>,
}

struct RecordRow {
    id: String,
    timestamp: i64,
    role: String,
    content: String,
    keywords: Option<String>,
    session_id: Option<String>,
    synced: bool,
}

impl LocalStore {
    /// Creates a new local store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| Error::OperationFailed {
            operation: "open_record_store".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };

        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory local store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_record_store_memory".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };

        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Initializes the database schema.
    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);

        // Enable WAL mode for better concurrent read performance
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");

        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                keywords TEXT,
                session_id TEXT,
                synced INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_records_table".to_string(),
            cause: e.to_string(),
        })?;

        Self::create_indexes(&conn);

        Ok(())
    }

    /// Creates indexes for common query patterns.
    fn create_indexes(conn: &Connection) {
        // Unsynced scan is the synchronizer's hot query
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_synced ON records(synced)",
            [],
        );

        // Recency ordering for recall and context windows
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_timestamp ON records(timestamp DESC)",
            [],
        );

        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_session ON records(session_id)",
            [],
        );
    }

    /// Stores a record and returns its id.
    ///
    /// Synchronous and local-only; never blocks on the durable store.
    #[instrument(
        skip(self, record),
        fields(operation = "store", record.id = %record.id.as_str(), role = %record.role)
    )]
    pub fn store(&self, record: &ConversationRecord) -> Result<RecordId> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);

            #[allow(clippy::cast_possible_wrap)]
            let timestamp_i64 = record.timestamp as i64;
            let keywords_str = if record.keywords.is_empty() {
                None
            } else {
                Some(record.keywords.join(","))
            };

            conn.execute(
                "INSERT INTO records (id, timestamp, role, content, keywords, session_id, synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id.as_str(),
                    timestamp_i64,
                    record.role.as_str(),
                    record.content,
                    keywords_str,
                    record.session_id,
                    record.synced,
                ],
            )
            .map_err(|e| Error::OperationFailed {
                operation: "store_record".to_string(),
                cause: e.to_string(),
            })?;

            Ok(record.id.clone())
        })();

        self.record_operation_metrics("store", start, if result.is_ok() { "ok" } else { "error" });
        result
    }

    /// Substring search over record content, most recent first.
    #[instrument(skip(self), fields(operation = "recall", limit))]
    pub fn recall(&self, query: &str, limit: usize) -> Result<Vec<ConversationRecord>> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);

            let pattern = format!("%{}%", escape_like_wildcards(query));
            let mut stmt = conn
                .prepare(
                    "SELECT id, timestamp, role, content, keywords, session_id, synced
                     FROM records
                     WHERE content LIKE ?1 ESCAPE '\\'
                     ORDER BY timestamp DESC, rowid DESC
                     LIMIT ?2",
                )
                .map_err(|e| Error::OperationFailed {
                    operation: "prepare_recall".to_string(),
                    cause: e.to_string(),
                })?;

            let rows = stmt
                .query_map(params![pattern, limit], read_record_row)
                .map_err(|e| Error::OperationFailed {
                    operation: "recall_records".to_string(),
                    cause: e.to_string(),
                })?;

            collect_records(rows)
        })();

        self.record_operation_metrics("recall", start, if result.is_ok() { "ok" } else { "error" });
        result
    }

    /// Returns the most recent `n` records in chronological (oldest-first)
    /// order, for feeding back into routing and generation.
    #[instrument(skip(self), fields(operation = "get_context", n))]
    pub fn get_context(&self, n: usize) -> Result<Vec<ConversationRecord>> {
        let conn = acquire_lock(&self.conn);

        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, role, content, keywords, session_id, synced
                 FROM records
                 ORDER BY timestamp DESC, rowid DESC
                 LIMIT ?1",
            )
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_get_context".to_string(),
                cause: e.to_string(),
            })?;

        let rows = stmt
            .query_map(params![n], read_record_row)
            .map_err(|e| Error::OperationFailed {
                operation: "get_context".to_string(),
                cause: e.to_string(),
            })?;

        let mut records = collect_records(rows)?;
        records.reverse();
        Ok(records)
    }

    /// Returns all records not yet pushed to the durable store, oldest first.
    #[instrument(skip(self), fields(operation = "get_unsynced"))]
    pub fn get_unsynced(&self) -> Result<Vec<ConversationRecord>> {
        let conn = acquire_lock(&self.conn);

        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, role, content, keywords, session_id, synced
                 FROM records
                 WHERE synced = 0
                 ORDER BY timestamp ASC, rowid ASC",
            )
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_get_unsynced".to_string(),
                cause: e.to_string(),
            })?;

        let rows = stmt
            .query_map([], read_record_row)
            .map_err(|e| Error::OperationFailed {
                operation: "get_unsynced".to_string(),
                cause: e.to_string(),
            })?;

        collect_records(rows)
    }

    /// Marks the given records as synced and returns how many rows changed.
    ///
    /// Idempotent: ids that are already synced (or unknown) are skipped
    /// without error, and the flag is never cleared.
    #[instrument(skip(self, ids), fields(operation = "mark_synced", count = ids.len()))]
    pub fn mark_synced(&self, ids: &[RecordId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        let result = (|| {
            let mut conn = acquire_lock(&self.conn);

            let tx = conn.transaction().map_err(|e| Error::OperationFailed {
                operation: "begin_mark_synced".to_string(),
                cause: e.to_string(),
            })?;

            let mut changed = 0;
            for id in ids {
                changed += tx
                    .execute(
                        "UPDATE records SET synced = 1 WHERE id = ?1 AND synced = 0",
                        params![id.as_str()],
                    )
                    .map_err(|e| Error::OperationFailed {
                        operation: "mark_synced".to_string(),
                        cause: e.to_string(),
                    })?;
            }

            tx.commit().map_err(|e| Error::OperationFailed {
                operation: "commit_mark_synced".to_string(),
                cause: e.to_string(),
            })?;

            Ok(changed)
        })();

        self.record_operation_metrics(
            "mark_synced",
            start,
            if result.is_ok() { "ok" } else { "error" },
        );
        result
    }

    /// Returns the total number of records.
    pub fn count(&self) -> Result<u64> {
        self.count_where("SELECT COUNT(*) FROM records")
    }

    /// Returns the number of records not yet synced.
    pub fn unsynced_count(&self) -> Result<u64> {
        self.count_where("SELECT COUNT(*) FROM records WHERE synced = 0")
    }

    /// Deletes every record. Test/reset use only.
    pub fn clear(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute("DELETE FROM records", [])
            .map_err(|e| Error::OperationFailed {
                operation: "clear_records".to_string(),
                cause: e.to_string(),
            })?;
        Ok(())
    }

    fn count_where(&self, sql: &str) -> Result<u64> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|e| Error::OperationFailed {
                operation: "count_records".to_string(),
                cause: e.to_string(),
            })?;
        #[allow(clippy::cast_sign_loss)]
        Ok(count as u64)
    }

    fn record_operation_metrics(
        &self,
        operation: &'static str,
        start: Instant,
        status: &'static str,
    ) {
        metrics::counter!(
            "storage_operations_total",
            "store" => "local",
            "operation" => operation,
            "status" => status
        )
        .increment(1);
        metrics::histogram!(
            "storage_operation_duration_ms",
            "store" => "local",
            "operation" => operation,
            "status" => status
        )
        .record(start.elapsed().as_secs_f64() * 1000.0);
    }
}

fn read_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        keywords: row.get(4)?,
        session_id: row.get(5)?,
        synced: row.get(6)?,
    })
}

fn collect_records(
    rows: impl Iterator<Item = rusqlite::Result<RecordRow>>,
) -> Result<Vec<ConversationRecord>> {
    let mut records = Vec::new();
    for row in rows {
        let row = row.map_err(|e| Error::OperationFailed {
            operation: "read_record_row".to_string(),
            cause: e.to_string(),
        })?;
        records.push(build_record_from_row(row));
    }
    Ok(records)
}

fn build_record_from_row(row: RecordRow) -> ConversationRecord {
    let keywords: Vec<String> = row
        .keywords
        .map(|k| {
            k.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    #[allow(clippy::cast_sign_loss)]
    let timestamp_u64 = row.timestamp as u64;

    ConversationRecord {
        id: RecordId::new(row.id),
        timestamp: timestamp_u64,
        role: Role::parse(&row.role).unwrap_or_default(),
        content: row.content,
        keywords,
        session_id: row.session_id,
        synced: row.synced,
    }
}
