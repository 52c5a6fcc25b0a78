//! Adaptive keyword weights and feedback history.
//!
//! Weights bias future routing toward topics the user cared about. The
//! table is self-bounding: boosts cap at [`WEIGHT_CAP`], decay pulls
//! entries toward [`WEIGHT_FLOOR`], and entries that reach the floor are
//! pruned entirely.

use crate::storage::acquire_lock;
use crate::{Error, Result};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

/// Lower bound for stored weights; entries decayed to it are pruned.
pub const WEIGHT_FLOOR: f32 = 0.5;

/// Upper bound for stored weights.
pub const WEIGHT_CAP: f32 = 5.0;

/// Starting weight for a keyword boosted for the first time.
pub const DEFAULT_WEIGHT: f32 = 1.0;

/// Number of feedback entries retained.
pub const FEEDBACK_HISTORY_CAP: usize = 100;

/// One recorded feedback event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEntry {
    /// Unix timestamp of the event.
    pub timestamp: u64,
    /// Whether the feedback was positive.
    pub positive: bool,
    /// Free-form context (the turn or topic the feedback applies to).
    pub context: String,
}

/// Positive/negative feedback tallies for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCounter {
    /// Day in `YYYY-MM-DD` form (UTC).
    pub day: String,
    /// Positive feedback count.
    pub positive: u64,
    /// Negative feedback count.
    pub negative: u64,
}

/// `SQLite`-backed store for keyword weights and feedback.
pub struct WeightStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the `SQLite` database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl WeightStore {
    /// Creates a new weight store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| Error::OperationFailed {
            operation: "open_weight_store".to_string(),
            cause: e.to_string(),
        })?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };

        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory weight store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
            operation: "open_weight_store_memory".to_string(),
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

        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS weights (
                keyword TEXT PRIMARY KEY,
                weight REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                positive INTEGER NOT NULL,
                context TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS feedback_days (
                day TEXT PRIMARY KEY,
                positive INTEGER NOT NULL DEFAULT 0,
                negative INTEGER NOT NULL DEFAULT 0
            );",
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_weight_tables".to_string(),
            cause: e.to_string(),
        })?;

        Ok(())
    }

    /// Records one feedback event.
    ///
    /// Appends to the bounded history (oldest entries beyond
    /// [`FEEDBACK_HISTORY_CAP`] are dropped) and bumps the per-day counter.
    #[instrument(skip(self, context), fields(operation = "record_feedback", positive))]
    pub fn record_feedback(&self, positive: bool, context: &str) -> Result<()> {
        let start = Instant::now();
        let result = (|| {
            let mut conn = acquire_lock(&self.conn);

            let tx = conn.transaction().map_err(|e| Error::OperationFailed {
                operation: "begin_record_feedback".to_string(),
                cause: e.to_string(),
            })?;

            #[allow(clippy::cast_possible_wrap)]
            let timestamp = crate::current_timestamp() as i64;
            tx.execute(
                "INSERT INTO feedback (timestamp, positive, context) VALUES (?1, ?2, ?3)",
                params![timestamp, positive, context],
            )
            .map_err(|e| Error::OperationFailed {
                operation: "insert_feedback".to_string(),
                cause: e.to_string(),
            })?;

            tx.execute(
                "DELETE FROM feedback WHERE id NOT IN (
                    SELECT id FROM feedback ORDER BY id DESC LIMIT ?1
                )",
                params![FEEDBACK_HISTORY_CAP],
            )
            .map_err(|e| Error::OperationFailed {
                operation: "trim_feedback".to_string(),
                cause: e.to_string(),
            })?;

            let day = chrono::Utc::now().format("%Y-%m-%d").to_string();
            let (pos, neg) = if positive { (1, 0) } else { (0, 1) };
            tx.execute(
                "INSERT INTO feedback_days (day, positive, negative) VALUES (?1, ?2, ?3)
                 ON CONFLICT(day) DO UPDATE SET
                     positive = positive + excluded.positive,
                     negative = negative + excluded.negative",
                params![day, pos, neg],
            )
            .map_err(|e| Error::OperationFailed {
                operation: "bump_feedback_day".to_string(),
                cause: e.to_string(),
            })?;

            tx.commit().map_err(|e| Error::OperationFailed {
                operation: "commit_record_feedback".to_string(),
                cause: e.to_string(),
            })
        })();

        self.record_operation_metrics(
            "record_feedback",
            start,
            if result.is_ok() { "ok" } else { "error" },
        );
        result
    }

    /// Boosts the given keywords by `amount`, capped at [`WEIGHT_CAP`].
    ///
    /// Keywords without an entry start from [`DEFAULT_WEIGHT`].
    ///
    /// # Errors
    ///
    /// Returns an error if `amount` is not a finite positive number or the
    /// write fails.
    #[instrument(skip(self, keywords), fields(operation = "boost_keywords", count = keywords.len()))]
    pub fn boost_keywords(&self, keywords: &[String], amount: f32) -> Result<()> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "boost amount must be a finite positive number, got {amount}"
            )));
        }

        let start = Instant::now();
        let result = (|| {
            let mut conn = acquire_lock(&self.conn);

            let tx = conn.transaction().map_err(|e| Error::OperationFailed {
                operation: "begin_boost_keywords".to_string(),
                cause: e.to_string(),
            })?;

            for keyword in keywords {
                let keyword = keyword.trim().to_lowercase();
                if keyword.is_empty() {
                    continue;
                }
                tx.execute(
                    "INSERT INTO weights (keyword, weight) VALUES (?1, MIN(?2, ?3 + ?4))
                     ON CONFLICT(keyword) DO UPDATE SET
                         weight = MIN(?2, weight + ?4)",
                    params![
                        keyword,
                        f64::from(WEIGHT_CAP),
                        f64::from(DEFAULT_WEIGHT),
                        f64::from(amount),
                    ],
                )
                .map_err(|e| Error::OperationFailed {
                    operation: "boost_keyword".to_string(),
                    cause: e.to_string(),
                })?;
            }

            tx.commit().map_err(|e| Error::OperationFailed {
                operation: "commit_boost_keywords".to_string(),
                cause: e.to_string(),
            })
        })();

        self.record_operation_metrics(
            "boost_keywords",
            start,
            if result.is_ok() { "ok" } else { "error" },
        );
        result
    }

    /// Decays every weight by `rate` toward [`WEIGHT_FLOOR`] and prunes
    /// entries that reach the floor. Returns how many entries were pruned.
    ///
    /// # Errors
    ///
    /// Returns an error if `rate` is not a finite positive number or the
    /// write fails.
    #[instrument(skip(self), fields(operation = "decay_keywords", rate))]
    pub fn decay_keywords(&self, rate: f32) -> Result<usize> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "decay rate must be a finite positive number, got {rate}"
            )));
        }

        let start = Instant::now();
        let result = (|| {
            let mut conn = acquire_lock(&self.conn);

            let tx = conn.transaction().map_err(|e| Error::OperationFailed {
                operation: "begin_decay_keywords".to_string(),
                cause: e.to_string(),
            })?;

            tx.execute(
                "UPDATE weights SET weight = MAX(?1, weight - ?2)",
                params![f64::from(WEIGHT_FLOOR), f64::from(rate)],
            )
            .map_err(|e| Error::OperationFailed {
                operation: "decay_keywords".to_string(),
                cause: e.to_string(),
            })?;

            let pruned = tx
                .execute(
                    "DELETE FROM weights WHERE weight <= ?1",
                    params![f64::from(WEIGHT_FLOOR)],
                )
                .map_err(|e| Error::OperationFailed {
                    operation: "prune_weights".to_string(),
                    cause: e.to_string(),
                })?;

            tx.commit().map_err(|e| Error::OperationFailed {
                operation: "commit_decay_keywords".to_string(),
                cause: e.to_string(),
            })?;

            Ok(pruned)
        })();

        self.record_operation_metrics(
            "decay_keywords",
            start,
            if result.is_ok() { "ok" } else { "error" },
        );
        result
    }

    /// Returns the stored weight for a keyword, if any.
    pub fn weight_for(&self, keyword: &str) -> Result<Option<f32>> {
        let conn = acquire_lock(&self.conn);
        let keyword = keyword.trim().to_lowercase();

        let weight: Option<f64> = conn
            .query_row(
                "SELECT weight FROM weights WHERE keyword = ?1",
                params![keyword],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| {
                if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                    Ok(None)
                } else {
                    Err(Error::OperationFailed {
                        operation: "weight_for".to_string(),
                        cause: e.to_string(),
                    })
                }
            })?;

        #[allow(clippy::cast_possible_truncation)]
        Ok(weight.map(|w| w as f32))
    }

    /// Returns all weight entries, heaviest first.
    pub fn weights(&self) -> Result<Vec<(String, f32)>> {
        let conn = acquire_lock(&self.conn);

        let mut stmt = conn
            .prepare("SELECT keyword, weight FROM weights ORDER BY weight DESC, keyword ASC")
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_weights".to_string(),
                cause: e.to_string(),
            })?;

        let rows = stmt
            .query_map([], |row| {
                let keyword: String = row.get(0)?;
                let weight: f64 = row.get(1)?;
                Ok((keyword, weight))
            })
            .map_err(|e| Error::OperationFailed {
                operation: "read_weights".to_string(),
                cause: e.to_string(),
            })?;

        let mut entries = Vec::new();
        for row in rows {
            let (keyword, weight) = row.map_err(|e| Error::OperationFailed {
                operation: "read_weight_row".to_string(),
                cause: e.to_string(),
            })?;
            #[allow(clippy::cast_possible_truncation)]
            entries.push((keyword, weight as f32));
        }
        Ok(entries)
    }

    /// Returns the feedback history, most recent first.
    pub fn feedback_history(&self) -> Result<Vec<FeedbackEntry>> {
        let conn = acquire_lock(&self.conn);

        let mut stmt = conn
            .prepare(
                "SELECT timestamp, positive, context FROM feedback ORDER BY id DESC",
            )
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_feedback_history".to_string(),
                cause: e.to_string(),
            })?;

        let rows = stmt
            .query_map([], |row| {
                let timestamp: i64 = row.get(0)?;
                let positive: bool = row.get(1)?;
                let context: String = row.get(2)?;
                Ok((timestamp, positive, context))
            })
            .map_err(|e| Error::OperationFailed {
                operation: "read_feedback_history".to_string(),
                cause: e.to_string(),
            })?;

        let mut entries = Vec::new();
        for row in rows {
            let (timestamp, positive, context) = row.map_err(|e| Error::OperationFailed {
                operation: "read_feedback_row".to_string(),
                cause: e.to_string(),
            })?;
            #[allow(clippy::cast_sign_loss)]
            entries.push(FeedbackEntry {
                timestamp: timestamp as u64,
                positive,
                context,
            });
        }
        Ok(entries)
    }

    /// Returns per-day feedback counters, most recent day first.
    pub fn day_counters(&self) -> Result<Vec<DayCounter>> {
        let conn = acquire_lock(&self.conn);

        let mut stmt = conn
            .prepare("SELECT day, positive, negative FROM feedback_days ORDER BY day DESC")
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_day_counters".to_string(),
                cause: e.to_string(),
            })?;

        let rows = stmt
            .query_map([], |row| {
                let day: String = row.get(0)?;
                let positive: i64 = row.get(1)?;
                let negative: i64 = row.get(2)?;
                Ok((day, positive, negative))
            })
            .map_err(|e| Error::OperationFailed {
                operation: "read_day_counters".to_string(),
                cause: e.to_string(),
            })?;

        let mut counters = Vec::new();
        for row in rows {
            let (day, positive, negative) = row.map_err(|e| Error::OperationFailed {
                operation: "read_day_counter_row".to_string(),
                cause: e.to_string(),
            })?;
            #[allow(clippy::cast_sign_loss)]
            counters.push(DayCounter {
                day,
                positive: positive as u64,
                negative: negative as u64,
            });
        }
        Ok(counters)
    }

    /// Returns the number of weight entries.
    pub fn len(&self) -> Result<u64> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM weights", [], |row| row.get(0))
            .map_err(|e| Error::OperationFailed {
                operation: "count_weights".to_string(),
                cause: e.to_string(),
            })?;
        #[allow(clippy::cast_sign_loss)]
        Ok(count as u64)
    }

    /// Returns true when no weights are stored.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn record_operation_metrics(
        &self,
        operation: &'static str,
        start: Instant,
        status: &'static str,
    ) {
        metrics::counter!(
            "storage_operations_total",
            "store" => "weights",
            "operation" => operation,
            "status" => status
        )
        .increment(1);
        metrics::histogram!(
            "storage_operation_duration_ms",
            "store" => "weights",
            "operation" => operation,
            "status" => status
        )
        .record(start.elapsed().as_secs_f64() * 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boost_creates_entry_from_default() {
        let store = WeightStore::in_memory().unwrap();
        store.boost_keywords(&["rust".to_string()], 0.1).unwrap();

        let weight = store.weight_for("rust").unwrap().unwrap();
        assert!((weight - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_boost_caps_at_upper_bound() {
        let store = WeightStore::in_memory().unwrap();
        for _ in 0..50 {
            store.boost_keywords(&["rust".to_string()], 0.1).unwrap();
        }

        let weight = store.weight_for("rust").unwrap().unwrap();
        assert!((weight - WEIGHT_CAP).abs() < 1e-6);
    }

    #[test]
    fn test_boost_normalizes_keywords() {
        let store = WeightStore::in_memory().unwrap();
        store.boost_keywords(&["  Rust ".to_string()], 0.5).unwrap();
        assert!(store.weight_for("rust").unwrap().is_some());
        assert!(store.weight_for("RUST").unwrap().is_some());
    }

    #[test]
    fn test_boost_rejects_bad_amounts() {
        let store = WeightStore::in_memory().unwrap();
        assert!(store.boost_keywords(&["rust".to_string()], 0.0).is_err());
        assert!(store.boost_keywords(&["rust".to_string()], -1.0).is_err());
        assert!(store.boost_keywords(&["rust".to_string()], f32::NAN).is_err());
    }

    #[test]
    fn test_decay_lowers_weights() {
        let store = WeightStore::in_memory().unwrap();
        store.boost_keywords(&["rust".to_string()], 2.0).unwrap();

        store.decay_keywords(0.5).unwrap();
        let weight = store.weight_for("rust").unwrap().unwrap();
        assert!((weight - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_decay_prunes_entries_at_floor() {
        let store = WeightStore::in_memory().unwrap();
        store.boost_keywords(&["fading".to_string()], 0.1).unwrap();
        store.boost_keywords(&["strong".to_string()], 2.0).unwrap();

        let pruned = store.decay_keywords(0.7).unwrap();

        assert_eq!(pruned, 1);
        assert!(store.weight_for("fading").unwrap().is_none());
        let strong = store.weight_for("strong").unwrap().unwrap();
        assert!((strong - 2.3).abs() < 1e-6);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_feedback_history_capped() {
        let store = WeightStore::in_memory().unwrap();
        for i in 0..120 {
            store.record_feedback(i % 2 == 0, &format!("turn {i}")).unwrap();
        }

        let history = store.feedback_history().unwrap();
        assert_eq!(history.len(), FEEDBACK_HISTORY_CAP);
        assert_eq!(history[0].context, "turn 119");
        assert_eq!(history.last().unwrap().context, "turn 20");
    }

    #[test]
    fn test_feedback_day_counters() {
        let store = WeightStore::in_memory().unwrap();
        store.record_feedback(true, "good answer").unwrap();
        store.record_feedback(true, "also good").unwrap();
        store.record_feedback(false, "missed the point").unwrap();

        let counters = store.day_counters().unwrap();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].positive, 2);
        assert_eq!(counters[0].negative, 1);
    }

    #[test]
    fn test_weights_listing_heaviest_first() {
        let store = WeightStore::in_memory().unwrap();
        store.boost_keywords(&["light".to_string()], 0.1).unwrap();
        store.boost_keywords(&["heavy".to_string()], 3.0).unwrap();

        let weights = store.weights().unwrap();
        assert_eq!(weights[0].0, "heavy");
        assert_eq!(weights[1].0, "light");
    }

    #[test]
    fn test_unknown_keyword_has_no_weight() {
        let store = WeightStore::in_memory().unwrap();
        assert!(store.weight_for("unseen").unwrap().is_none());
    }

    #[test]
    fn test_on_disk_weights_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.db");
        {
            let store = WeightStore::new(&path).unwrap();
            store.boost_keywords(&["persisted".to_string()], 1.0).unwrap();
        }
        let reopened = WeightStore::new(&path).unwrap();
        let weight = reopened.weight_for("persisted").unwrap().unwrap();
        assert!((weight - 2.0).abs() < 1e-6);
        assert_eq!(reopened.db_path(), Some(path.as_path()));
    }
}
