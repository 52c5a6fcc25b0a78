//! Storage layer: the local conversation record store and the durable
//! fact log.
//!
//! The local store is an embedded `SQLite` database; the durable store is a
//! remote append-only log reached over HTTP, with an in-memory stand-in for
//! tests and offline use. The two tiers are reconciled by the synchronizer,
//! never by the stores themselves.

mod durable;
mod local;

pub use durable::{DurableStore, HttpFactStore, MemoryFactStore};
pub use local::LocalStore;

use std::sync::{Mutex, MutexGuard};

/// Helper to acquire a mutex lock with poison recovery.
///
/// If the mutex is poisoned (due to a panic in a previous critical section),
/// we recover the inner value and log a warning. This prevents cascading
/// failures when one operation panics.
pub(crate) fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("store mutex was poisoned, recovering");
            metrics::counter!("store_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Escapes SQL LIKE wildcards in a string.
///
/// `SQLite` LIKE patterns treat `%` as "any characters" and `_` as "single
/// character". User input containing these characters must be escaped to be
/// treated literally. Uses `\` as the escape character (requires
/// `ESCAPE '\'` in the LIKE clause).
pub(crate) fn escape_like_wildcards(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' | '_' | '\\' => {
                result.push('\\');
                result.push(c);
            },
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like_wildcards("100%"), "100\\%");
        assert_eq!(escape_like_wildcards("user_name"), "user\\_name");
        assert_eq!(escape_like_wildcards("path\\file"), "path\\\\file");
        assert_eq!(escape_like_wildcards("plain"), "plain");
    }
}
