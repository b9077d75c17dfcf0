//! Rolling per-user conversation logs with sliding expiry.
//!
//! Each user owns one log. Appending pushes an entry to the tail and resets
//! the log's expiry to `now + ttl`, so a log disappears only after `ttl` has
//! passed without a write. Reads return the newest entries in insertion
//! order (oldest first).

use crate::pool::DbPool;
use aria_types::{HistoryEntry, Role};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::time::Duration;
use thiserror::Error;

/// Sliding expiry applied to every log on write.
pub const DEFAULT_HISTORY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Number of entries loaded into a session when its context is set.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Entries kept per log. Older rows are trimmed on write.
pub const DEFAULT_HISTORY_MAX_ENTRIES: usize = 200;

#[derive(Debug, Error)]
pub enum HistoryError {
    /// The store could not be reached or the query failed.
    #[error("history cache unavailable: {0}")]
    CacheUnavailable(String),
}

impl From<rusqlite::Error> for HistoryError {
    fn from(e: rusqlite::Error) -> Self {
        Self::CacheUnavailable(e.to_string())
    }
}

impl From<r2d2::Error> for HistoryError {
    fn from(e: r2d2::Error) -> Self {
        Self::CacheUnavailable(e.to_string())
    }
}

/// Async access to conversation history, as used by voice sessions.
#[async_trait]
pub trait HistoryCache: Send + Sync {
    /// Pushes `entry` to the tail of the user's log and refreshes its expiry.
    async fn append(&self, user_id: &str, entry: HistoryEntry) -> Result<(), HistoryError>;

    /// Returns at most `limit` of the user's newest entries, oldest first.
    ///
    /// An unknown or expired log yields an empty list.
    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError>;
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Appends one entry to `user_id`'s log and pushes its expiry to
/// `now_ms + ttl`.
///
/// A log whose expiry has already passed is treated as absent: its old
/// entries are dropped before the new one is written.
pub fn append_entry(
    conn: &Connection,
    user_id: &str,
    entry: &HistoryEntry,
    ttl: Duration,
    now_ms: i64,
) -> Result<(), HistoryError> {
    let expires_at = now_ms.saturating_add(ttl_millis(ttl));

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM conversation_logs WHERE user_id = ?1 AND expires_at <= ?2",
        params![user_id, now_ms],
    )?;
    tx.execute(
        "INSERT INTO conversation_logs (user_id, expires_at) VALUES (?1, ?2)
         ON CONFLICT(user_id) DO UPDATE SET expires_at = excluded.expires_at",
        params![user_id, expires_at],
    )?;
    tx.execute(
        "INSERT INTO conversation_entries (user_id, role, content, timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        params![user_id, entry.role.as_str(), entry.content, entry.timestamp],
    )?;
    tx.commit()?;
    Ok(())
}

/// Drops all but the newest `keep` entries of `user_id`'s log.
///
/// Returns the number of rows deleted.
pub fn trim_log(conn: &Connection, user_id: &str, keep: usize) -> Result<usize, HistoryError> {
    let keep = i64::try_from(keep).unwrap_or(i64::MAX);
    let count = conn.execute(
        "DELETE FROM conversation_entries
         WHERE user_id = ?1 AND id <= (
             SELECT id FROM conversation_entries
             WHERE user_id = ?1
             ORDER BY id DESC
             LIMIT 1 OFFSET ?2
         )",
        params![user_id, keep],
    )?;
    Ok(count)
}

/// Reads the newest `limit` entries of a live log, oldest first.
pub fn recent_entries(
    conn: &Connection,
    user_id: &str,
    limit: usize,
    now_ms: i64,
) -> Result<Vec<HistoryEntry>, HistoryError> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT e.role, e.content, e.timestamp
         FROM conversation_entries e
         JOIN conversation_logs l ON l.user_id = e.user_id
         WHERE e.user_id = ?1 AND l.expires_at > ?2
         ORDER BY e.id DESC
         LIMIT ?3",
    )?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt.query_map(params![user_id, now_ms, limit], |row| {
        let role: String = row.get(0)?;
        Ok((role, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (role, content, timestamp) = row?;
        let role: Role = role.parse().map_err(HistoryError::CacheUnavailable)?;
        entries.push(HistoryEntry {
            role,
            content,
            timestamp,
        });
    }
    entries.reverse();
    Ok(entries)
}

/// Deletes every log (and, by cascade, its entries) whose expiry has passed.
pub fn delete_expired_logs(conn: &Connection, now_ms: i64) -> Result<usize, HistoryError> {
    let count = conn.execute(
        "DELETE FROM conversation_logs WHERE expires_at <= ?1",
        [now_ms],
    )?;
    Ok(count)
}

/// SQLite-backed [`HistoryCache`].
///
/// Queries run on the blocking thread pool so that a slow disk never stalls
/// the connection tasks.
#[derive(Clone)]
pub struct SqliteHistory {
    pool: DbPool,
    ttl: Duration,
    max_entries: usize,
}

impl SqliteHistory {
    pub fn new(pool: DbPool, ttl: Duration) -> Self {
        Self {
            pool,
            ttl,
            max_entries: DEFAULT_HISTORY_MAX_ENTRIES,
        }
    }

    /// Caps how many entries each log keeps. Clamped to at least one.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Removes expired logs, returning how many were deleted.
    pub async fn prune_expired(&self) -> Result<usize, HistoryError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            delete_expired_logs(&conn, now_millis())
        })
        .await
        .map_err(|e| HistoryError::CacheUnavailable(format!("history task failed: {e}")))?
    }
}

#[async_trait]
impl HistoryCache for SqliteHistory {
    async fn append(&self, user_id: &str, entry: HistoryEntry) -> Result<(), HistoryError> {
        let pool = self.pool.clone();
        let ttl = self.ttl;
        let max_entries = self.max_entries;
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            append_entry(&conn, &user_id, &entry, ttl, now_millis())?;
            let trimmed = trim_log(&conn, &user_id, max_entries)?;
            if trimmed > 0 {
                tracing::debug!(user_id = %user_id, trimmed, "trimmed conversation log");
            }
            Ok(())
        })
        .await
        .map_err(|e| HistoryError::CacheUnavailable(format!("history task failed: {e}")))?
    }

    async fn recent(&self, user_id: &str, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        let pool = self.pool.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            recent_entries(&conn, &user_id, limit, now_millis())
        })
        .await
        .map_err(|e| HistoryError::CacheUnavailable(format!("history task failed: {e}")))?
    }
}
