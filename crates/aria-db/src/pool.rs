//! SQLite connection pool for the history store.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;

/// Runtime tunables for the history database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to create history connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Opens a pool on the SQLite file at `db_path`.
///
/// Connections run in WAL mode with foreign keys enforced, which the history
/// schema relies on to cascade log expiry to its entries.
///
/// # Errors
///
/// Returns `PoolError::PoolInit` if the first connection cannot be opened.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    build(SqliteConnectionManager::file(db_path), settings)
}

/// Opens a pool on a private in-memory database.
///
/// The pool is capped at a single connection: every `:memory:` connection
/// is its own database, so callers queue on that one connection instead.
/// The database lives as long as the pool.
///
/// # Errors
///
/// Returns `PoolError::PoolInit` if the database cannot be opened.
pub fn create_memory_pool(busy_timeout_ms: u64) -> Result<DbPool, PoolError> {
    build(
        SqliteConnectionManager::memory(),
        DbRuntimeSettings {
            busy_timeout_ms,
            pool_max_size: 1,
        },
    )
}

fn build(manager: SqliteConnectionManager, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

    let manager = manager.with_flags(flags).with_init(move |conn| {
        // In-memory databases report "memory" instead of "wal".
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        if journal_mode != "wal" && journal_mode != "memory" {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("failed to set WAL journal mode, got: {journal_mode}")),
            ));
        }
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {};",
            settings.busy_timeout_ms
        ))
    });

    // r2d2 panics on a zero-sized pool.
    let pool = Pool::builder()
        .max_size(settings.pool_max_size.max(1))
        .build(manager)?;
    Ok(pool)
}
