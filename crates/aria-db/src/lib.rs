//! Storage layer for the voice gateway.
//!
//! Conversation history lives in SQLite behind an `r2d2` pool. The schema is
//! created through embedded, versioned migrations, and every per-user log
//! carries a sliding expiry that is refreshed on each write.
//!
//! Session code talks to the store through the async [`HistoryCache`] trait;
//! [`SqliteHistory`] is the production implementation.

mod history;
mod migrations;
mod pool;

pub use history::{
    append_entry, delete_expired_logs, recent_entries, trim_log, HistoryCache, HistoryError,
    SqliteHistory, DEFAULT_HISTORY_MAX_ENTRIES, DEFAULT_HISTORY_TTL, DEFAULT_HISTORY_WINDOW,
};
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_memory_pool, create_pool, DbPool, DbRuntimeSettings, PoolError};
