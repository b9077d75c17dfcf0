//! Background tasks for the voice gateway.
//!
//! Includes:
//! - Pruning expired conversation logs.

use aria_db::SqliteHistory;
use tokio::time::{sleep, Duration};

/// Starts the history pruning task.
///
/// Reads already ignore expired logs; this task reclaims their rows. It runs
/// until the runtime shuts down.
pub async fn start_history_pruning_task(history: SqliteHistory, interval_seconds: u64) {
    if interval_seconds == 0 {
        tracing::warn!("history pruning task disabled (interval=0)");
        return;
    }

    let interval = Duration::from_secs(interval_seconds);
    tracing::info!(interval_seconds, "starting history pruning task");

    loop {
        sleep(interval).await;

        match history.prune_expired().await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "pruned expired conversation logs"),
            Err(e) => tracing::error!("failed to prune conversation logs: {}", e),
        }
    }
}
