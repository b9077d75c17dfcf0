//! Process-wide registry of open voice connections.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Transport-side handle for one open connection.
///
/// The registry holds no sender for the connection's outbound queue, so the
/// writer task sees the queue close once its session is gone.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Cancelling this token tears the connection down.
    pub cancel: CancellationToken,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            connected_at: Utc::now(),
        }
    }
}

/// Map from connection id to transport handle.
///
/// Sessions never read each other's entries; the registry exists for
/// diagnostics and for closing every connection on shutdown.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Uuid, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: Uuid, handle: ConnectionHandle) {
        let previous = self.connections.write().await.insert(id, handle);
        if previous.is_some() {
            tracing::warn!(connection_id = %id, "replaced existing registry entry");
        }
    }

    /// Removes the entry for `id`. Removing an unknown id is a no-op.
    pub async fn deregister(&self, id: Uuid) -> Option<ConnectionHandle> {
        self.connections.write().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Cancels every open connection. Entries are removed by their own
    /// tasks as they wind down.
    pub async fn close_all(&self) -> usize {
        let connections = self.connections.read().await;
        for handle in connections.values() {
            handle.cancel.cancel();
        }
        connections.len()
    }
}
