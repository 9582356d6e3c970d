//! Process-wide live mapping of user id to active push connection.
//!
//! One entry per user, last connection wins. The table is injected through
//! `AppState` with an explicit lifecycle (built at startup, cleared at
//! shutdown) rather than living in a module-level static.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::realtime::events::ServerEvent;

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

struct Entry {
    connection_id: u64,
    tx: EventSender,
}

#[derive(Default)]
pub struct PresenceTable {
    entries: RwLock<HashMap<String, Entry>>,
    next_connection_id: AtomicU64,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live connection for `user_id`, replacing any previous one.
    /// Returns the connection id (needed to disconnect later) and the online
    /// id set to broadcast.
    pub async fn connect(&self, user_id: String, tx: EventSender) -> (u64, Vec<String>) {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.write().await;
        if entries
            .insert(user_id.clone(), Entry { connection_id, tx })
            .is_some()
        {
            debug!(user_id = %user_id, "Replaced existing presence entry");
        }

        (connection_id, sorted_ids(&entries))
    }

    /// Remove the entry owned by `connection_id` (reverse lookup). Stale
    /// disconnects are a no-op: if the user reconnected, the live entry
    /// carries a newer connection id and must survive.
    pub async fn disconnect(&self, connection_id: u64) -> Option<(String, Vec<String>)> {
        let mut entries = self.entries.write().await;

        let user_id = entries
            .iter()
            .find(|(_, entry)| entry.connection_id == connection_id)
            .map(|(id, _)| id.clone())?;

        entries.remove(&user_id);
        Some((user_id, sorted_ids(&entries)))
    }

    pub async fn lookup(&self, user_id: &str) -> Option<EventSender> {
        self.entries
            .read()
            .await
            .get(user_id)
            .map(|entry| entry.tx.clone())
    }

    pub async fn online_ids(&self) -> Vec<String> {
        sorted_ids(&*self.entries.read().await)
    }

    /// Fire-and-forget fan-out to every live connection. A closed channel
    /// means the connection task is already tearing down; skip it.
    pub async fn broadcast(&self, event: ServerEvent) {
        let entries = self.entries.read().await;
        for entry in entries.values() {
            let _ = entry.tx.send(event.clone());
        }
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

fn sorted_ids(entries: &HashMap<String, Entry>) -> Vec<String> {
    let mut ids: Vec<String> = entries.keys().cloned().collect();
    ids.sort();
    ids
}
