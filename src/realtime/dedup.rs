//! Short-retention cache of recently pushed message ids.
//!
//! Guards against re-delivery when the push path emits the same id twice
//! (retries, duplicate emits). Eviction is amortized: entries are only
//! swept once the table grows past a size threshold, so the table can
//! transiently hold more live entries than the threshold between prunes.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::trace;

const RETENTION: Duration = Duration::from_secs(5 * 60);
const PRUNE_THRESHOLD: usize = 1000;

pub struct DedupWindow {
    entries: Mutex<HashMap<String, Instant>>,
    retention: Duration,
    prune_threshold: usize,
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupWindow {
    pub fn new() -> Self {
        Self::with_limits(RETENTION, PRUNE_THRESHOLD)
    }

    pub fn with_limits(retention: Duration, prune_threshold: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention,
            prune_threshold,
        }
    }

    /// True exactly when `message_id` has not been recorded within the
    /// retention window; records it as a side effect. A false return leaves
    /// the table untouched, so the original recording keeps its timestamp.
    pub async fn should_deliver(&self, message_id: &str) -> bool {
        self.should_deliver_at(message_id, Instant::now()).await
    }

    /// Clock-explicit variant so tests can advance time.
    pub async fn should_deliver_at(&self, message_id: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock().await;

        if let Some(recorded_at) = entries.get(message_id) {
            if now.duration_since(*recorded_at) <= self.retention {
                trace!(message_id, "Suppressed duplicate delivery");
                return false;
            }
        }

        entries.insert(message_id.to_string(), now);

        if entries.len() > self.prune_threshold {
            let retention = self.retention;
            entries.retain(|_, recorded_at| now.duration_since(*recorded_at) <= retention);
            trace!(remaining = entries.len(), "Pruned dedup window");
        }

        true
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_delivery_within_window_is_suppressed() {
        let window = DedupWindow::new();
        assert!(window.should_deliver("m1").await);
        assert!(!window.should_deliver("m1").await);
        assert!(window.should_deliver("m2").await);
    }

    #[tokio::test]
    async fn delivery_allowed_again_after_window_expires() {
        let window = DedupWindow::new();
        let start = Instant::now();

        assert!(window.should_deliver_at("m1", start).await);
        assert!(!window.should_deliver_at("m1", start + Duration::from_secs(299)).await);
        // Past the 5-minute retention the id is treated as fresh.
        assert!(window.should_deliver_at("m1", start + Duration::from_secs(301)).await);
    }

    #[tokio::test]
    async fn prune_evicts_only_expired_entries() {
        let window = DedupWindow::with_limits(Duration::from_secs(300), 3);
        let start = Instant::now();

        assert!(window.should_deliver_at("old", start).await);
        let later = start + Duration::from_secs(400);
        assert!(window.should_deliver_at("a", later).await);
        assert!(window.should_deliver_at("b", later).await);
        assert!(window.should_deliver_at("c", later).await);
        // Crossing the threshold triggers the sweep; only "old" is expired.
        assert_eq!(window.len().await, 3);
        assert!(window.should_deliver_at("old", later).await);
    }

    #[tokio::test]
    async fn table_can_exceed_threshold_with_live_entries() {
        let window = DedupWindow::with_limits(Duration::from_secs(300), 2);
        let now = Instant::now();

        for id in ["a", "b", "c"] {
            assert!(window.should_deliver_at(id, now).await);
        }
        // All three are live, so the prune removes nothing.
        assert_eq!(window.len().await, 3);
    }
}
