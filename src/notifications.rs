//! Per-player notification log with age-based cleanup.

use crate::errors::{CoreResult, StoreError};
use crate::storage::KeyValueStore;
use crate::types::{now_millis, Notification, WalletAddress};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const NOTIFICATIONS_PATH: &str = "notifications";

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

fn player_notifications_path(address: &WalletAddress) -> String {
    format!("{}/{}", NOTIFICATIONS_PATH, address)
}

#[derive(Clone)]
pub struct NotificationStore {
    store: Arc<dyn KeyValueStore>,
}

impl NotificationStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn send(&self, to: &WalletAddress, message: &str) -> CoreResult<(String, Notification)> {
        let notification = Notification {
            message: message.to_string(),
            timestamp: now_millis(),
            is_read: false,
        };
        let key = self
            .store
            .push(
                &player_notifications_path(to),
                serde_json::to_value(&notification).map_err(StoreError::Serialization)?,
            )
            .await?;
        Ok((key, notification))
    }

    /// Remove notifications older than `days` across all players, in
    /// one multi-path update. Returns the number removed.
    pub async fn cleanup_older_than(&self, days: i64) -> CoreResult<usize> {
        let cutoff = now_millis() - days * MILLIS_PER_DAY;
        let Some(all) = self.store.read(NOTIFICATIONS_PATH).await? else {
            return Ok(0);
        };
        let Some(by_player) = all.as_object() else {
            return Ok(0);
        };

        let mut removals = Vec::new();
        for (address, list) in by_player {
            let Some(items) = list.as_object() else {
                continue;
            };
            for (key, item) in items {
                let stale = item
                    .get("timestamp")
                    .and_then(Value::as_i64)
                    .map_or(false, |ts| ts < cutoff);
                if stale {
                    removals.push((
                        format!("{}/{}/{}", NOTIFICATIONS_PATH, address, key),
                        Value::Null,
                    ));
                }
            }
        }

        let removed = removals.len();
        if removed > 0 {
            self.store.update(removals).await?;
            debug!(removed, days, "cleaned up stale notifications");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_and_cleanup() {
        let store = Arc::new(MemoryStore::new());
        let notifications = NotificationStore::new(store.clone());
        let addr = WalletAddress::new("0xaaa");

        notifications.send(&addr, "you were matched").await.unwrap();

        // Plant an old notification directly.
        store
            .push(
                "notifications/0xaaa",
                json!({"message": "ancient", "timestamp": 0, "isRead": true}),
            )
            .await
            .unwrap();

        let removed = notifications.cleanup_older_than(7).await.unwrap();
        assert_eq!(removed, 1);

        let remaining = store.scan("notifications/0xaaa", None, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].1["message"], "you were matched");
    }

    #[tokio::test]
    async fn test_cleanup_empty_store() {
        let notifications = NotificationStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(notifications.cleanup_older_than(7).await.unwrap(), 0);
    }
}
