//! In-memory store backend.
//!
//! A single ordered map behind an `RwLock`; every mutating operation
//! holds the write lock for its whole read-modify-write section, which
//! is what makes `update` and `update_if` atomic.

use super::{
    generate_push_key, normalize_path, tree_children, tree_remove, tree_resolve, tree_write,
    FlatRead, FlatWrite, KeyValueStore, StoreEvent,
};
use crate::errors::{StoreError, StoreResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    fn emit(&self, path: &str, value: Option<Value>) {
        let _ = self.events.send(StoreEvent {
            path: path.to_string(),
            value,
        });
    }

    fn read_guard(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, BTreeMap<String, Value>>> {
        self.entries
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write_guard(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Value>>> {
        self.entries
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FlatRead for BTreeMap<String, Value> {
    fn get_entry(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.get(key).cloned())
    }

    fn entries_with_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Value)>> {
        Ok(self
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl FlatWrite for BTreeMap<String, Value> {
    fn put_entry(&mut self, key: &str, value: Value) -> StoreResult<()> {
        self.insert(key.to_string(), value);
        Ok(())
    }

    fn delete_entry(&mut self, key: &str) -> StoreResult<()> {
        self.remove(key);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn read(&self, path: &str) -> StoreResult<Option<Value>> {
        let path = normalize_path(path);
        let entries = self.read_guard()?;
        tree_resolve(&*entries, &path)
    }

    async fn write(&self, path: &str, value: Value) -> StoreResult<()> {
        let path = normalize_path(path);
        {
            let mut entries = self.write_guard()?;
            tree_write(&mut *entries, &path, value.clone())?;
        }
        self.emit(&path, Some(value));
        Ok(())
    }

    async fn update(&self, updates: Vec<(String, Value)>) -> StoreResult<()> {
        {
            let mut entries = self.write_guard()?;
            for (path, value) in &updates {
                tree_write(&mut *entries, &normalize_path(path), value.clone())?;
            }
        }
        for (path, value) in updates {
            let path = normalize_path(&path);
            if value.is_null() {
                self.emit(&path, None);
            } else {
                self.emit(&path, Some(value));
            }
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        let path = normalize_path(path);
        {
            let mut entries = self.write_guard()?;
            tree_remove(&mut *entries, &path)?;
        }
        self.emit(&path, None);
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> StoreResult<String> {
        let path = normalize_path(path);
        let key = generate_push_key();
        let full = format!("{}/{}", path, key);
        {
            let mut entries = self.write_guard()?;
            tree_write(&mut *entries, &full, value.clone())?;
        }
        self.emit(&full, Some(value));
        Ok(key)
    }

    async fn increment(&self, path: &str, delta: f64) -> StoreResult<f64> {
        let path = normalize_path(path);
        let next = {
            let mut entries = self.write_guard()?;
            let current = tree_resolve(&*entries, &path)?
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            let next = current + delta;
            tree_write(&mut *entries, &path, super::json_number(next))?;
            next
        };
        self.emit(&path, Some(super::json_number(next)));
        Ok(next)
    }

    async fn query_eq(
        &self,
        path: &str,
        field: &str,
        value: &Value,
        limit: usize,
    ) -> StoreResult<Vec<(String, Value)>> {
        let path = normalize_path(path);
        let entries = self.read_guard()?;
        let children = tree_children(&*entries, &path)?;
        Ok(children
            .into_iter()
            .filter(|(_, child)| child.get(field) == Some(value))
            .take(limit)
            .collect())
    }

    async fn scan(
        &self,
        path: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<(String, Value)>> {
        let path = normalize_path(path);
        let entries = self.read_guard()?;
        let children = tree_children(&*entries, &path)?;
        Ok(children
            .into_iter()
            .filter(|(key, _)| start_after.map_or(true, |c| key.as_str() > c))
            .take(limit)
            .collect())
    }

    async fn update_if(
        &self,
        guard_path: &str,
        expected: &Value,
        updates: Vec<(String, Value)>,
    ) -> StoreResult<bool> {
        let guard_path = normalize_path(guard_path);
        {
            let mut entries = self.write_guard()?;
            let current = tree_resolve(&*entries, &guard_path)?;
            if current.as_ref() != Some(expected) {
                return Ok(false);
            }
            for (path, value) in &updates {
                tree_write(&mut *entries, &normalize_path(path), value.clone())?;
            }
        }
        for (path, value) in updates {
            let path = normalize_path(&path);
            if value.is_null() {
                self.emit(&path, None);
            } else {
                self.emit(&path, Some(value));
            }
        }
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_then_read_back() {
        let store = MemoryStore::new();
        store.write("players/0xaaa", json!({"wins": 1})).await.unwrap();
        let value = store.read("players/0xaaa").await.unwrap().unwrap();
        assert_eq!(value, json!({"wins": 1}));
        assert!(store.read("players/0xbbb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deep_write_merges_into_document() {
        let store = MemoryStore::new();
        store.write("games/g1", json!({"status": "active"})).await.unwrap();
        store.write("games/g1/id", json!("g1")).await.unwrap();
        let value = store.read("games/g1").await.unwrap().unwrap();
        assert_eq!(value, json!({"status": "active", "id": "g1"}));
        assert_eq!(store.read("games/g1/status").await.unwrap(), Some(json!("active")));
    }

    #[tokio::test]
    async fn test_read_assembles_children() {
        let store = MemoryStore::new();
        store.push("queue", json!({"n": 1})).await.unwrap();
        store.push("queue", json!({"n": 2})).await.unwrap();
        let all = store.read("queue").await.unwrap().unwrap();
        assert_eq!(all.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_multi_path_update_and_null_delete() {
        let store = MemoryStore::new();
        store.write("games/g1", json!({"status": "active", "tmp": 1})).await.unwrap();
        store
            .update(vec![
                ("games/g1/status".to_string(), json!("completed")),
                ("games/g1/tmp".to_string(), Value::Null),
            ])
            .await
            .unwrap();
        let value = store.read("games/g1").await.unwrap().unwrap();
        assert_eq!(value, json!({"status": "completed"}));
    }

    #[tokio::test]
    async fn test_increment_from_missing() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("stats/count", 1.0).await.unwrap(), 1.0);
        assert_eq!(store.increment("stats/count", 2.0).await.unwrap(), 3.0);
        // Integral results are stored as JSON integers.
        assert_eq!(store.read("stats/count").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_query_eq_filters_and_limits() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let bucket = if i % 2 == 0 { "a" } else { "b" };
            store.push("queue", json!({"bucket": bucket, "i": i})).await.unwrap();
        }
        let hits = store.query_eq("queue", "bucket", &json!("a"), 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        for (_, v) in hits {
            assert_eq!(v["bucket"], "a");
        }
    }

    #[tokio::test]
    async fn test_scan_with_cursor() {
        let store = MemoryStore::new();
        for i in 0..4 {
            store.push("log", json!({"i": i})).await.unwrap();
        }
        let first = store.scan("log", None, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        let cursor = first.last().unwrap().0.clone();
        let rest = store.scan("log", Some(&cursor), 10).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert!(rest.iter().all(|(k, _)| k > &cursor));
    }

    #[tokio::test]
    async fn test_update_if_guards_on_current_value() {
        let store = MemoryStore::new();
        store.write("games/g1", json!({"status": "active"})).await.unwrap();

        let applied = store
            .update_if(
                "games/g1/status",
                &json!("active"),
                vec![("games/g1/status".to_string(), json!("completed"))],
            )
            .await
            .unwrap();
        assert!(applied);

        let applied_again = store
            .update_if(
                "games/g1/status",
                &json!("active"),
                vec![("games/g1/status".to_string(), json!("completed"))],
            )
            .await
            .unwrap();
        assert!(!applied_again);
    }

    #[tokio::test]
    async fn test_subscribe_receives_writes() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        store.write("players/0xaaa", json!({"wins": 0})).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.path, "players/0xaaa");
        assert_eq!(event.value, Some(json!({"wins": 0})));
    }

    #[tokio::test]
    async fn test_remove_subtree() {
        let store = MemoryStore::new();
        store.push("notifications/0xaaa", json!({"message": "hi"})).await.unwrap();
        store.remove("notifications/0xaaa").await.unwrap();
        assert!(store.read("notifications/0xaaa").await.unwrap().is_none());
    }
}
