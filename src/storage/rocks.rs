//! RocksDB store backend.
//!
//! Documents are stored as JSON bytes keyed by their full path, so
//! lexicographic key order matches the path tree and child scans are
//! plain prefix iterations. Multi-path updates go through a single
//! `WriteBatch`; read-modify-write operations (merge into an ancestor
//! document, increment, conditional update) serialize on an internal
//! mutex, which is cheap because there is one writer process.

use super::{
    generate_push_key, normalize_path, tree_children, tree_remove, tree_resolve, tree_write,
    FlatRead, FlatWrite, KeyValueStore, StoreEvent,
};
use crate::errors::{StoreError, StoreResult};
use async_trait::async_trait;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

pub struct RocksStore {
    db: Arc<DB>,
    write_lock: Mutex<()>,
    events: broadcast::Sender<StoreEvent>,
}

impl RocksStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)
            .map_err(|e| StoreError::Unavailable(format!("failed to open database: {}", e)))?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
            events,
        })
    }

    fn view(&self) -> DbView<'_> {
        DbView { db: &self.db }
    }

    fn txn(&self) -> Txn<'_> {
        Txn {
            db: &self.db,
            staged: BTreeMap::new(),
        }
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn emit(&self, path: &str, value: Option<Value>) {
        let _ = self.events.send(StoreEvent {
            path: path.to_string(),
            value,
        });
    }

    fn emit_updates(&self, updates: Vec<(String, Value)>) {
        for (path, value) in updates {
            let path = normalize_path(&path);
            if value.is_null() {
                self.emit(&path, None);
            } else {
                self.emit(&path, Some(value));
            }
        }
    }
}

/// Read-only view over the database.
struct DbView<'a> {
    db: &'a DB,
}

fn decode_entry(key: &str, bytes: &[u8]) -> StoreResult<Value> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::corrupted(key, e))
}

impl FlatRead for DbView<'_> {
    fn get_entry(&self, key: &str) -> StoreResult<Option<Value>> {
        let bytes = self
            .db
            .get(key.as_bytes())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        bytes.map(|b| decode_entry(key, &b)).transpose()
    }

    fn entries_with_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Value)>> {
        let mut out = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for row in iter {
            let (key, value) = row.map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let key = std::str::from_utf8(&key)
                .map_err(|e| StoreError::corrupted(String::from_utf8_lossy(&key), e))?
                .to_string();
            if !key.starts_with(prefix) {
                break;
            }
            let value = decode_entry(&key, &value)?;
            out.push((key, value));
        }
        Ok(out)
    }
}

/// Staged mutations over the database, committed as one `WriteBatch`.
struct Txn<'a> {
    db: &'a DB,
    staged: BTreeMap<String, Option<Value>>,
}

impl Txn<'_> {
    fn commit(self) -> StoreResult<()> {
        let mut batch = WriteBatch::default();
        for (key, value) in self.staged {
            match value {
                Some(v) => {
                    let bytes = serde_json::to_vec(&v)?;
                    batch.put(key.as_bytes(), bytes);
                }
                None => batch.delete(key.as_bytes()),
            }
        }
        self.db
            .write(batch)
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

impl FlatRead for Txn<'_> {
    fn get_entry(&self, key: &str) -> StoreResult<Option<Value>> {
        if let Some(staged) = self.staged.get(key) {
            return Ok(staged.clone());
        }
        DbView { db: self.db }.get_entry(key)
    }

    fn entries_with_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Value)>> {
        let mut merged: BTreeMap<String, Value> = DbView { db: self.db }
            .entries_with_prefix(prefix)?
            .into_iter()
            .collect();
        for (key, value) in self.staged.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

impl FlatWrite for Txn<'_> {
    fn put_entry(&mut self, key: &str, value: Value) -> StoreResult<()> {
        self.staged.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn delete_entry(&mut self, key: &str) -> StoreResult<()> {
        self.staged.insert(key.to_string(), None);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for RocksStore {
    async fn read(&self, path: &str) -> StoreResult<Option<Value>> {
        tree_resolve(&self.view(), &normalize_path(path))
    }

    async fn write(&self, path: &str, value: Value) -> StoreResult<()> {
        let path = normalize_path(path);
        {
            let _guard = self.lock()?;
            let mut txn = self.txn();
            tree_write(&mut txn, &path, value.clone())?;
            txn.commit()?;
        }
        self.emit(&path, Some(value));
        Ok(())
    }

    async fn update(&self, updates: Vec<(String, Value)>) -> StoreResult<()> {
        {
            let _guard = self.lock()?;
            let mut txn = self.txn();
            for (path, value) in &updates {
                tree_write(&mut txn, &normalize_path(path), value.clone())?;
            }
            txn.commit()?;
        }
        self.emit_updates(updates);
        Ok(())
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        let path = normalize_path(path);
        {
            let _guard = self.lock()?;
            let mut txn = self.txn();
            tree_remove(&mut txn, &path)?;
            txn.commit()?;
        }
        self.emit(&path, None);
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> StoreResult<String> {
        let path = normalize_path(path);
        let key = generate_push_key();
        let full = format!("{}/{}", path, key);
        {
            let _guard = self.lock()?;
            let mut txn = self.txn();
            tree_write(&mut txn, &full, value.clone())?;
            txn.commit()?;
        }
        self.emit(&full, Some(value));
        Ok(key)
    }

    async fn increment(&self, path: &str, delta: f64) -> StoreResult<f64> {
        let path = normalize_path(path);
        let next = {
            let _guard = self.lock()?;
            let mut txn = self.txn();
            let current = tree_resolve(&txn, &path)?
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            let next = current + delta;
            tree_write(&mut txn, &path, super::json_number(next))?;
            txn.commit()?;
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
        let children = tree_children(&self.view(), &normalize_path(path))?;
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
        let children = tree_children(&self.view(), &normalize_path(path))?;
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
            let _guard = self.lock()?;
            let mut txn = self.txn();
            let current = tree_resolve(&txn, &guard_path)?;
            if current.as_ref() != Some(expected) {
                return Ok(false);
            }
            for (path, value) in &updates {
                tree_write(&mut txn, &normalize_path(path), value.clone())?;
            }
            txn.commit()?;
        }
        self.emit_updates(updates);
        Ok(true)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
