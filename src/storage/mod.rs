//! Path-addressed key-value storage.
//!
//! The core treats its backing store as a JSON tree addressed by
//! slash-separated paths (`games/<id>/status`), the same shape the
//! front-end sees. Two backends implement the [`KeyValueStore`] trait:
//! an in-memory store for tests and embedded dev use, and a RocksDB
//! store for persistence.
//!
//! Writes at a deep path merge into the nearest stored document, so a
//! record pushed at `games/<id>` and a later write of `games/<id>/id`
//! end up in one entry. The flat keyspace keeps the invariant that no
//! stored key is a path-prefix of another stored key.

mod memory;
mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

use crate::errors::StoreResult;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Change notification published by a store on every mutation.
/// `value` is `None` when the path was removed.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub path: String,
    pub value: Option<Value>,
}

/// The storage operations the core requires. Anything offering these
/// (a realtime database, a document store, an embedded KV engine) can
/// back the pipeline.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value at `path`, descending into or assembling
    /// documents as needed.
    async fn read(&self, path: &str) -> StoreResult<Option<Value>>;

    /// Replace the subtree at `path` with `value`.
    async fn write(&self, path: &str, value: Value) -> StoreResult<()>;

    /// Multi-path update applied atomically: either every path updates
    /// or none does. A `null` value removes the path.
    async fn update(&self, updates: Vec<(String, Value)>) -> StoreResult<()>;

    /// Remove the subtree at `path`.
    async fn remove(&self, path: &str) -> StoreResult<()>;

    /// Append `value` under `path` with a generated child key; returns
    /// the key.
    async fn push(&self, path: &str, value: Value) -> StoreResult<String>;

    /// Atomically add `delta` to the number at `path` (missing counts
    /// as zero); returns the new value.
    async fn increment(&self, path: &str, delta: f64) -> StoreResult<f64>;

    /// Children of `path` whose `field` equals `value`, up to `limit`,
    /// in storage order.
    async fn query_eq(
        &self,
        path: &str,
        field: &str,
        value: &Value,
        limit: usize,
    ) -> StoreResult<Vec<(String, Value)>>;

    /// Children of `path` in key order, starting after `start_after`
    /// when given, up to `limit`.
    async fn scan(
        &self,
        path: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<(String, Value)>>;

    /// Conditional multi-path update: applies `updates` only while the
    /// value at `guard_path` equals `expected`, as one atomic step.
    /// Returns whether the update was applied. This is the primitive
    /// that makes check-then-act transitions race-free.
    async fn update_if(
        &self,
        guard_path: &str,
        expected: &Value,
        updates: Vec<(String, Value)>,
    ) -> StoreResult<bool>;

    /// Subscribe to change events for all paths.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// JSON number for an increment result. Integral values stay integers
/// so counters round-trip into integer struct fields.
pub(crate) fn json_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

/// Generated push keys sort by creation time within a millisecond
/// resolution, so storage order roughly follows insertion order.
pub(crate) fn generate_push_key() -> String {
    let ts = crate::types::now_millis().max(0) as u64;
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{:012x}-{}", ts, &suffix[..12])
}

pub(crate) fn normalize_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Proper ancestors of `path`, longest first, paired with the relative
/// remainder: `a/b/c` yields `("a/b", "c")` then `("a", "b/c")`.
pub(crate) fn parent_chain(path: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut idx = path.len();
    while let Some(pos) = path[..idx].rfind('/') {
        out.push((path[..pos].to_string(), path[pos + 1..].to_string()));
        idx = pos;
    }
    out
}

pub(crate) fn get_nested<'a>(doc: &'a Value, rel: &str) -> Option<&'a Value> {
    let mut cur = doc;
    for seg in rel.split('/') {
        cur = cur.as_object()?.get(seg)?;
    }
    Some(cur)
}

pub(crate) fn set_nested(doc: &mut Value, rel: &str, value: Value) {
    let mut cur = doc;
    let segments: Vec<&str> = rel.split('/').collect();
    for (i, seg) in segments.iter().enumerate() {
        if !cur.is_object() {
            *cur = Value::Object(Map::new());
        }
        let Some(obj) = cur.as_object_mut() else {
            return;
        };
        if i == segments.len() - 1 {
            obj.insert(seg.to_string(), value);
            return;
        }
        cur = obj
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

pub(crate) fn remove_nested(doc: &mut Value, rel: &str) {
    let mut cur = doc;
    let segments: Vec<&str> = rel.split('/').collect();
    for (i, seg) in segments.iter().enumerate() {
        let Some(obj) = cur.as_object_mut() else {
            return;
        };
        if i == segments.len() - 1 {
            obj.remove(*seg);
            return;
        }
        match obj.get_mut(*seg) {
            Some(next) => cur = next,
            None => return,
        }
    }
}

/// Read access to the flat entry space backing the JSON tree.
pub(crate) trait FlatRead {
    fn get_entry(&self, key: &str) -> StoreResult<Option<Value>>;
    fn entries_with_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, Value)>>;
}

/// Mutable access; used inside a backend's atomic section.
pub(crate) trait FlatWrite: FlatRead {
    fn put_entry(&mut self, key: &str, value: Value) -> StoreResult<()>;
    fn delete_entry(&mut self, key: &str) -> StoreResult<()>;
}

/// Resolve `path` against the flat entries: an exact entry, a field of
/// the nearest ancestor document, or an object assembled from deeper
/// entries.
pub(crate) fn tree_resolve(map: &impl FlatRead, path: &str) -> StoreResult<Option<Value>> {
    if let Some(v) = map.get_entry(path)? {
        return Ok(Some(v));
    }
    for (ancestor, rel) in parent_chain(path) {
        if let Some(doc) = map.get_entry(&ancestor)? {
            return Ok(get_nested(&doc, &rel).cloned());
        }
    }
    let prefix = format!("{}/", path);
    let rows = map.entries_with_prefix(&prefix)?;
    if rows.is_empty() {
        return Ok(None);
    }
    let mut root = Value::Object(Map::new());
    for (key, value) in rows {
        set_nested(&mut root, &key[prefix.len()..], value);
    }
    Ok(Some(root))
}

/// Direct children of `path` as `(key, value)` pairs in key order.
pub(crate) fn tree_children(map: &impl FlatRead, path: &str) -> StoreResult<Vec<(String, Value)>> {
    if let Some(doc) = map.get_entry(path)? {
        return Ok(object_entries(doc));
    }
    for (ancestor, rel) in parent_chain(path) {
        if let Some(doc) = map.get_entry(&ancestor)? {
            return Ok(get_nested(&doc, &rel).cloned().map(object_entries).unwrap_or_default());
        }
    }
    let prefix = format!("{}/", path);
    let mut children: std::collections::BTreeMap<String, Value> = Default::default();
    for (key, value) in map.entries_with_prefix(&prefix)? {
        let rel = &key[prefix.len()..];
        match rel.split_once('/') {
            None => {
                children.insert(rel.to_string(), value);
            }
            Some((first, rest)) => {
                let entry = children
                    .entry(first.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                set_nested(entry, rest, value);
            }
        }
    }
    Ok(children.into_iter().collect())
}

fn object_entries(doc: Value) -> Vec<(String, Value)> {
    match doc {
        Value::Object(obj) => obj.into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Write `value` at `path`, merging into the nearest stored ancestor
/// document when one exists. A `null` value removes the path.
pub(crate) fn tree_write(map: &mut impl FlatWrite, path: &str, value: Value) -> StoreResult<()> {
    if value.is_null() {
        return tree_remove(map, path);
    }
    for (ancestor, rel) in parent_chain(path) {
        if let Some(mut doc) = map.get_entry(&ancestor)? {
            set_nested(&mut doc, &rel, value);
            return map.put_entry(&ancestor, doc);
        }
    }
    // Replacing a subtree supersedes any entries stored below it.
    let prefix = format!("{}/", path);
    let stale: Vec<String> = map
        .entries_with_prefix(&prefix)?
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    for key in stale {
        map.delete_entry(&key)?;
    }
    map.put_entry(path, value)
}

pub(crate) fn tree_remove(map: &mut impl FlatWrite, path: &str) -> StoreResult<()> {
    for (ancestor, rel) in parent_chain(path) {
        if let Some(mut doc) = map.get_entry(&ancestor)? {
            remove_nested(&mut doc, &rel);
            return map.put_entry(&ancestor, doc);
        }
    }
    map.delete_entry(path)?;
    let prefix = format!("{}/", path);
    let stale: Vec<String> = map
        .entries_with_prefix(&prefix)?
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    for key in stale {
        map.delete_entry(&key)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parent_chain_order() {
        let chain = parent_chain("a/b/c");
        assert_eq!(
            chain,
            vec![
                ("a/b".to_string(), "c".to_string()),
                ("a".to_string(), "b/c".to_string()),
            ]
        );
        assert!(parent_chain("a").is_empty());
    }

    #[test]
    fn test_set_nested_creates_intermediate_objects() {
        let mut doc = json!({});
        set_nested(&mut doc, "a/b/c", json!(1));
        assert_eq!(doc, json!({"a": {"b": {"c": 1}}}));
        set_nested(&mut doc, "a/b", json!("flat"));
        assert_eq!(doc, json!({"a": {"b": "flat"}}));
    }

    #[test]
    fn test_remove_nested_missing_is_noop() {
        let mut doc = json!({"a": {"b": 1}});
        remove_nested(&mut doc, "a/x/y");
        assert_eq!(doc, json!({"a": {"b": 1}}));
        remove_nested(&mut doc, "a/b");
        assert_eq!(doc, json!({"a": {}}));
    }

    #[test]
    fn test_push_keys_are_time_ordered() {
        let a = generate_push_key();
        let b = generate_push_key();
        assert_ne!(a, b);
        assert!(a[..12] <= b[..12]);
    }
}
