// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`ObjectStore`] for unit tests.
//!
//! Objects are kept as JSON keyed by `(kind, namespace, name)`. The store
//! mimics the API server behaviour the reconcilers depend on:
//!
//! - `resourceVersion` is bumped on every write and checked on replace and patch,
//! - deleting an object with finalizers only sets `deletionTimestamp`; the object
//!   disappears once a write empties its finalizers,
//! - failures can be injected per operation and kind,
//! - every call is recorded so tests can assert on the exact write sequence.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::store::{NamespacedObject, ObjectStore};
use crate::errors::StoreError;

/// Timestamp stamped on objects whose deletion was requested.
pub const DELETION_TIMESTAMP: &str = "2025-01-01T00:00:00Z";

/// Store operation verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Create,
    Replace,
    Patch,
    Delete,
}

impl Verb {
    #[must_use]
    pub fn is_write(self) -> bool {
        !matches!(self, Verb::Get)
    }
}

/// One recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
    pub verb: Verb,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

/// Error returned by an injected failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    Conflict,
    Timeout,
}

type ObjectKey = (String, String, String);

/// Thread-safe in-memory object store.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<ObjectKey, Value>>,
    ops: Mutex<Vec<Op>>,
    failures: Mutex<Vec<(Verb, String, FailureMode)>>,
    next_version: AtomicU64,
    cancel: CancellationToken,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `obj` as if it had been created, without recording an operation.
    ///
    /// # Panics
    ///
    /// Panics if `obj` has no name or namespace.
    pub fn seed<K: NamespacedObject>(&self, obj: &K) -> K {
        let namespace = obj.meta().namespace.clone().expect("seeded object needs a namespace");
        let name = obj.meta().name.clone().expect("seeded object needs a name");
        let mut value = serde_json::to_value(obj).expect("seeded object serializes");
        self.stamp_new(&mut value, &name);
        self.objects
            .lock()
            .unwrap()
            .insert(key::<K>(&namespace, &name), value.clone());
        serde_json::from_value(value).expect("seeded object deserializes")
    }

    /// Current stored state of an object.
    #[must_use]
    pub fn object<K: NamespacedObject>(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&key::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()).expect("stored object deserializes"))
    }

    #[must_use]
    pub fn contains<K: NamespacedObject>(&self, namespace: &str, name: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&key::<K>(namespace, name))
    }

    /// Number of stored objects of every kind.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    /// Write calls made so far, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<Op> {
        self.ops().into_iter().filter(|op| op.verb.is_write()).collect()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Make every `verb` call on objects of `kind` fail with `mode`.
    pub fn fail_on(&self, verb: Verb, kind: &str, mode: FailureMode) {
        self.failures
            .lock()
            .unwrap()
            .push((verb, kind.to_string(), mode));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Cancel every subsequent call.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn stamp_new(&self, value: &mut Value, name: &str) {
        let version = self.bump();
        let meta = metadata_mut(value);
        meta.entry("uid")
            .or_insert_with(|| Value::String(format!("uid-{name}-{version}")));
        meta.insert("resourceVersion".into(), Value::String(version.to_string()));
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn begin<K: NamespacedObject>(
        &self,
        verb: Verb,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let kind = K::kind(&()).to_string();
        self.ops.lock().unwrap().push(Op {
            verb,
            kind: kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });

        let operation = format!("{verb:?} {kind} {namespace}/{name}");
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled { operation });
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(v, k, _)| *v == verb && *k == kind)
            .map(|(_, _, mode)| *mode);
        match failure {
            Some(FailureMode::Conflict) => Err(conflict::<K>(namespace, name, "injected conflict")),
            Some(FailureMode::Timeout) => Err(StoreError::Timeout {
                operation,
                timeout: Duration::from_secs(30),
            }),
            None => Ok(()),
        }
    }

    /// Store `value` under `key` unless it is a deleting object without
    /// finalizers, in which case it is removed.
    fn commit(objects: &mut BTreeMap<ObjectKey, Value>, key: ObjectKey, value: Value) {
        let meta = value.get("metadata");
        let deleting = meta
            .and_then(|m| m.get("deletionTimestamp"))
            .is_some_and(|t| !t.is_null());
        let has_finalizers = meta
            .and_then(|m| m.get("finalizers"))
            .and_then(Value::as_array)
            .is_some_and(|f| !f.is_empty());
        if deleting && !has_finalizers {
            objects.remove(&key);
        } else {
            objects.insert(key, value);
        }
    }
}

fn key<K: NamespacedObject>(namespace: &str, name: &str) -> ObjectKey {
    (K::kind(&()).to_string(), namespace.to_string(), name.to_string())
}

fn not_found<K: NamespacedObject>(namespace: &str, name: &str) -> StoreError {
    StoreError::NotFound {
        kind: K::kind(&()).to_string(),
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

fn conflict<K: NamespacedObject>(namespace: &str, name: &str, message: &str) -> StoreError {
    StoreError::Conflict {
        kind: K::kind(&()).to_string(),
        namespace: namespace.to_string(),
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn metadata_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    let Value::Object(root) = value else {
        unreachable!("value was just made an object")
    };
    let meta = root
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if !meta.is_object() {
        *meta = Value::Object(Map::new());
    }
    let Value::Object(meta) = meta else {
        unreachable!("metadata was just made an object")
    };
    meta
}

fn resource_version(value: &Value) -> Option<&str> {
    value
        .get("metadata")
        .and_then(|m| m.get("resourceVersion"))
        .and_then(Value::as_str)
}

/// JSON merge patch (RFC 7386).
pub fn json_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (k, v) in patch {
            if v.is_null() {
                target.remove(k);
            } else {
                json_merge_patch(target.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        self.begin::<K>(Verb::Get, namespace, name)?;
        let stored = self
            .objects
            .lock()
            .unwrap()
            .get(&key::<K>(namespace, name))
            .cloned();
        stored
            .map(serde_json::from_value)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn create<K: NamespacedObject>(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let name = obj.meta().name.clone().unwrap_or_default();
        self.begin::<K>(Verb::Create, namespace, &name)?;

        let mut value = serde_json::to_value(obj)?;
        let mut objects = self.objects.lock().unwrap();
        let key = key::<K>(namespace, &name);
        if objects.contains_key(&key) {
            return Err(conflict::<K>(namespace, &name, "already exists"));
        }
        metadata_mut(&mut value).insert("namespace".into(), Value::String(namespace.to_string()));
        self.stamp_new(&mut value, &name);
        objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn replace<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
        obj: &K,
    ) -> Result<K, StoreError> {
        self.begin::<K>(Verb::Replace, namespace, name)?;

        let mut value = serde_json::to_value(obj)?;
        let mut objects = self.objects.lock().unwrap();
        let key = key::<K>(namespace, name);
        let stored = objects
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found::<K>(namespace, name))?;

        if let Some(version) = resource_version(&value) {
            if Some(version) != resource_version(&stored) {
                return Err(conflict::<K>(namespace, name, "resourceVersion mismatch"));
            }
        }

        // uid and deletionTimestamp are owned by the server
        let stored_meta = stored.get("metadata").cloned().unwrap_or(Value::Null);
        let version = self.bump();
        let meta = metadata_mut(&mut value);
        for field in ["uid", "deletionTimestamp"] {
            match stored_meta.get(field) {
                Some(v) => meta.insert(field.into(), v.clone()),
                None => meta.remove(field),
            };
        }
        meta.insert("resourceVersion".into(), Value::String(version.to_string()));

        Self::commit(&mut objects, key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn patch_merge<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<K, StoreError> {
        self.begin::<K>(Verb::Patch, namespace, name)?;

        let mut objects = self.objects.lock().unwrap();
        let key = key::<K>(namespace, name);
        let mut value = objects
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found::<K>(namespace, name))?;

        if let Some(version) = resource_version(patch) {
            if Some(version) != resource_version(&value) {
                return Err(conflict::<K>(namespace, name, "resourceVersion mismatch"));
            }
        }

        json_merge_patch(&mut value, patch);
        let version = self.bump();
        metadata_mut(&mut value)
            .insert("resourceVersion".into(), Value::String(version.to_string()));

        Self::commit(&mut objects, key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn delete<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        self.begin::<K>(Verb::Delete, namespace, name)?;

        let mut objects = self.objects.lock().unwrap();
        let key = key::<K>(namespace, name);
        let mut value = objects
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found::<K>(namespace, name))?;

        let meta = metadata_mut(&mut value);
        if !meta.contains_key("deletionTimestamp") {
            meta.insert(
                "deletionTimestamp".into(),
                Value::String(DELETION_TIMESTAMP.to_string()),
            );
        }
        Self::commit(&mut objects, key, value);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_store_tests.rs"]
mod memory_store_tests;
