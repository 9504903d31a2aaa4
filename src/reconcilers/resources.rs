// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic get-or-create-or-update for child resources.
//!
//! [`sync_desired`] brings one namespaced object to the state computed by a
//! synthesizer function. It writes only when the synthesized object differs
//! from the stored one, so a steady-state reconcile pass issues no writes.
//!
//! # Example
//!
//! ```rust,no_run
//! use amd_gpu_operator::reconcilers::resources::sync_desired;
//! use amd_gpu_operator::reconcilers::store::KubeStore;
//! use k8s_openapi::api::core::v1::ConfigMap;
//! use std::collections::BTreeMap;
//!
//! async fn example(store: &KubeStore) {
//!     let outcome = sync_desired(store, "kube-amd-gpu", "example", |mut cm: ConfigMap| {
//!         cm.data = Some(BTreeMap::from([("key".to_string(), "value".to_string())]));
//!         cm
//!     })
//!     .await
//!     .unwrap();
//!     println!("{outcome}");
//! }
//! ```

use std::fmt;
use tracing::{debug, info};

use super::store::{NamespacedObject, ObjectStore};
use crate::errors::{ReconcileError, StoreError};

/// What [`sync_desired`] did to the stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
}

impl SyncOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncOutcome::Created => "created",
            SyncOutcome::Updated => "updated",
            SyncOutcome::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bring `namespace/name` of kind `K` to the state returned by `synthesize`.
///
/// When the object is absent, `synthesize` receives an empty object carrying
/// only the name and namespace, and the result is created. Otherwise it
/// receives the stored object; the result replaces it only if its JSON form
/// differs. The replace carries the `resourceVersion` that was read, so a
/// concurrent modification surfaces as a conflict instead of being overwritten.
///
/// # Errors
///
/// Returns a [`ReconcileError`] naming the failed operation if any store call
/// fails.
pub async fn sync_desired<S, K, F>(
    store: &S,
    namespace: &str,
    name: &str,
    synthesize: F,
) -> Result<SyncOutcome, ReconcileError>
where
    S: ObjectStore,
    K: NamespacedObject + Default,
    F: FnOnce(K) -> K + Send,
{
    let kind = K::kind(&()).to_string();
    let wrap = |action: &'static str, err: StoreError| {
        ReconcileError::store(action, kind.clone(), namespace, name, err)
    };

    let existing: Option<K> = store
        .get(namespace, name)
        .await
        .map_err(|e| wrap("get", e))?;

    let Some(current) = existing else {
        debug!("{} {}/{} does not exist, creating", kind, namespace, name);
        let mut empty = K::default();
        empty.meta_mut().name = Some(name.to_string());
        empty.meta_mut().namespace = Some(namespace.to_string());

        let mut desired = synthesize(empty);
        desired.meta_mut().name = Some(name.to_string());
        desired.meta_mut().namespace = Some(namespace.to_string());

        store
            .create(namespace, &desired)
            .await
            .map_err(|e| wrap("create", e))?;
        info!("Created {} {}/{}", kind, namespace, name);
        return Ok(SyncOutcome::Created);
    };

    let before = serde_json::to_value(&current).map_err(|e| wrap("encode", e.into()))?;
    let desired = synthesize(current);
    let after = serde_json::to_value(&desired).map_err(|e| wrap("encode", e.into()))?;

    if before == after {
        debug!("{} {}/{} is up to date", kind, namespace, name);
        return Ok(SyncOutcome::Unchanged);
    }

    store
        .replace(namespace, name, &desired)
        .await
        .map_err(|e| wrap("replace", e))?;
    info!("Updated {} {}/{}", kind, namespace, name);
    Ok(SyncOutcome::Updated)
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
