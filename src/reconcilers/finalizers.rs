// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Finalizer management and ordered teardown of `DeviceConfig` children.
//!
//! The finalizer is added before any child is created, so the API server
//! keeps a deleted `DeviceConfig` around until [`finalize_device_config`] has
//! removed its children in order:
//!
//! 1. node labeller `DaemonSet` (when enabled)
//! 2. node metrics `DaemonSet`
//! 3. KMM `Module`
//! 4. the finalizer itself
//!
//! Each call performs at most one of these steps and returns. The deletion of
//! a child triggers a new reconcile through the owner watch, which moves on to
//! the next step once the child is gone. KMM needs the `Module` to outlive the
//! workloads that depend on the driver, which owner reference garbage
//! collection alone does not guarantee.
//!
//! # Example
//!
//! ```rust,no_run
//! use amd_gpu_operator::config::ReconcilerSettings;
//! use amd_gpu_operator::crd::DeviceConfig;
//! use amd_gpu_operator::reconcilers::finalizers::{ensure_finalizer, finalize_device_config};
//! use amd_gpu_operator::reconcilers::store::KubeStore;
//!
//! async fn example(store: KubeStore, parent: DeviceConfig, settings: ReconcilerSettings) {
//!     if parent.is_terminating() {
//!         let step = finalize_device_config(&store, &parent, &settings).await.unwrap();
//!         println!("finalize step: {step:?}");
//!     } else {
//!         ensure_finalizer(&store, &parent, &settings.finalizer).await.unwrap();
//!     }
//! }
//! ```

use kube::ResourceExt;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::children::ChildKind;
use super::store::{NamespacedObject, ObjectStore};
use crate::config::ReconcilerSettings;
use crate::crd::DeviceConfig;
use crate::errors::ReconcileError;
use crate::metrics;

/// Result of one [`finalize_device_config`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeStep {
    /// Deletion of this child was requested.
    DeletedChild(ChildKind),
    /// Every child is gone and the finalizer was removed, or was already absent.
    FinalizerRemoved,
}

fn has_finalizer<K: NamespacedObject>(resource: &K, finalizer: &str) -> bool {
    resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|existing| existing == finalizer))
}

/// Merge patch replacing the finalizer list, guarded by the resource version
/// the list was computed from.
fn finalizers_patch<K: NamespacedObject>(resource: &K, finalizers: &[String]) -> Value {
    let mut metadata = Map::new();
    metadata.insert("finalizers".into(), json!(finalizers));
    if let Some(version) = &resource.meta().resource_version {
        metadata.insert("resourceVersion".into(), json!(version));
    }
    json!({ "metadata": metadata })
}

/// Add a finalizer to a resource if not already present.
///
/// The operation is idempotent: no write happens when the finalizer is
/// already there.
///
/// # Errors
///
/// Returns an error if the patch fails, including a conflict when the
/// resource changed since it was read.
pub async fn ensure_finalizer<S, K>(
    store: &S,
    resource: &K,
    finalizer: &str,
) -> Result<(), ReconcileError>
where
    S: ObjectStore,
    K: NamespacedObject,
{
    if has_finalizer(resource, finalizer) {
        return Ok(());
    }

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    info!(
        "Adding finalizer {} to {}/{} {}",
        finalizer,
        namespace,
        name,
        K::kind(&())
    );

    let mut finalizers = resource.finalizers().to_vec();
    finalizers.push(finalizer.to_string());

    store
        .patch_merge::<K>(&namespace, &name, &finalizers_patch(resource, &finalizers))
        .await
        .map_err(|e| ReconcileError::store("add finalizer to", K::kind(&()), &namespace, &name, e))?;
    metrics::record_finalizer("added");
    Ok(())
}

/// Remove a finalizer from a resource.
///
/// The operation is idempotent: no write happens when the finalizer is
/// already absent.
///
/// # Errors
///
/// Returns an error if the patch fails.
pub async fn remove_finalizer<S, K>(
    store: &S,
    resource: &K,
    finalizer: &str,
) -> Result<(), ReconcileError>
where
    S: ObjectStore,
    K: NamespacedObject,
{
    if !has_finalizer(resource, finalizer) {
        return Ok(());
    }

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    info!(
        "Removing finalizer {} from {}/{} {}",
        finalizer,
        namespace,
        name,
        K::kind(&())
    );

    let finalizers: Vec<String> = resource
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != finalizer)
        .cloned()
        .collect();

    store
        .patch_merge::<K>(&namespace, &name, &finalizers_patch(resource, &finalizers))
        .await
        .map_err(|e| {
            ReconcileError::store("remove finalizer from", K::kind(&()), &namespace, &name, e)
        })?;
    metrics::record_finalizer("removed");
    Ok(())
}

/// Perform the next teardown step of a deleting `DeviceConfig`.
///
/// Children are deleted whether or not the parent still carries our
/// finalizer; only the final removal is skipped when it is already gone.
///
/// # Errors
///
/// Returns an error if a lookup, deletion or the finalizer removal fails.
/// Absent children are skipped, never reported.
pub async fn finalize_device_config<S: ObjectStore>(
    store: &S,
    parent: &DeviceConfig,
    settings: &ReconcilerSettings,
) -> Result<FinalizeStep, ReconcileError> {
    let namespace = parent.namespace().unwrap_or_default();
    let name = parent.name_any();

    for kind in ChildKind::deletion_order(settings) {
        if !kind.exists(store, &namespace, &name).await? {
            debug!(
                "{} {}/{} already deleted",
                kind.object_kind(),
                namespace,
                kind.name_for(&name)
            );
            continue;
        }

        info!(
            "Deleting {} {}/{} of DeviceConfig {}",
            kind.object_kind(),
            namespace,
            kind.name_for(&name),
            name
        );
        if kind.delete(store, &namespace, &name).await? {
            metrics::record_child_deleted(kind.as_str());
            return Ok(FinalizeStep::DeletedChild(kind));
        }
    }

    info!(
        "All children of DeviceConfig {}/{} are gone, removing finalizer",
        namespace, name
    );
    remove_finalizer(store, parent, &settings.finalizer).await?;
    Ok(FinalizeStep::FinalizerRemoved)
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
