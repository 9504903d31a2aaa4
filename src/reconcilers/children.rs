// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The child resources a `DeviceConfig` owns.
//!
//! Each [`ChildKind`] names one child slot: its object type, its name derived
//! from the parent, and the synthesizer computing its desired state. The
//! controller syncs the enabled kinds in [`ChildKind::sync_order`] and the
//! finalizer tears them down in [`ChildKind::deletion_order`].

use k8s_openapi::api::{apps::v1::DaemonSet, core::v1::ConfigMap};
use kube::ResourceExt;
use std::fmt;

use super::resources::{sync_desired, SyncOutcome};
use super::store::{NamespacedObject, ObjectStore};
use crate::config::ReconcilerSettings;
use crate::crd::DeviceConfig;
use crate::errors::ReconcileError;
use crate::gpu_resources::{
    build_configmap_name, desired_build_configmap, desired_metrics_daemonset, desired_module,
    desired_node_labeller_daemonset, module_name, node_labeller_name, node_metrics_name,
};
use crate::kmm::Module;

/// One child slot of a `DeviceConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildKind {
    /// `ConfigMap` holding the driver build Dockerfile
    BuildConfig,
    /// KMM `Module` loading the GPU driver
    ModuleRequest,
    /// `DaemonSet` labelling nodes with GPU properties (opt-in)
    NodeLabeller,
    /// `DaemonSet` exporting node metrics
    MetricsDaemon,
}

impl ChildKind {
    /// Every kind, in sync order.
    pub const ALL: [ChildKind; 4] = [
        ChildKind::BuildConfig,
        ChildKind::ModuleRequest,
        ChildKind::NodeLabeller,
        ChildKind::MetricsDaemon,
    ];

    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChildKind::BuildConfig => "build_config",
            ChildKind::ModuleRequest => "module_request",
            ChildKind::NodeLabeller => "node_labeller",
            ChildKind::MetricsDaemon => "metrics_daemon",
        }
    }

    /// Kubernetes kind of the child object.
    #[must_use]
    pub fn object_kind(self) -> &'static str {
        match self {
            ChildKind::BuildConfig => "ConfigMap",
            ChildKind::ModuleRequest => "Module",
            ChildKind::NodeLabeller | ChildKind::MetricsDaemon => "DaemonSet",
        }
    }

    /// Name of this child for the parent named `parent_name`.
    #[must_use]
    pub fn name_for(self, parent_name: &str) -> String {
        match self {
            ChildKind::BuildConfig => build_configmap_name(parent_name),
            ChildKind::ModuleRequest => module_name(parent_name),
            ChildKind::NodeLabeller => node_labeller_name(parent_name),
            ChildKind::MetricsDaemon => node_metrics_name(parent_name),
        }
    }

    #[must_use]
    pub fn is_enabled(self, settings: &ReconcilerSettings) -> bool {
        match self {
            ChildKind::NodeLabeller => settings.enable_node_labeller,
            _ => true,
        }
    }

    /// Enabled kinds in the order they are synced.
    #[must_use]
    pub fn sync_order(settings: &ReconcilerSettings) -> Vec<ChildKind> {
        Self::ALL
            .into_iter()
            .filter(|kind| kind.is_enabled(settings))
            .collect()
    }

    /// Enabled kinds in the order they are deleted while finalizing.
    ///
    /// The build `ConfigMap` is left to owner reference garbage collection.
    #[must_use]
    pub fn deletion_order(settings: &ReconcilerSettings) -> Vec<ChildKind> {
        [
            ChildKind::NodeLabeller,
            ChildKind::MetricsDaemon,
            ChildKind::ModuleRequest,
        ]
        .into_iter()
        .filter(|kind| kind.is_enabled(settings))
        .collect()
    }

    /// Bring this child of `parent` to its desired state.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    pub async fn sync<S: ObjectStore>(
        self,
        store: &S,
        parent: &DeviceConfig,
        settings: &ReconcilerSettings,
    ) -> Result<SyncOutcome, ReconcileError> {
        let namespace = parent.namespace().unwrap_or_default();
        let name = self.name_for(&parent.name_any());
        match self {
            ChildKind::BuildConfig => {
                sync_desired(store, &namespace, &name, |existing: ConfigMap| {
                    desired_build_configmap(existing, parent, settings)
                })
                .await
            }
            ChildKind::ModuleRequest => {
                sync_desired(store, &namespace, &name, |existing: Module| {
                    desired_module(existing, parent, settings)
                })
                .await
            }
            ChildKind::NodeLabeller => {
                sync_desired(store, &namespace, &name, |existing: DaemonSet| {
                    desired_node_labeller_daemonset(existing, parent, settings)
                })
                .await
            }
            ChildKind::MetricsDaemon => {
                sync_desired(store, &namespace, &name, |existing: DaemonSet| {
                    desired_metrics_daemonset(existing, parent, settings)
                })
                .await
            }
        }
    }

    /// Whether this child of the parent `namespace/parent_name` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails for any reason other than absence.
    pub async fn exists<S: ObjectStore>(
        self,
        store: &S,
        namespace: &str,
        parent_name: &str,
    ) -> Result<bool, ReconcileError> {
        let name = self.name_for(parent_name);
        match self {
            ChildKind::BuildConfig => exists::<S, ConfigMap>(store, namespace, &name).await,
            ChildKind::ModuleRequest => exists::<S, Module>(store, namespace, &name).await,
            ChildKind::NodeLabeller | ChildKind::MetricsDaemon => {
                exists::<S, DaemonSet>(store, namespace, &name).await
            }
        }
    }

    /// Request deletion of this child. Returns `false` if it was already gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails for any reason other than absence.
    pub async fn delete<S: ObjectStore>(
        self,
        store: &S,
        namespace: &str,
        parent_name: &str,
    ) -> Result<bool, ReconcileError> {
        let name = self.name_for(parent_name);
        match self {
            ChildKind::BuildConfig => delete::<S, ConfigMap>(store, namespace, &name).await,
            ChildKind::ModuleRequest => delete::<S, Module>(store, namespace, &name).await,
            ChildKind::NodeLabeller | ChildKind::MetricsDaemon => {
                delete::<S, DaemonSet>(store, namespace, &name).await
            }
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

async fn exists<S: ObjectStore, K: NamespacedObject>(
    store: &S,
    namespace: &str,
    name: &str,
) -> Result<bool, ReconcileError> {
    store
        .get::<K>(namespace, name)
        .await
        .map(|found| found.is_some())
        .map_err(|e| ReconcileError::store("get", K::kind(&()), namespace, name, e))
}

async fn delete<S: ObjectStore, K: NamespacedObject>(
    store: &S,
    namespace: &str,
    name: &str,
) -> Result<bool, ReconcileError> {
    match store.delete::<K>(namespace, name).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(ReconcileError::store(
            "delete",
            K::kind(&()),
            namespace,
            name,
            e,
        )),
    }
}

#[cfg(test)]
#[path = "children_tests.rs"]
mod children_tests;
