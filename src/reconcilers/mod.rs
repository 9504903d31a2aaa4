// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation logic for the `DeviceConfig` controller.
//!
//! - [`deviceconfig`] - the per-resource reconcile pass
//! - [`children`] - the child slots a `DeviceConfig` owns, in order
//! - [`finalizers`] - finalizer handling and ordered teardown
//! - [`resources`] - generic get-or-create-or-update of one child
//! - [`store`] - typed access to the Kubernetes API
//!
//! # Reconciliation Flow
//!
//! ```text
//! get DeviceConfig ──absent──▶ NotFound
//!        │
//!        ├─terminating──▶ finalize_device_config (one step per pass)
//!        │
//!        └─active──▶ ensure_finalizer
//!                      └─▶ sync BuildConfig ─▶ ModuleRequest ─▶ [NodeLabeller] ─▶ MetricsDaemon
//! ```

pub mod children;
pub mod deviceconfig;
pub mod finalizers;
pub mod resources;
pub mod store;

#[cfg(test)]
pub mod memory_store;

pub use children::ChildKind;
pub use deviceconfig::{reconcile_deviceconfig, ReconcileOutcome};
pub use finalizers::{ensure_finalizer, finalize_device_config, remove_finalizer, FinalizeStep};
pub use resources::{sync_desired, SyncOutcome};
pub use store::{KubeStore, NamespacedObject, ObjectStore};
