// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `DeviceConfig` reconciliation logic.
//!
//! One call of [`reconcile_deviceconfig`] is one reconcile pass for one
//! `DeviceConfig`:
//!
//! - **absent**: nothing to do,
//! - **terminating**: one teardown step (see [`finalize_device_config`]),
//! - **active**: add the finalizer, then sync every enabled child in
//!   [`ChildKind::sync_order`]. The first failing child aborts the pass.
//!
//! The parent is always re-read from the store, never taken from the watch
//! event that triggered the pass.

use tracing::{debug, info};

use super::children::ChildKind;
use super::finalizers::{ensure_finalizer, finalize_device_config, FinalizeStep};
use super::resources::SyncOutcome;
use super::store::ObjectStore;
use crate::constants::KIND_DEVICE_CONFIG;
use crate::context::Context;
use crate::crd::DeviceConfig;
use crate::errors::ReconcileError;
use crate::metrics;

/// What one reconcile pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The `DeviceConfig` no longer exists.
    NotFound,
    /// The `DeviceConfig` is being deleted; one teardown step was taken.
    Finalizing(FinalizeStep),
    /// Every enabled child was synced, in order.
    Synced(Vec<(ChildKind, SyncOutcome)>),
}

/// Reconcile the `DeviceConfig` `namespace/name`.
///
/// # Errors
///
/// Returns the first store error, wrapped with the operation and object it
/// concerns. Children after the failing one are not attempted.
pub async fn reconcile_deviceconfig<S: ObjectStore>(
    ctx: &Context<S>,
    namespace: &str,
    name: &str,
) -> Result<ReconcileOutcome, ReconcileError> {
    debug!(namespace = %namespace, name = %name, "Reconciling DeviceConfig");

    let parent: Option<DeviceConfig> = ctx
        .store
        .get(namespace, name)
        .await
        .map_err(|e| ReconcileError::store("get", KIND_DEVICE_CONFIG, namespace, name, e))?;

    let Some(parent) = parent else {
        info!("DeviceConfig {}/{} deleted", namespace, name);
        return Ok(ReconcileOutcome::NotFound);
    };

    if parent.is_terminating() {
        info!("DeviceConfig {}/{} is being deleted", namespace, name);
        let step = finalize_device_config(&ctx.store, &parent, &ctx.settings).await?;
        return Ok(ReconcileOutcome::Finalizing(step));
    }

    ensure_finalizer(&ctx.store, &parent, &ctx.settings.finalizer).await?;

    let mut outcomes = Vec::new();
    for kind in ChildKind::sync_order(&ctx.settings) {
        debug!(
            namespace = %namespace,
            name = %name,
            kind = %kind,
            "Syncing child resource"
        );
        let outcome = kind.sync(&ctx.store, &parent, &ctx.settings).await?;
        metrics::record_child_sync(kind.as_str(), outcome.as_str());
        info!(
            "Reconciled {} {}/{}: {}",
            kind.object_kind(),
            namespace,
            kind.name_for(name),
            outcome
        );
        outcomes.push((kind, outcome));
    }

    Ok(ReconcileOutcome::Synced(outcomes))
}

#[cfg(test)]
#[path = "deviceconfig_tests.rs"]
mod deviceconfig_tests;
