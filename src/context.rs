// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the `DeviceConfig` controller.
//!
//! The controller receives an `Arc<Context>` holding the object store used
//! for every API call and the settings injected into synthesized children.
//! Tests build the same context around an in-memory store.

use crate::config::ReconcilerSettings;
use crate::reconcilers::store::{KubeStore, ObjectStore};

/// Shared context passed to the reconciler.
#[derive(Clone)]
pub struct Context<S: ObjectStore = KubeStore> {
    /// Store for all Kubernetes API operations
    pub store: S,

    /// Defaults and images used when synthesizing children
    pub settings: ReconcilerSettings,
}

impl<S: ObjectStore> Context<S> {
    #[must_use]
    pub fn new(store: S, settings: ReconcilerSettings) -> Self {
        Self { store, settings }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
