// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for store access and reconciliation.
//!
//! Store errors keep their kind when they are wrapped with context, so the
//! controller's error policy can still tell a version conflict from an
//! unreachable API server. Nothing here is fatal: every error ends the current
//! reconcile pass and the controller runtime retries it with backoff.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by an [`ObjectStore`](crate::reconcilers::store::ObjectStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Object does not exist.
    ///
    /// Expected during normal operation; callers treat it as "absent".
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    /// Optimistic concurrency failure: the object changed since it was read.
    #[error("conflict writing {kind} {namespace}/{name}: {message}")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
        message: String,
    },

    /// The caller cancelled the operation (e.g. controller shutdown).
    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    /// The operation did not finish before its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    /// Any other API server or transport error.
    #[error(transparent)]
    Api(#[from] kube::Error),

    /// Object could not be converted to or from JSON.
    #[error("failed to encode object: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether retrying the same operation later can succeed.
    ///
    /// Only encoding failures are deterministic; everything else depends on
    /// cluster state or timing.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Serialization(_))
    }
}

/// Error returned by one reconcile pass.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// A store operation failed.
    #[error("failed to {action} {kind} {namespace}/{name}: {source}")]
    Store {
        action: &'static str,
        kind: String,
        namespace: String,
        name: String,
        #[source]
        source: StoreError,
    },
}

impl ReconcileError {
    /// Wrap a store error with the operation and object it concerns.
    #[must_use]
    pub fn store(
        action: &'static str,
        kind: impl Into<String>,
        namespace: &str,
        name: &str,
        source: StoreError,
    ) -> Self {
        Self::Store {
            action,
            kind: kind.into(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            source,
        }
    }

    /// The underlying store error.
    #[must_use]
    pub fn store_error(&self) -> &StoreError {
        match self {
            Self::Store { source, .. } => source,
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.store_error().is_conflict()
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.store_error().is_retryable()
    }

    /// Short label for metrics.
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self.store_error() {
            StoreError::NotFound { .. } => "not_found",
            StoreError::Conflict { .. } => "conflict",
            StoreError::Cancelled { .. } => "cancelled",
            StoreError::Timeout { .. } => "timeout",
            StoreError::Api(_) => "api",
            StoreError::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
