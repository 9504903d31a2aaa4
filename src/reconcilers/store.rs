// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Access to namespaced Kubernetes objects.
//!
//! Reconcilers never talk to [`kube::Api`] directly. They go through the
//! [`ObjectStore`] trait, which the controller implements with [`KubeStore`]
//! and unit tests implement with an in-memory store.
//!
//! Every [`KubeStore`] call honours the shutdown [`CancellationToken`] and a
//! per-call deadline, and maps HTTP 404 and 409 responses to
//! [`StoreError::NotFound`] and [`StoreError::Conflict`].

use async_trait::async_trait;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::StoreError;

/// Namespaced Kubernetes object types the store can handle.
pub trait NamespacedObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> NamespacedObject for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Typed get/create/replace/patch/delete on namespaced objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object. Absence is `Ok(None)`, not an error.
    async fn get<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError>;

    /// Create `obj`, which must carry its name.
    async fn create<K: NamespacedObject>(&self, namespace: &str, obj: &K) -> Result<K, StoreError>;

    /// Replace the stored object.
    ///
    /// `obj` carries the `resourceVersion` it was read at; a stale version
    /// fails with [`StoreError::Conflict`].
    async fn replace<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
        obj: &K,
    ) -> Result<K, StoreError>;

    /// Apply a JSON merge patch.
    ///
    /// A `metadata.resourceVersion` inside the patch is checked like
    /// [`replace`](Self::replace) does.
    async fn patch_merge<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K, StoreError>;

    /// Request deletion. An absent object fails with [`StoreError::NotFound`].
    async fn delete<K: NamespacedObject>(&self, namespace: &str, name: &str)
        -> Result<(), StoreError>;
}

/// Run `fut`, giving up when `cancel` fires or `timeout` elapses.
///
/// # Errors
///
/// Returns [`StoreError::Cancelled`] or [`StoreError::Timeout`], or the error of
/// `fut` itself.
pub async fn with_deadline<T, F>(
    cancel: &CancellationToken,
    timeout: Duration,
    operation: impl FnOnce() -> String,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(StoreError::Cancelled { operation: operation() }),
        result = tokio::time::timeout(timeout, fut) => match result {
            Ok(inner) => inner,
            Err(_) => Err(StoreError::Timeout { operation: operation(), timeout }),
        },
    }
}

/// [`ObjectStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    cancel: CancellationToken,
    timeout: Duration,
    field_manager: String,
}

impl KubeStore {
    #[must_use]
    pub fn new(
        client: Client,
        cancel: CancellationToken,
        timeout: Duration,
        field_manager: impl Into<String>,
    ) -> Self {
        Self {
            client,
            cancel,
            timeout,
            field_manager: field_manager.into(),
        }
    }

    fn api<K: NamespacedObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }

    async fn call<K, T, F>(
        &self,
        action: &str,
        namespace: &str,
        name: &str,
        fut: F,
    ) -> Result<T, StoreError>
    where
        K: NamespacedObject,
        F: Future<Output = Result<T, kube::Error>> + Send,
    {
        debug!(
            namespace = %namespace,
            name = %name,
            kind = %K::kind(&()),
            "{action}"
        );
        with_deadline(
            &self.cancel,
            self.timeout,
            || format!("{action} {} {namespace}/{name}", K::kind(&())),
            async { fut.await.map_err(|e| map_kube_error::<K>(e, namespace, name)) },
        )
        .await
    }
}

/// Map a kube error for object `namespace/name` of kind `K`.
fn map_kube_error<K: NamespacedObject>(err: kube::Error, namespace: &str, name: &str) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound {
            kind: K::kind(&()).to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict {
            kind: K::kind(&()).to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: ae.message.clone(),
        },
        other => StoreError::Api(other),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        let api = self.api::<K>(namespace);
        self.call::<K, _, _>("get", namespace, name, api.get_opt(name))
            .await
    }

    async fn create<K: NamespacedObject>(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let api = self.api::<K>(namespace);
        let name = obj.meta().name.clone().unwrap_or_default();
        let params = self.post_params();
        self.call::<K, _, _>("create", namespace, &name, api.create(&params, obj))
            .await
    }

    async fn replace<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
        obj: &K,
    ) -> Result<K, StoreError> {
        let api = self.api::<K>(namespace);
        let params = self.post_params();
        self.call::<K, _, _>("replace", namespace, name, api.replace(name, &params, obj))
            .await
    }

    async fn patch_merge<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<K, StoreError> {
        let api = self.api::<K>(namespace);
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        self.call::<K, _, _>(
            "patch",
            namespace,
            name,
            api.patch(name, &params, &Patch::Merge(patch)),
        )
        .await
    }

    async fn delete<K: NamespacedObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let api = self.api::<K>(namespace);
        let params = DeleteParams::default();
        self.call::<K, _, _>("delete", namespace, name, api.delete(name, &params))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
