// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for AMD GPU enablement.
//!
//! This module defines the [`DeviceConfig`] CRD, the single declarative resource a
//! cluster operator creates to enable AMD GPUs on a set of nodes. The operator
//! translates each `DeviceConfig` into a build `ConfigMap`, a KMM
//! [`Module`](crate::kmm::Module) and a node metrics `DaemonSet`.
//!
//! # Example: Creating a DeviceConfig
//!
//! ```rust,no_run
//! use amd_gpu_operator::crd::{DeviceConfigSpec, ImageRepoSecretRef};
//! use std::collections::BTreeMap;
//!
//! let spec = DeviceConfigSpec {
//!     use_in_tree_drivers: false,
//!     drivers_image: None,
//!     drivers_version: Some("el9-6.1".to_string()),
//!     device_plugin_image: None,
//!     image_repo_secret: Some(ImageRepoSecretRef {
//!         name: "registry-pull".to_string(),
//!     }),
//!     selector: Some(BTreeMap::from([(
//!         "node-role.kubernetes.io/gpu".to_string(),
//!         "true".to_string(),
//!     )])),
//! };
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to a pull secret in the same namespace as the `DeviceConfig`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
pub struct ImageRepoSecretRef {
    /// Name of the `Secret`.
    pub name: String,
}

/// `DeviceConfig` describes how the operator should enable AMD GPU devices.
///
/// # Example
///
/// ```yaml
/// apiVersion: amd.io/v1alpha1
/// kind: DeviceConfig
/// metadata:
///   name: gpu1
///   namespace: kube-amd-gpu
/// spec:
///   driversVersion: el9-6.0
///   imageRepoSecret:
///     name: registry-pull
///   selector:
///     feature-node-vendor-pci-1002-present: "true"
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "amd.io",
    version = "v1alpha1",
    kind = "DeviceConfig",
    namespaced,
    shortname = "gpue",
    doc = "DeviceConfig describes how to enable AMD GPU devices on a set of nodes. The operator builds and loads the amdgpu kernel module through KMM and deploys a node metrics exporter on nodes where the module is ready."
)]
#[kube(status = "DeviceConfigStatus")]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfigSpec {
    /// Use the in-tree driver shipped with the node kernel instead of an
    /// out-of-tree build.
    #[serde(default)]
    pub use_in_tree_drivers: bool,

    /// Image containing the drivers and firmware blobs.
    ///
    /// Defaults to the in-cluster registry image derived from `driversVersion`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drivers_image: Option<String>,

    /// Version of the driver sources, passed to the build as `DRIVERS_VERSION`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drivers_version: Option<String>,

    /// Device plugin image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_plugin_image: Option<String>,

    /// Pull secret used for pulling and pushing the images managed by the operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_repo_secret: Option<ImageRepoSecretRef>,

    /// Nodes on which the GPU should be enabled.
    ///
    /// When empty, every node advertising an AMD PCI device is selected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<BTreeMap<String, String>>,
}

/// Rollout counters of a workload deployed for a `DeviceConfig`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    /// Number of nodes targeted by the `DeviceConfig` selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes_matching_selector_number: Option<i32>,
    /// Number of pods that should be running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_number: Option<i32>,
    /// Number of pods actually running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_number: Option<i32>,
}

/// `DeviceConfig` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfigStatus {
    /// Status of the device plugin rollout
    #[serde(default)]
    pub device_plugin: DeploymentStatus,
    /// Status of the driver rollout
    #[serde(default, rename = "driver")]
    pub drivers: DeploymentStatus,
}

impl DeviceConfig {
    /// Whether the API server has started deleting this resource.
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether `finalizer` is present on this resource.
    #[must_use]
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|existing| existing == finalizer))
    }
}
