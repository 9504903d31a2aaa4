// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Client-side types for the Kernel Module Management (KMM) `Module` resource.
//!
//! KMM is an external operator: it watches `Module` objects, builds the kernel
//! module image when needed, loads the module on every node matching the
//! selector and finally labels those nodes with
//! [`kernel_module_ready_label`](crate::labels::kernel_module_ready_label).
//!
//! Only the subset of the `kmm.sigs.x-k8s.io/v1beta1` schema that this operator
//! writes is modelled here.

use k8s_openapi::api::core::v1::{Volume, VolumeMount};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crd::ImageRepoSecretRef;

/// Desired state of a KMM `Module`.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "kmm.sigs.x-k8s.io",
    version = "v1beta1",
    kind = "Module",
    namespaced,
    doc = "Module describes how to load a kernel module on matching nodes (owned by the Kernel Module Management operator)."
)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSpec {
    /// How the module is loaded on each node
    pub module_loader: ModuleLoaderSpec,

    /// Device plugin deployed on nodes where the module is loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_plugin: Option<DevicePluginSpec>,

    /// Pull secret for the module loader and device plugin images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_repo_secret: Option<ImageRepoSecretRef>,

    /// Nodes on which the module is loaded
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleLoaderSpec {
    pub container: ModuleLoaderContainerSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModuleLoaderContainerSpec {
    pub modprobe: ModprobeSpec,

    #[serde(default)]
    pub kernel_mappings: Vec<KernelMapping>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModprobeSpec {
    /// Name of the kernel module to load
    pub module_name: String,

    /// Firmware directory inside the module image, copied to the node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_path: Option<String>,
}

/// Maps kernels (by regexp) to the image providing the module for them.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KernelMapping {
    pub regexp: String,

    pub container_image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_tree_module_to_remove: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<Build>,
}

/// In-cluster build of the module image.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub dockerfile_config_map: LocalObjectReference,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_args: Vec<BuildArg>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
pub struct LocalObjectReference {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
pub struct BuildArg {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DevicePluginSpec {
    pub container: DevicePluginContainerSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DevicePluginContainerSpec {
    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

impl Default for Module {
    fn default() -> Self {
        Module::new("", ModuleSpec::default())
    }
}
