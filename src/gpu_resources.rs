// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! GPU enablement Kubernetes resource builders
//!
//! This module computes the desired state of every child a `DeviceConfig` owns:
//! the build `ConfigMap`, the KMM `Module`, the node metrics `DaemonSet` and the
//! optional node labeller `DaemonSet`.
//!
//! Every builder has the shape `(existing, parent, settings) -> desired`. It
//! starts from the object currently stored (or an empty one) and only rewrites
//! the fields this operator owns, so labels, annotations and server defaulted
//! fields set by others survive and do not cause spurious updates. All
//! functions are pure and easily testable.

use crate::config::ReconcilerSettings;
use crate::constants::{
    CONTAINER_NAME_NODE_LABELLER, CONTAINER_NAME_NODE_METRICS, DEVICE_PLUGIN_SERVICE_ACCOUNT,
    DOCKERFILE_CONFIGMAP_KEY, DOCKERFILE_CONFIGMAP_PREFIX, DRIVERS_VERSION_BUILD_ARG,
    DRIVERS_VERSION_PLACEHOLDER, GPU_DRIVER_MODULE_NAME, HOST_PATH_DIRECTORY,
    IMAGE_FIRMWARE_PATH, KERNEL_MAPPING_REGEXP, METRICS_PORT, METRICS_PORT_NAME,
    MODULE_LOADER_SERVICE_ACCOUNT, NODE_LABELLER_PRIORITY_CLASS, NODE_LABELLER_SERVICE_ACCOUNT,
    NODE_LABELLER_SUFFIX, NODE_METRICS_SERVICE_ACCOUNT, NODE_METRICS_SUFFIX,
};
use crate::crd::{DeviceConfig, DeviceConfigSpec};
use crate::kmm::{
    Build, BuildArg, DevicePluginContainerSpec, DevicePluginSpec, KernelMapping,
    LocalObjectReference, ModprobeSpec, Module, ModuleLoaderContainerSpec, ModuleLoaderSpec,
    ModuleSpec,
};
use crate::labels::{
    build_metrics_labels, kernel_module_ready_label, vendor_pci_present_label,
    DAEMONSET_NAME_LABEL,
};
use k8s_openapi::api::{
    apps::v1::DaemonSet,
    core::v1::{
        ConfigMap, Container, ContainerPort, EnvVar, EnvVarSource, HostPathVolumeSource,
        ObjectFieldSelector, PodSpec, SecurityContext, Volume, VolumeMount,
    },
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::debug;

const IMAGE_PULL_ALWAYS: &str = "Always";
const PROTOCOL_TCP: &str = "TCP";

const NODE_LABELLER_COMMAND: &str = "./k8s-node-labeller";
const NODE_LABELLER_ARGS: [&str; 5] = ["-vram", "-cu-count", "-simd-count", "-device-id", "-family"];
const NODE_LABELLER_WORKING_DIR: &str = "/root";
const NODE_NAME_ENV: &str = "DS_NODE_NAME";
const NODE_NAME_FIELD_PATH: &str = "spec.nodeName";

// Volume names
const VOLUME_SYS: &str = "sys";
const VOLUME_ROOT: &str = "root-volume";
const VOLUME_HOST_SYS: &str = "sys-volume";
const VOLUME_DEV: &str = "dev-volume";

// ============================================================================
// Child names
// ============================================================================

/// Name of the build `ConfigMap` of `parent_name`.
#[must_use]
pub fn build_configmap_name(parent_name: &str) -> String {
    format!("{DOCKERFILE_CONFIGMAP_PREFIX}{parent_name}")
}

/// Name of the KMM `Module` of `parent_name`.
#[must_use]
pub fn module_name(parent_name: &str) -> String {
    parent_name.to_string()
}

/// Name of the node metrics `DaemonSet` of `parent_name`.
#[must_use]
pub fn node_metrics_name(parent_name: &str) -> String {
    format!("{parent_name}{NODE_METRICS_SUFFIX}")
}

/// Name of the node labeller `DaemonSet` of `parent_name`.
#[must_use]
pub fn node_labeller_name(parent_name: &str) -> String {
    format!("{parent_name}{NODE_LABELLER_SUFFIX}")
}

// ============================================================================
// Ownership
// ============================================================================

/// Builds the controller owner reference pointing at a `DeviceConfig`
///
/// Group, version and kind come from the `DeviceConfig` type itself.
#[must_use]
pub fn build_owner_reference(parent: &DeviceConfig) -> OwnerReference {
    OwnerReference {
        api_version: DeviceConfig::api_version(&()).to_string(),
        kind: DeviceConfig::kind(&()).to_string(),
        name: parent.name_any(),
        uid: parent.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Makes `parent` the controller of the object described by `meta`.
///
/// Our reference takes the slot of the first existing controller or
/// same-uid reference, so an unchanged child keeps its stored order. Other
/// such references are dropped; non-controller references stay in place.
pub fn set_controller_reference(meta: &mut ObjectMeta, parent: &DeviceConfig) {
    let mut owner = Some(build_owner_reference(parent));
    let uid = parent.metadata.uid.clone().unwrap_or_default();
    let mut refs = Vec::new();
    for existing in meta.owner_references.take().unwrap_or_default() {
        if existing.controller != Some(true) && existing.uid != uid {
            refs.push(existing);
        } else if let Some(ours) = owner.take() {
            refs.push(ours);
        }
    }
    refs.extend(owner);
    meta.owner_references = Some(refs);
}

// ============================================================================
// Value resolution
// ============================================================================

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

/// Driver version: `driversVersion`, or the configured default.
#[must_use]
pub fn resolve_drivers_version(spec: &DeviceConfigSpec, settings: &ReconcilerSettings) -> String {
    non_empty(spec.drivers_version.as_ref())
        .unwrap_or(&settings.default_drivers_version)
        .to_string()
}

/// Driver image: `driversImage`, or the configured template with the resolved
/// version substituted.
#[must_use]
pub fn resolve_drivers_image(spec: &DeviceConfigSpec, settings: &ReconcilerSettings) -> String {
    match non_empty(spec.drivers_image.as_ref()) {
        Some(image) => image.to_string(),
        None => settings.drivers_image_template.replace(
            DRIVERS_VERSION_PLACEHOLDER,
            &resolve_drivers_version(spec, settings),
        ),
    }
}

/// Device plugin image: `devicePluginImage`, or the configured default.
#[must_use]
pub fn resolve_device_plugin_image(
    spec: &DeviceConfigSpec,
    settings: &ReconcilerSettings,
) -> String {
    non_empty(spec.device_plugin_image.as_ref())
        .unwrap_or(&settings.default_device_plugin_image)
        .to_string()
}

/// Node selector of the KMM `Module`.
///
/// The `DeviceConfig` selector is used verbatim when it has at least one entry.
/// Otherwise every node advertising a PCI device of the configured vendor is
/// selected.
#[must_use]
pub fn module_node_selector(
    spec: &DeviceConfigSpec,
    settings: &ReconcilerSettings,
) -> BTreeMap<String, String> {
    match &spec.selector {
        Some(selector) if !selector.is_empty() => selector.clone(),
        _ => BTreeMap::from([(
            vendor_pci_present_label(&settings.pci_vendor_id),
            "true".to_string(),
        )]),
    }
}

/// Node selector shared by the `DaemonSet`s: nodes where KMM reports the
/// module of `parent` as loaded.
#[must_use]
pub fn module_ready_node_selector(parent: &DeviceConfig) -> BTreeMap<String, String> {
    BTreeMap::from([(
        kernel_module_ready_label(&parent.namespace().unwrap_or_default(), &parent.name_any()),
        String::new(),
    )])
}

// ============================================================================
// Build ConfigMap
// ============================================================================

/// Desired build `ConfigMap`: a single `dockerfile` key with the driver build
/// script.
#[must_use]
pub fn desired_build_configmap(
    mut existing: ConfigMap,
    parent: &DeviceConfig,
    settings: &ReconcilerSettings,
) -> ConfigMap {
    debug!(
        namespace = ?parent.namespace(),
        name = %parent.name_any(),
        "Building build ConfigMap for DeviceConfig"
    );

    existing.data = Some(BTreeMap::from([(
        DOCKERFILE_CONFIGMAP_KEY.to_string(),
        settings.build_dockerfile.clone(),
    )]));
    set_controller_reference(&mut existing.metadata, parent);
    existing
}

// ============================================================================
// KMM Module
// ============================================================================

/// Desired KMM `Module`: builds the out-of-tree driver with the build
/// `ConfigMap`, loads it on selected nodes and runs the device plugin there.
#[must_use]
pub fn desired_module(
    mut existing: Module,
    parent: &DeviceConfig,
    settings: &ReconcilerSettings,
) -> Module {
    let spec = &parent.spec;
    let drivers_version = resolve_drivers_version(spec, settings);
    let drivers_image = resolve_drivers_image(spec, settings);

    debug!(
        name = %parent.name_any(),
        drivers_version = %drivers_version,
        drivers_image = %drivers_image,
        "Building KMM Module for DeviceConfig"
    );

    existing.spec = ModuleSpec {
        module_loader: ModuleLoaderSpec {
            container: ModuleLoaderContainerSpec {
                modprobe: ModprobeSpec {
                    module_name: GPU_DRIVER_MODULE_NAME.to_string(),
                    firmware_path: Some(IMAGE_FIRMWARE_PATH.to_string()),
                },
                kernel_mappings: vec![KernelMapping {
                    regexp: KERNEL_MAPPING_REGEXP.to_string(),
                    container_image: drivers_image,
                    in_tree_module_to_remove: Some(GPU_DRIVER_MODULE_NAME.to_string()),
                    build: Some(Build {
                        dockerfile_config_map: LocalObjectReference {
                            name: build_configmap_name(&parent.name_any()),
                        },
                        build_args: vec![BuildArg {
                            name: DRIVERS_VERSION_BUILD_ARG.to_string(),
                            value: drivers_version,
                        }],
                    }),
                }],
            },
            service_account_name: Some(MODULE_LOADER_SERVICE_ACCOUNT.to_string()),
        },
        device_plugin: Some(desired_device_plugin(spec, settings)),
        image_repo_secret: spec.image_repo_secret.clone(),
        selector: module_node_selector(spec, settings),
    };
    set_controller_reference(&mut existing.metadata, parent);
    existing
}

fn desired_device_plugin(spec: &DeviceConfigSpec, settings: &ReconcilerSettings) -> DevicePluginSpec {
    DevicePluginSpec {
        container: DevicePluginContainerSpec {
            image: resolve_device_plugin_image(spec, settings),
            volume_mounts: vec![volume_mount(VOLUME_SYS, "/sys")],
        },
        service_account_name: Some(DEVICE_PLUGIN_SERVICE_ACCOUNT.to_string()),
        volumes: vec![host_path_volume(VOLUME_SYS, "/sys")],
    }
}

// ============================================================================
// DaemonSets
// ============================================================================

/// Desired node metrics `DaemonSet`: one privileged exporter per node where
/// the GPU driver is loaded.
#[must_use]
pub fn desired_metrics_daemonset(
    mut existing: DaemonSet,
    parent: &DeviceConfig,
    settings: &ReconcilerSettings,
) -> DaemonSet {
    debug!(
        name = %parent.name_any(),
        image = %settings.metrics_image,
        "Building node metrics DaemonSet for DeviceConfig"
    );

    let labels = build_metrics_labels();
    let mut ds_spec = existing.spec.take().unwrap_or_default();
    ds_spec.selector = LabelSelector {
        match_labels: Some(labels.clone()),
        ..Default::default()
    };

    let mut pod_meta = ds_spec.template.metadata.take().unwrap_or_default();
    pod_meta.labels = Some(labels);
    ds_spec.template.metadata = Some(pod_meta);

    let mut pod_spec = ds_spec.template.spec.take().unwrap_or_default();
    let mut container = take_container(&mut pod_spec, CONTAINER_NAME_NODE_METRICS);
    container.image = Some(settings.metrics_image.clone());
    container.image_pull_policy = Some(IMAGE_PULL_ALWAYS.to_string());
    let mut security = container.security_context.take().unwrap_or_default();
    security.privileged = Some(true);
    security.run_as_user = Some(0);
    container.security_context = Some(security);
    container.volume_mounts = Some(vec![
        volume_mount(VOLUME_ROOT, "/host/root"),
        volume_mount(VOLUME_HOST_SYS, "/host/sys"),
    ]);
    container.ports = Some(vec![ContainerPort {
        name: Some(METRICS_PORT_NAME.to_string()),
        container_port: METRICS_PORT,
        host_port: Some(METRICS_PORT),
        protocol: Some(PROTOCOL_TCP.to_string()),
        ..Default::default()
    }]);

    pod_spec.containers = vec![container];
    pod_spec.node_selector = Some(module_ready_node_selector(parent));
    pod_spec.service_account_name = Some(NODE_METRICS_SERVICE_ACCOUNT.to_string());
    pod_spec.volumes = Some(vec![
        host_path_volume(VOLUME_ROOT, "/"),
        host_path_volume(VOLUME_HOST_SYS, "/sys"),
    ]);
    ds_spec.template.spec = Some(pod_spec);

    existing.spec = Some(ds_spec);
    set_controller_reference(&mut existing.metadata, parent);
    existing
}

/// Desired node labeller `DaemonSet`: labels each node with the properties of
/// its GPUs once the driver is loaded.
#[must_use]
pub fn desired_node_labeller_daemonset(
    mut existing: DaemonSet,
    parent: &DeviceConfig,
    settings: &ReconcilerSettings,
) -> DaemonSet {
    debug!(
        name = %parent.name_any(),
        image = %settings.node_labeller_image,
        "Building node labeller DaemonSet for DeviceConfig"
    );

    let labels = BTreeMap::from([(DAEMONSET_NAME_LABEL.to_string(), parent.name_any())]);
    let mut ds_spec = existing.spec.take().unwrap_or_default();
    ds_spec.selector = LabelSelector {
        match_labels: Some(labels.clone()),
        ..Default::default()
    };

    let mut pod_meta = ds_spec.template.metadata.take().unwrap_or_default();
    pod_meta.labels = Some(labels);
    ds_spec.template.metadata = Some(pod_meta);

    let mut pod_spec = ds_spec.template.spec.take().unwrap_or_default();
    let mut container = take_container(&mut pod_spec, CONTAINER_NAME_NODE_LABELLER);
    container.image = Some(settings.node_labeller_image.clone());
    container.image_pull_policy = Some(IMAGE_PULL_ALWAYS.to_string());
    container.command = Some(vec![NODE_LABELLER_COMMAND.to_string()]);
    container.args = Some(NODE_LABELLER_ARGS.iter().map(ToString::to_string).collect());
    container.working_dir = Some(NODE_LABELLER_WORKING_DIR.to_string());
    container.env = Some(vec![EnvVar {
        name: NODE_NAME_ENV.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: NODE_NAME_FIELD_PATH.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }]);
    let mut security: SecurityContext = container.security_context.take().unwrap_or_default();
    security.privileged = Some(true);
    container.security_context = Some(security);
    container.volume_mounts = Some(vec![
        volume_mount(VOLUME_DEV, "/dev"),
        volume_mount(VOLUME_HOST_SYS, "/sys"),
    ]);

    pod_spec.containers = vec![container];
    pod_spec.priority_class_name = Some(NODE_LABELLER_PRIORITY_CLASS.to_string());
    pod_spec.node_selector = Some(module_ready_node_selector(parent));
    pod_spec.service_account_name = Some(NODE_LABELLER_SERVICE_ACCOUNT.to_string());
    pod_spec.volumes = Some(vec![
        host_path_volume(VOLUME_DEV, "/dev"),
        host_path_volume(VOLUME_HOST_SYS, "/sys"),
    ]);
    ds_spec.template.spec = Some(pod_spec);

    existing.spec = Some(ds_spec);
    set_controller_reference(&mut existing.metadata, parent);
    existing
}

/// Removes every container from `pod_spec` and returns the one named `name`,
/// or a fresh container with that name.
fn take_container(pod_spec: &mut PodSpec, name: &str) -> Container {
    std::mem::take(&mut pod_spec.containers)
        .into_iter()
        .find(|c| c.name == name)
        .unwrap_or_else(|| Container {
            name: name.to_string(),
            ..Default::default()
        })
}

fn volume_mount(name: &str, mount_path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: mount_path.to_string(),
        ..Default::default()
    }
}

fn host_path_volume(name: &str, path: &str) -> Volume {
    Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: path.to_string(),
            type_: Some(HOST_PATH_DIRECTORY.to_string()),
        }),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "gpu_resources_tests.rs"]
mod gpu_resources_tests;
