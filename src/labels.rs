// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label constants and node label helpers used across all reconcilers.
//!
//! This module defines the standard Kubernetes labels stamped on operator-managed
//! pods, plus the node labels published by external components (Node Feature
//! Discovery and KMM) that child workloads select on.

use std::collections::BTreeMap;

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the name of the application
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

/// Label for the role of a workload within the application
pub const K8S_ROLE: &str = "app.kubernetes.io/role";

// ============================================================================
// Label Values
// ============================================================================

/// Value for component/name/part-of on all GPU workloads
pub const APP_AMD_GPU: &str = "amd-gpu";

/// Role value for the node metrics exporter
pub const ROLE_METRICS: &str = "amd-gpu-metrics";

/// Pod label key of the node labeller `DaemonSet`
pub const DAEMONSET_NAME_LABEL: &str = "daemonset-name";

// ============================================================================
// Node Labels
// ============================================================================

/// Prefix of the node labels KMM sets once a module is loaded
pub const KMM_NODE_LABEL_PREFIX: &str = "kmm.node.kubernetes.io";

/// Node label set by KMM when the module `namespace/name` is loaded and ready.
///
/// ```
/// use amd_gpu_operator::labels::kernel_module_ready_label;
///
/// assert_eq!(
///     kernel_module_ready_label("ns", "gpu1"),
///     "kmm.node.kubernetes.io/ns.gpu1.ready"
/// );
/// ```
#[must_use]
pub fn kernel_module_ready_label(namespace: &str, name: &str) -> String {
    format!("{KMM_NODE_LABEL_PREFIX}/{namespace}.{name}.ready")
}

/// Node label advertising that a PCI device of `vendor_id` is present.
#[must_use]
pub fn vendor_pci_present_label(vendor_id: &str) -> String {
    format!("feature-node-vendor-pci-{vendor_id}-present")
}

/// Pod labels of the node metrics `DaemonSet`.
#[must_use]
pub fn build_metrics_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(K8S_COMPONENT.into(), APP_AMD_GPU.into());
    labels.insert(K8S_NAME.into(), APP_AMD_GPU.into());
    labels.insert(K8S_PART_OF.into(), APP_AMD_GPU.into());
    labels.insert(K8S_ROLE.into(), ROLE_METRICS.into());
    labels
}
