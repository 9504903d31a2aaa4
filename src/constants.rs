// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the AMD GPU operator.
//!
//! Most of these are only defaults: the reconciler reads them through
//! [`ReconcilerSettings`](crate::config::ReconcilerSettings), which can be
//! overridden from the operator configuration file.

// ============================================================================
// API Constants
// ============================================================================

/// Kind name for `DeviceConfig` resource
pub const KIND_DEVICE_CONFIG: &str = "DeviceConfig";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer placed on `DeviceConfig` resources before their children are created
pub const FINALIZER_DEVICE_CONFIG: &str = "amd.node.kubernetes.io/deviceconfig-finalizer";

// ============================================================================
// Hardware Constants
// ============================================================================

/// PCI vendor identifier of AMD
pub const AMD_PCI_VENDOR_ID: &str = "1002";

// ============================================================================
// Driver Build Constants
// ============================================================================

/// Kernel module loaded by KMM on matching nodes
pub const GPU_DRIVER_MODULE_NAME: &str = "amdgpu";

/// Firmware directory inside the driver image
pub const IMAGE_FIRMWARE_PATH: &str = "firmwareDir/updates";

/// Kernel mapping regexp matching any kernel; version selection happens in the build
pub const KERNEL_MAPPING_REGEXP: &str = "^.+$";

/// Build argument carrying the resolved driver version
pub const DRIVERS_VERSION_BUILD_ARG: &str = "DRIVERS_VERSION";

/// Key of the build `ConfigMap` holding the Dockerfile
pub const DOCKERFILE_CONFIGMAP_KEY: &str = "dockerfile";

/// Prefix of the build `ConfigMap` name
pub const DOCKERFILE_CONFIGMAP_PREFIX: &str = "dockerfile-";

/// Driver version used when the `DeviceConfig` does not set one
pub const DEFAULT_DRIVERS_VERSION: &str = "el9-6.0";

/// Placeholder replaced by the resolved driver version in the image template
pub const DRIVERS_VERSION_PLACEHOLDER: &str = "{version}";

/// Template for the driver image when the `DeviceConfig` does not set one.
///
/// `$MOD_NAMESPACE` and `$KERNEL_VERSION` are expanded by KMM, not by us.
pub const DEFAULT_DRIVERS_IMAGE_TEMPLATE: &str =
    "image-registry.openshift-image-registry.svc:5000/$MOD_NAMESPACE/amd_gpu_kmm_modules:{version}-$KERNEL_VERSION";

/// Multi-stage Dockerfile used by KMM to build the out-of-tree driver
pub const DRIVERS_DOCKERFILE: &str = include_str!("../templates/driversDockerfile.txt");

// ============================================================================
// Image Constants
// ============================================================================

/// Device plugin image used when the `DeviceConfig` does not set one
pub const DEFAULT_DEVICE_PLUGIN_IMAGE: &str = "rocm/k8s-device-plugin";

/// Node metrics exporter image
pub const DEFAULT_METRICS_IMAGE: &str = "quay.io/yshnaidm/node-exporter:latest";

/// Node labeller image
pub const DEFAULT_NODE_LABELLER_IMAGE: &str = "rocm/k8s-device-plugin:labeller-latest";

// ============================================================================
// Service Accounts
// ============================================================================

/// `ServiceAccount` used by the KMM module loader pods
pub const MODULE_LOADER_SERVICE_ACCOUNT: &str = "amd-gpu-operator-kmm-module-loader";

/// `ServiceAccount` used by the KMM device plugin pods
pub const DEVICE_PLUGIN_SERVICE_ACCOUNT: &str = "amd-gpu-operator-kmm-device-plugin";

/// `ServiceAccount` used by the node metrics pods
pub const NODE_METRICS_SERVICE_ACCOUNT: &str = "amd-gpu-operator-node-metrics";

/// `ServiceAccount` used by the node labeller pods
pub const NODE_LABELLER_SERVICE_ACCOUNT: &str = "amd-gpu-operator-node-labeller";

// ============================================================================
// Child Resource Naming
// ============================================================================

/// Suffix of the node metrics `DaemonSet` name
pub const NODE_METRICS_SUFFIX: &str = "-node-metrics";

/// Suffix of the node labeller `DaemonSet` name
pub const NODE_LABELLER_SUFFIX: &str = "-node-labeller";

// ============================================================================
// Node Metrics Constants
// ============================================================================

/// Container and host port exposed by the metrics exporter
pub const METRICS_PORT: i32 = 9110;

/// Name of the metrics exporter port
pub const METRICS_PORT_NAME: &str = "node-metrics";

/// Name of the metrics exporter container
pub const CONTAINER_NAME_NODE_METRICS: &str = "node-metrics-container";

/// Name of the node labeller container
pub const CONTAINER_NAME_NODE_LABELLER: &str = "node-labeller-container";

/// Priority class of the node labeller pods
pub const NODE_LABELLER_PRIORITY_CLASS: &str = "system-node-critical";

/// Kubernetes host path type for directories that must already exist
pub const HOST_PATH_DIRECTORY: &str = "Directory";

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Requeue duration after an optimistic-concurrency conflict (5 seconds)
pub const CONFLICT_REQUEUE_DURATION_SECS: u64 = 5;

/// Requeue duration after an error that will not clear on its own, such as a
/// serialization failure (5 minutes)
pub const NON_RETRYABLE_REQUEUE_DURATION_SECS: u64 = 300;

/// Requeue duration after a successful reconciliation (5 minutes)
pub const SUCCESS_REQUEUE_DURATION_SECS: u64 = 300;

/// Requeue duration while a deleted `DeviceConfig` still has children (5 seconds)
pub const FINALIZE_REQUEUE_DURATION_SECS: u64 = 5;

/// Default deadline for a single Kubernetes API call
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Field manager / controller name reported to the API server
pub const CONTROLLER_NAME: &str = "amd-gpu-operator";

// ============================================================================
// Metrics and Health Server Constants
// ============================================================================

/// Default bind address for the Prometheus metrics HTTP server
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default bind address for the health probe HTTP server
pub const DEFAULT_HEALTH_PROBE_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Path for the liveness probe
pub const HEALTHZ_PATH: &str = "/healthz";

/// Path for the readiness probe
pub const READYZ_PATH: &str = "/readyz";
