// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # AMD GPU Operator for Kubernetes
//!
//! A Kubernetes operator that enables AMD GPUs on cluster nodes from a single
//! declarative `DeviceConfig` resource.
//!
//! ## Overview
//!
//! For every `DeviceConfig` the operator maintains:
//!
//! - a `ConfigMap` with the Dockerfile used to build the out-of-tree `amdgpu` driver,
//! - a Kernel Module Management (KMM) `Module` that builds and loads the driver
//!   and runs the device plugin on selected nodes,
//! - a node metrics `DaemonSet` on nodes where the driver is loaded,
//! - optionally, a node labeller `DaemonSet`.
//!
//! Deleting a `DeviceConfig` tears these down in a fixed order behind a finalizer.
//!
//! ## Modules
//!
//! - [`crd`] - the `DeviceConfig` Custom Resource Definition
//! - [`kmm`] - client types for the KMM `Module` resource
//! - [`gpu_resources`] - desired state of every child resource
//! - [`reconcilers`] - reconciliation logic and the object store
//! - [`config`] - operator configuration
//! - [`context`] - shared controller context
//! - [`errors`] - error types
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use amd_gpu_operator::config::ReconcilerSettings;
//! use amd_gpu_operator::crd::{DeviceConfig, DeviceConfigSpec};
//! use amd_gpu_operator::gpu_resources::{resolve_drivers_image, resolve_drivers_version};
//!
//! let config = DeviceConfig::new("gpu1", DeviceConfigSpec::default());
//! let settings = ReconcilerSettings::default();
//!
//! assert_eq!(resolve_drivers_version(&config.spec, &settings), "el9-6.0");
//! println!("{}", resolve_drivers_image(&config.spec, &settings));
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod errors;
pub mod gpu_resources;
pub mod kmm;
pub mod labels;
pub mod metrics;
pub mod reconcilers;

#[cfg(test)]
mod crd_tests;
