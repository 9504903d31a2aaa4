// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Operator configuration.
//!
//! Configuration comes from three layers, later ones winning:
//! 1. defaults from [`crate::constants`],
//! 2. an optional YAML file passed with `--config`,
//! 3. bind address flags on the command line.
//!
//! # Example
//!
//! ```yaml
//! healthProbeBindAddress: 0.0.0.0:8081
//! metricsBindAddress: 0.0.0.0:8080
//! apiTimeoutSecs: 15
//! reconciler:
//!   defaultDriversVersion: el9-6.1
//!   enableNodeLabeller: true
//! ```

use anyhow::{Context as _, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    AMD_PCI_VENDOR_ID, DEFAULT_API_TIMEOUT_SECS, DEFAULT_DEVICE_PLUGIN_IMAGE,
    DEFAULT_DRIVERS_IMAGE_TEMPLATE, DEFAULT_DRIVERS_VERSION, DEFAULT_HEALTH_PROBE_BIND_ADDRESS,
    DEFAULT_METRICS_BIND_ADDRESS, DEFAULT_METRICS_IMAGE, DEFAULT_NODE_LABELLER_IMAGE,
    DRIVERS_DOCKERFILE, FINALIZER_DEVICE_CONFIG,
};

/// Command line of the operator binary.
#[derive(Parser, Debug, Clone, Default)]
#[command(about, version)]
pub struct Cli {
    /// Path of the YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address the Prometheus metrics endpoint binds to
    #[arg(long)]
    pub metrics_bind_address: Option<String>,

    /// Address the health and readiness probes bind to
    #[arg(long)]
    pub health_probe_bind_address: Option<String>,
}

/// Top-level operator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    pub health_probe_bind_address: String,
    pub metrics_bind_address: String,
    /// Deadline of a single Kubernetes API call, in seconds
    pub api_timeout_secs: u64,
    pub reconciler: ReconcilerSettings,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            health_probe_bind_address: DEFAULT_HEALTH_PROBE_BIND_ADDRESS.to_string(),
            metrics_bind_address: DEFAULT_METRICS_BIND_ADDRESS.to_string(),
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            reconciler: ReconcilerSettings::default(),
        }
    }
}

impl OperatorConfig {
    /// Parse a YAML document. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid YAML for this schema.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).context("invalid operator configuration")
    }

    /// Read and parse the YAML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn from_file(path: &Path) -> Result<Self> {
        tracing::info!("Loading operator configuration from {:?}", path);
        let yaml = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml(&yaml).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Build the effective configuration from the command line.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be loaded.
    pub async fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path).await?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        Ok(config)
    }

    /// Apply command line overrides on top of the file configuration.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(addr) = &cli.metrics_bind_address {
            self.metrics_bind_address.clone_from(addr);
        }
        if let Some(addr) = &cli.health_probe_bind_address {
            self.health_probe_bind_address.clone_from(addr);
        }
    }

    #[must_use]
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Values the reconciler injects into the children it synthesizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcilerSettings {
    /// Finalizer guarding `DeviceConfig` deletion
    pub finalizer: String,
    /// PCI vendor id used for the default node selector
    pub pci_vendor_id: String,
    /// Driver version when `driversVersion` is unset
    pub default_drivers_version: String,
    /// Driver image when `driversImage` is unset; `{version}` is substituted
    pub drivers_image_template: String,
    pub default_device_plugin_image: String,
    pub metrics_image: String,
    pub node_labeller_image: String,
    /// Deploy the node labeller `DaemonSet`
    pub enable_node_labeller: bool,
    /// Dockerfile stored in the build `ConfigMap`
    pub build_dockerfile: String,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            finalizer: FINALIZER_DEVICE_CONFIG.to_string(),
            pci_vendor_id: AMD_PCI_VENDOR_ID.to_string(),
            default_drivers_version: DEFAULT_DRIVERS_VERSION.to_string(),
            drivers_image_template: DEFAULT_DRIVERS_IMAGE_TEMPLATE.to_string(),
            default_device_plugin_image: DEFAULT_DEVICE_PLUGIN_IMAGE.to_string(),
            metrics_image: DEFAULT_METRICS_IMAGE.to_string(),
            node_labeller_image: DEFAULT_NODE_LABELLER_IMAGE.to_string(),
            enable_node_labeller: false,
            build_dockerfile: DRIVERS_DOCKERFILE.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
