// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `crd.rs` and `kmm.rs`

#[cfg(test)]
mod tests {
    use crate::crd::*;
    use crate::kmm::Module;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::{CustomResourceExt, Resource};
    use std::collections::BTreeMap;

    #[test]
    fn test_device_config_resource_identity() {
        assert_eq!(DeviceConfig::group(&()), "amd.io");
        assert_eq!(DeviceConfig::version(&()), "v1alpha1");
        assert_eq!(DeviceConfig::kind(&()), "DeviceConfig");
        assert_eq!(DeviceConfig::plural(&()), "deviceconfigs");
        assert_eq!(DeviceConfig::api_version(&()), "amd.io/v1alpha1");
    }

    #[test]
    fn test_module_resource_identity() {
        assert_eq!(Module::api_version(&()), "kmm.sigs.x-k8s.io/v1beta1");
        assert_eq!(Module::kind(&()), "Module");
        assert_eq!(Module::plural(&()), "modules");
    }

    #[test]
    fn test_spec_deserializes_camel_case() {
        let yaml = r#"
useInTreeDrivers: true
driversImage: registry.example.com/amdgpu:custom
driversVersion: el9-6.1
devicePluginImage: rocm/k8s-device-plugin:v1
imageRepoSecret:
  name: registry-pull
selector:
  feature-node-vendor-pci-1002-present: "true"
"#;
        let spec: DeviceConfigSpec = serde_yaml::from_str(yaml).expect("valid spec");

        assert!(spec.use_in_tree_drivers);
        assert_eq!(spec.drivers_image.as_deref(), Some("registry.example.com/amdgpu:custom"));
        assert_eq!(spec.drivers_version.as_deref(), Some("el9-6.1"));
        assert_eq!(spec.device_plugin_image.as_deref(), Some("rocm/k8s-device-plugin:v1"));
        assert_eq!(
            spec.image_repo_secret,
            Some(ImageRepoSecretRef {
                name: "registry-pull".to_string()
            })
        );
        assert_eq!(
            spec.selector,
            Some(BTreeMap::from([(
                "feature-node-vendor-pci-1002-present".to_string(),
                "true".to_string()
            )]))
        );
    }

    #[test]
    fn test_empty_spec_uses_defaults() {
        let spec: DeviceConfigSpec = serde_json::from_str("{}").expect("empty spec");
        assert_eq!(spec, DeviceConfigSpec::default());
    }

    #[test]
    fn test_unset_fields_are_not_serialized() {
        let value = serde_json::to_value(DeviceConfigSpec::default()).expect("serialize");
        assert_eq!(value, serde_json::json!({ "useInTreeDrivers": false }));
    }

    #[test]
    fn test_status_uses_driver_key() {
        let status: DeviceConfigStatus = serde_json::from_value(serde_json::json!({
            "devicePlugin": { "desiredNumber": 3, "availableNumber": 2 },
            "driver": { "nodesMatchingSelectorNumber": 3 }
        }))
        .expect("status");

        assert_eq!(status.device_plugin.desired_number, Some(3));
        assert_eq!(status.device_plugin.available_number, Some(2));
        assert_eq!(status.drivers.nodes_matching_selector_number, Some(3));
    }

    #[test]
    fn test_finalizer_and_termination_helpers() {
        let mut dc = DeviceConfig::new("gpu1", DeviceConfigSpec::default());
        assert!(!dc.is_terminating());
        assert!(!dc.has_finalizer("amd.node.kubernetes.io/deviceconfig-finalizer"));

        dc.metadata.finalizers = Some(vec![
            "amd.node.kubernetes.io/deviceconfig-finalizer".to_string(),
        ]);
        assert!(dc.has_finalizer("amd.node.kubernetes.io/deviceconfig-finalizer"));
        assert!(!dc.has_finalizer("example.com/other"));

        dc.metadata.deletion_timestamp = Some(
            serde_json::from_value::<Time>(serde_json::json!("2025-01-01T00:00:00Z"))
                .expect("timestamp"),
        );
        assert!(dc.is_terminating());
    }

    #[test]
    fn test_generated_crd() {
        let crd = DeviceConfig::crd();

        assert_eq!(crd.metadata.name.as_deref(), Some("deviceconfigs.amd.io"));
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(
            crd.spec.names.short_names,
            Some(vec!["gpue".to_string()])
        );
        assert_eq!(crd.spec.versions.len(), 1);
        assert_eq!(crd.spec.versions[0].name, "v1alpha1");
        assert!(crd.spec.versions[0]
            .subresources
            .as_ref()
            .is_some_and(|s| s.status.is_some()));
    }
}
