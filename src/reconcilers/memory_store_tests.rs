// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `memory_store.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::json;

    fn configmap(name: &str, finalizers: Option<Vec<String>>) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                finalizers,
                ..Default::default()
            },
            data: Some(BTreeMap::from([("k".to_string(), "v".to_string())])),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_patch_rfc7386() {
        let mut target = json!({"a": "b", "c": {"d": "e", "f": "g"}});
        json_merge_patch(&mut target, &json!({"a": "z", "c": {"f": null}}));
        assert_eq!(target, json!({"a": "z", "c": {"d": "e"}}));
    }

    #[test]
    fn test_merge_patch_replaces_arrays_and_scalars() {
        let mut target = json!({"list": [1, 2, 3], "n": {"x": 1}});
        json_merge_patch(&mut target, &json!({"list": [4], "n": 7}));
        assert_eq!(target, json!({"list": [4], "n": 7}));

        let mut target = json!("scalar");
        json_merge_patch(&mut target, &json!({"a": 1}));
        assert_eq!(target, json!({"a": 1}));
    }

    #[test]
    fn test_seed_stamps_uid_and_version_without_recording() {
        let store = MemoryStore::new();
        let seeded = store.seed(&configmap("cm", None));

        assert!(seeded.metadata.uid.is_some());
        assert!(seeded.metadata.resource_version.is_some());
        assert!(store.contains::<ConfigMap>("ns", "cm"));
        assert!(store.ops().is_empty());
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = MemoryStore::new();
        let created = store
            .create("ns", &configmap("cm", None))
            .await
            .expect("create");

        let fetched: ConfigMap = store.get("ns", "cm").await.expect("get").expect("present");
        assert_eq!(fetched, created);
        assert_eq!(fetched.metadata.namespace.as_deref(), Some("ns"));

        let absent: Option<ConfigMap> = store.get("ns", "other").await.expect("get");
        assert!(absent.is_none());

        let verbs: Vec<Verb> = store.ops().iter().map(|op| op.verb).collect();
        assert_eq!(verbs, vec![Verb::Create, Verb::Get, Verb::Get]);
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_create_existing_conflicts() {
        let store = MemoryStore::new();
        store.seed(&configmap("cm", None));

        let err = store
            .create("ns", &configmap("cm", None))
            .await
            .expect_err("duplicate create");
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_replace_checks_resource_version() {
        let store = MemoryStore::new();
        let seeded = store.seed(&configmap("cm", None));

        let mut update = seeded.clone();
        update.data = Some(BTreeMap::from([("k".to_string(), "v2".to_string())]));
        let replaced = store.replace("ns", "cm", &update).await.expect("replace");
        assert_ne!(replaced.metadata.resource_version, seeded.metadata.resource_version);
        assert_eq!(replaced.metadata.uid, seeded.metadata.uid);

        // Stale version from before the first replace
        let err = store
            .replace("ns", "cm", &update)
            .await
            .expect_err("stale replace");
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_replace_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .replace("ns", "cm", &configmap("cm", None))
            .await
            .expect_err("missing");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_patch_checks_resource_version() {
        let store = MemoryStore::new();
        store.seed(&configmap("cm", None));

        let err = store
            .patch_merge::<ConfigMap>(
                "ns",
                "cm",
                &json!({"metadata": {"resourceVersion": "999"}, "data": {"k": "x"}}),
            )
            .await
            .expect_err("stale patch");
        assert!(err.is_conflict());

        let patched: ConfigMap = store
            .patch_merge("ns", "cm", &json!({"data": {"k2": "v2"}}))
            .await
            .expect("patch");
        let data = patched.data.expect("data");
        assert_eq!(data["k"], "v");
        assert_eq!(data["k2"], "v2");
    }

    #[tokio::test]
    async fn test_delete_without_finalizers_removes() {
        let store = MemoryStore::new();
        store.seed(&configmap("cm", None));

        store.delete::<ConfigMap>("ns", "cm").await.expect("delete");
        assert!(!store.contains::<ConfigMap>("ns", "cm"));

        let err = store
            .delete::<ConfigMap>("ns", "cm")
            .await
            .expect_err("second delete");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_with_finalizers_waits_for_removal() {
        let store = MemoryStore::new();
        store.seed(&configmap("cm", Some(vec!["example.com/hold".to_string()])));

        store.delete::<ConfigMap>("ns", "cm").await.expect("delete");
        let pending = store.object::<ConfigMap>("ns", "cm").expect("still stored");
        assert!(pending.metadata.deletion_timestamp.is_some());

        let _: ConfigMap = store
            .patch_merge("ns", "cm", &json!({"metadata": {"finalizers": []}}))
            .await
            .expect("remove finalizer");
        assert!(!store.contains::<ConfigMap>("ns", "cm"));
    }

    #[tokio::test]
    async fn test_replace_keeps_deletion_timestamp() {
        let store = MemoryStore::new();
        store.seed(&configmap("cm", Some(vec!["example.com/hold".to_string()])));
        store.delete::<ConfigMap>("ns", "cm").await.expect("delete");

        let mut current = store.object::<ConfigMap>("ns", "cm").expect("stored");
        current.metadata.deletion_timestamp = None;
        let replaced = store.replace("ns", "cm", &current).await.expect("replace");

        assert!(replaced.metadata.deletion_timestamp.is_some());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::new();
        store.seed(&configmap("cm", None));
        store.fail_on(Verb::Get, "ConfigMap", FailureMode::Timeout);

        let err = store
            .get::<ConfigMap>("ns", "cm")
            .await
            .expect_err("injected timeout");
        assert!(matches!(err, StoreError::Timeout { .. }));
        // The failed call is still recorded
        assert_eq!(store.ops().len(), 1);

        store.clear_failures();
        store.fail_on(Verb::Create, "ConfigMap", FailureMode::Conflict);
        let err = store
            .create("ns", &configmap("other", None))
            .await
            .expect_err("injected conflict");
        assert!(err.is_conflict());
        assert!(!store.contains::<ConfigMap>("ns", "other"));
    }

    #[tokio::test]
    async fn test_cancel_fails_every_call() {
        let store = MemoryStore::new();
        store.seed(&configmap("cm", None));
        store.cancel();

        let err = store
            .get::<ConfigMap>("ns", "cm")
            .await
            .expect_err("cancelled");
        assert!(matches!(err, StoreError::Cancelled { .. }));
    }
}
