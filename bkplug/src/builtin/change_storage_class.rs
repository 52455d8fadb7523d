// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use std::collections::HashMap;

use log::{debug, info};
use serde_json::Value;

use crate::{
    errors::BkplugError,
    plugin::RestoreItemAction,
    types::{ResourceSelector, RestoreItemActionExecuteInput, RestoreItemActionExecuteOutput},
    utils::{nested_object_mut, nested_str},
};

pub const LEGACY_STORAGE_CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";

/// Rewrites the storage class of restored volumes and claims.
#[derive(Debug, Default)]
pub struct ChangeStorageClassAction {
    mapping: HashMap<String, String>,
}

impl ChangeStorageClassAction {
    pub fn new(mapping: HashMap<String, String>) -> Self {
        Self { mapping }
    }

    fn mapped(&self, storage_class: Option<&str>) -> Option<String> {
        storage_class.and_then(|class| self.mapping.get(class).cloned())
    }
}

impl RestoreItemAction for ChangeStorageClassAction {
    fn applies_to(&self) -> Result<ResourceSelector, BkplugError> {
        Ok(ResourceSelector::for_resources(&[
            "persistentvolumeclaims",
            "persistentvolumes",
        ]))
    }

    fn execute(
        &self,
        input: RestoreItemActionExecuteInput,
    ) -> Result<RestoreItemActionExecuteOutput, BkplugError> {
        let mut item = input.item;
        if self.mapping.is_empty() {
            debug!("No storage class mapping configured");
            return Ok(RestoreItemActionExecuteOutput::unchanged());
        }

        let spec_class = self.mapped(nested_str(&item, &["spec", "storageClassName"]));
        let is_claim = nested_str(&item, &["kind"]) == Some("PersistentVolumeClaim");
        let annotation_class = if is_claim {
            self.mapped(nested_str(
                &item,
                &["metadata", "annotations", LEGACY_STORAGE_CLASS_ANNOTATION],
            ))
        } else {
            None
        };

        if spec_class.is_none() && annotation_class.is_none() {
            return Ok(RestoreItemActionExecuteOutput::unchanged());
        }

        if let Some(class) = spec_class {
            info!(
                "Updating storage class of {} to {class}",
                nested_str(&item, &["metadata", "name"]).unwrap_or_default()
            );
            nested_object_mut(&mut item, &["spec"])?
                .insert("storageClassName".to_string(), Value::String(class));
        }
        if let Some(class) = annotation_class {
            nested_object_mut(&mut item, &["metadata", "annotations"])?.insert(
                LEGACY_STORAGE_CLASS_ANNOTATION.to_string(),
                Value::String(class),
            );
        }

        Ok(RestoreItemActionExecuteOutput::updated(item))
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn action() -> ChangeStorageClassAction {
        ChangeStorageClassAction::new(HashMap::from([(
            "gp2".to_string(),
            "standard".to_string(),
        )]))
    }

    fn run(action: &ChangeStorageClassAction, item: Value) -> RestoreItemActionExecuteOutput {
        action
            .execute(RestoreItemActionExecuteInput {
                item: item.clone(),
                item_from_backup: item,
                restore: json!({}),
            })
            .unwrap()
    }

    #[test]
    fn test_applies_to_volumes_and_claims() {
        let selector = action().applies_to().unwrap();
        assert_eq!(
            selector.included_resources,
            vec!["persistentvolumeclaims", "persistentvolumes"]
        );
        assert!(selector.included_namespaces.is_empty());
    }

    #[test]
    fn test_rewrites_volume() {
        let pv = json!({
            "kind": "PersistentVolume",
            "metadata": {"name": "pv-1"},
            "spec": {"storageClassName": "gp2", "capacity": {"storage": "1Gi"}}
        });
        let updated = run(&action(), pv).updated_item.unwrap();
        assert_eq!(updated["spec"]["storageClassName"], "standard");
        assert_eq!(updated["spec"]["capacity"]["storage"], "1Gi");
    }

    #[test]
    fn test_rewrites_claim_annotation() {
        let pvc = json!({
            "kind": "PersistentVolumeClaim",
            "metadata": {
                "name": "data",
                "annotations": {LEGACY_STORAGE_CLASS_ANNOTATION: "gp2"}
            },
            "spec": {"storageClassName": "gp2"}
        });
        let updated = run(&action(), pvc).updated_item.unwrap();
        assert_eq!(updated["spec"]["storageClassName"], "standard");
        assert_eq!(
            updated["metadata"]["annotations"][LEGACY_STORAGE_CLASS_ANNOTATION],
            "standard"
        );
    }

    #[test]
    fn test_volume_annotation_is_kept() {
        let pv = json!({
            "kind": "PersistentVolume",
            "metadata": {
                "name": "pv-1",
                "annotations": {LEGACY_STORAGE_CLASS_ANNOTATION: "gp2"}
            },
            "spec": {"storageClassName": "gp2"}
        });
        let updated = run(&action(), pv).updated_item.unwrap();
        assert_eq!(updated["spec"]["storageClassName"], "standard");
        assert_eq!(
            updated["metadata"]["annotations"][LEGACY_STORAGE_CLASS_ANNOTATION],
            "gp2"
        );
    }

    #[test]
    fn test_unmapped_class_is_unchanged() {
        let pv = json!({"kind": "PersistentVolume", "spec": {"storageClassName": "io1"}});
        assert_eq!(
            run(&action(), pv),
            RestoreItemActionExecuteOutput::unchanged()
        );

        let no_class = json!({"kind": "PersistentVolume", "spec": {}});
        assert_eq!(
            run(&action(), no_class),
            RestoreItemActionExecuteOutput::unchanged()
        );
    }

    #[test]
    fn test_empty_mapping_is_unchanged() {
        let pv = json!({"kind": "PersistentVolume", "spec": {"storageClassName": "gp2"}});
        assert_eq!(
            run(&ChangeStorageClassAction::default(), pv),
            RestoreItemActionExecuteOutput::unchanged()
        );
    }
}
