// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use log::debug;

use crate::{
    errors::BkplugError,
    plugin::RestoreItemAction,
    types::{
        ResourceIdentifier, ResourceSelector, RestoreItemActionExecuteInput,
        RestoreItemActionExecuteOutput,
    },
    utils::nested_str,
};

/// Restores the persistent volume a claim is bound to along with the claim.
#[derive(Debug, Default)]
pub struct PvFromPvcAction {}

impl PvFromPvcAction {
    pub fn new() -> Self {
        Self {}
    }
}

impl RestoreItemAction for PvFromPvcAction {
    fn applies_to(&self) -> Result<ResourceSelector, BkplugError> {
        Ok(ResourceSelector::for_resources(&["persistentvolumeclaims"]))
    }

    fn execute(
        &self,
        input: RestoreItemActionExecuteInput,
    ) -> Result<RestoreItemActionExecuteOutput, BkplugError> {
        let mut output = RestoreItemActionExecuteOutput::unchanged();
        match nested_str(&input.item, &["spec", "volumeName"]) {
            Some(volume_name) if !volume_name.is_empty() => {
                debug!("Adding persistent volume {volume_name} as an additional item");
                output.additional_items.push(ResourceIdentifier::new(
                    "",
                    "persistentvolumes",
                    "",
                    volume_name,
                ));
            }
            _ => debug!("Claim is not bound to a persistent volume"),
        }
        Ok(output)
    }
}

#[cfg(test)]
mod test {
    use serde_json::{Value, json};

    use super::*;

    fn run(item: Value) -> RestoreItemActionExecuteOutput {
        PvFromPvcAction::new()
            .execute(RestoreItemActionExecuteInput {
                item: item.clone(),
                item_from_backup: item,
                restore: json!({}),
            })
            .unwrap()
    }

    #[test]
    fn test_bound_claim_adds_volume() {
        let output = run(json!({
            "kind": "PersistentVolumeClaim",
            "metadata": {"name": "data", "namespace": "db"},
            "spec": {"volumeName": "pv-42"}
        }));
        assert_eq!(output.updated_item, None);
        assert!(!output.skip_restore);
        assert_eq!(
            output.additional_items,
            vec![ResourceIdentifier::new("", "persistentvolumes", "", "pv-42")]
        );
    }

    #[test]
    fn test_unbound_claim() {
        assert_eq!(
            run(json!({"kind": "PersistentVolumeClaim", "spec": {"volumeName": ""}})),
            RestoreItemActionExecuteOutput::unchanged()
        );
        assert_eq!(
            run(json!({"kind": "PersistentVolumeClaim", "spec": {}})),
            RestoreItemActionExecuteOutput::unchanged()
        );
    }
}
