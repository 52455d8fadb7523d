// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use log::debug;
use serde_json::Value;

use crate::{
    errors::BkplugError,
    plugin::RestoreItemAction,
    types::{ResourceSelector, RestoreItemActionExecuteInput, RestoreItemActionExecuteOutput},
    utils::{nested_object_mut, nested_str},
};

pub const SKIP_RESTORE_ANNOTATION: &str = "bkplug.io/skip-restore";
pub const RESTORE_NAME_ANNOTATION: &str = "bkplug.io/restore-name";
pub const BACKUP_NAME_ANNOTATION: &str = "bkplug.io/backup-name";

/// Stamps every restored item with the restore (and backup) it came from.
///
/// Items that were annotated with `bkplug.io/skip-restore: "true"` at backup
/// time are skipped instead.
#[derive(Debug, Default)]
pub struct RestoreAnnotationsAction {}

impl RestoreAnnotationsAction {
    pub fn new() -> Self {
        Self {}
    }
}

impl RestoreItemAction for RestoreAnnotationsAction {
    fn applies_to(&self) -> Result<ResourceSelector, BkplugError> {
        Ok(ResourceSelector::default())
    }

    fn execute(
        &self,
        input: RestoreItemActionExecuteInput,
    ) -> Result<RestoreItemActionExecuteOutput, BkplugError> {
        let RestoreItemActionExecuteInput {
            mut item,
            item_from_backup,
            restore,
        } = input;

        if !item.is_object() {
            return Err(BkplugError::InvalidDocument(
                "item must be a JSON object".to_string(),
            ));
        }

        if nested_str(
            &item_from_backup,
            &["metadata", "annotations", SKIP_RESTORE_ANNOTATION],
        ) == Some("true")
        {
            debug!(
                "Skipping {} on request of its backup annotation",
                nested_str(&item, &["metadata", "name"]).unwrap_or_default()
            );
            return Ok(RestoreItemActionExecuteOutput::skip());
        }

        let restore_name = nested_str(&restore, &["metadata", "name"]).unwrap_or_default();
        let backup_name = nested_str(&restore, &["spec", "backupName"]);

        let annotations = nested_object_mut(&mut item, &["metadata", "annotations"])?;
        annotations.insert(
            RESTORE_NAME_ANNOTATION.to_string(),
            Value::String(restore_name.to_string()),
        );
        if let Some(backup_name) = backup_name {
            annotations.insert(
                BACKUP_NAME_ANNOTATION.to_string(),
                Value::String(backup_name.to_string()),
            );
        }

        Ok(RestoreItemActionExecuteOutput::updated(item))
    }
}
