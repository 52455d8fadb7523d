// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

//! Plugins shipped with bkplug.

mod change_storage_class;
mod local_snapshotter;
mod pv_from_pvc;
mod restore_annotations;

use std::sync::Arc;

pub use change_storage_class::ChangeStorageClassAction;
pub use local_snapshotter::LocalVolumeSnapshotter;
pub use pv_from_pvc::PvFromPvcAction;
pub use restore_annotations::RestoreAnnotationsAction;

use crate::{config::Config, errors::BkplugError, registry::PluginRegistry};

pub const RESTORE_ANNOTATIONS_PLUGIN: &str = "bkplug.io/restore-annotations";
pub const CHANGE_STORAGE_CLASS_PLUGIN: &str = "bkplug.io/change-storage-class";
pub const PV_FROM_PVC_PLUGIN: &str = "bkplug.io/pv-from-pvc";
pub const LOCAL_SNAPSHOTTER_PLUGIN: &str = "bkplug.io/local";

pub fn register_builtin_plugins(
    registry: &mut PluginRegistry,
    config: &Config,
) -> Result<(), BkplugError> {
    registry.register_restore_item_action(
        RESTORE_ANNOTATIONS_PLUGIN,
        Arc::new(RestoreAnnotationsAction::new()),
    )?;
    registry.register_restore_item_action(
        CHANGE_STORAGE_CLASS_PLUGIN,
        Arc::new(ChangeStorageClassAction::new(
            config.storage_class_mapping().clone(),
        )),
    )?;
    registry.register_restore_item_action(PV_FROM_PVC_PLUGIN, Arc::new(PvFromPvcAction::new()))?;
    registry.register_volume_snapshotter(
        LOCAL_SNAPSHOTTER_PLUGIN,
        Arc::new(LocalVolumeSnapshotter::new(config.database())),
    )?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::PluginKind;

    #[test]
    fn test_register_builtin_plugins() {
        let mut registry = PluginRegistry::new();
        register_builtin_plugins(&mut registry, &Config::default()).unwrap();

        let plugins: Vec<_> = registry
            .list("bkplug-rpc")
            .into_iter()
            .map(|p| (p.kind, p.name))
            .collect();
        assert_eq!(
            plugins,
            vec![
                (
                    PluginKind::RestoreItemAction,
                    CHANGE_STORAGE_CLASS_PLUGIN.to_string()
                ),
                (
                    PluginKind::RestoreItemAction,
                    PV_FROM_PVC_PLUGIN.to_string()
                ),
                (
                    PluginKind::RestoreItemAction,
                    RESTORE_ANNOTATIONS_PLUGIN.to_string()
                ),
                (
                    PluginKind::VolumeSnapshotter,
                    LOCAL_SNAPSHOTTER_PLUGIN.to_string()
                ),
            ]
        );

        // Registering twice collides on every name.
        let again = register_builtin_plugins(&mut registry, &Config::default());
        assert!(again.is_err());
    }
}
