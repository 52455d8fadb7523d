// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use std::{collections::BTreeMap, sync::Arc};

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::{
    errors::BkplugError,
    plugin::{RestoreItemAction, VolumeSnapshotter},
    types::{PluginIdentifier, PluginKind},
};

const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;

lazy_static! {
    static ref DNS1123_SUBDOMAIN: Regex =
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
            .expect("static regex is valid");
}

/// Checks that a plugin name has the form `<DNS subdomain>/<non-empty name>`.
pub fn validate_plugin_name(name: &str) -> Result<(), BkplugError> {
    let invalid = |reason: &str| BkplugError::InvalidPluginName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let Some((prefix, suffix)) = name.split_once('/') else {
        return Err(invalid(
            "expected exactly two parts separated by a `/` (<DNS subdomain>/<non-empty name>)",
        ));
    };
    if suffix.contains('/') {
        return Err(invalid(
            "expected exactly two parts separated by a `/` (<DNS subdomain>/<non-empty name>)",
        ));
    }
    if prefix.len() > DNS1123_SUBDOMAIN_MAX_LENGTH || !DNS1123_SUBDOMAIN.is_match(prefix) {
        return Err(invalid("prefix must be a DNS subdomain"));
    }
    if suffix.is_empty() {
        return Err(invalid("name after the `/` must be non-empty"));
    }
    Ok(())
}

/// Holds every plugin a host serves, keyed by plugin name.
#[derive(Default)]
pub struct PluginRegistry {
    restore_item_actions: BTreeMap<String, Arc<dyn RestoreItemAction>>,
    volume_snapshotters: BTreeMap<String, Arc<dyn VolumeSnapshotter>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_restore_item_action(
        &mut self,
        name: &str,
        action: Arc<dyn RestoreItemAction>,
    ) -> Result<(), BkplugError> {
        validate_plugin_name(name)?;
        if self.restore_item_actions.contains_key(name) {
            return Err(BkplugError::PluginAlreadyRegistered {
                kind: PluginKind::RestoreItemAction,
                name: name.to_string(),
            });
        }
        debug!("Registering RestoreItemAction plugin {name}");
        self.restore_item_actions.insert(name.to_string(), action);
        Ok(())
    }

    pub fn register_volume_snapshotter(
        &mut self,
        name: &str,
        snapshotter: Arc<dyn VolumeSnapshotter>,
    ) -> Result<(), BkplugError> {
        validate_plugin_name(name)?;
        if self.volume_snapshotters.contains_key(name) {
            return Err(BkplugError::PluginAlreadyRegistered {
                kind: PluginKind::VolumeSnapshotter,
                name: name.to_string(),
            });
        }
        debug!("Registering VolumeSnapshotter plugin {name}");
        self.volume_snapshotters
            .insert(name.to_string(), snapshotter);
        Ok(())
    }

    pub fn restore_item_action(
        &self,
        name: &str,
    ) -> Result<Arc<dyn RestoreItemAction>, BkplugError> {
        self.restore_item_actions
            .get(name)
            .cloned()
            .ok_or_else(|| BkplugError::PluginNotFound {
                kind: PluginKind::RestoreItemAction,
                name: name.to_string(),
            })
    }

    pub fn volume_snapshotter(
        &self,
        name: &str,
    ) -> Result<Arc<dyn VolumeSnapshotter>, BkplugError> {
        self.volume_snapshotters
            .get(name)
            .cloned()
            .ok_or_else(|| BkplugError::PluginNotFound {
                kind: PluginKind::VolumeSnapshotter,
                name: name.to_string(),
            })
    }

    /// Lists every registered plugin, ordered by kind and then by name.
    pub fn list(&self, command: &str) -> Vec<PluginIdentifier> {
        let identifier = |kind: PluginKind, name: &String| PluginIdentifier {
            command: command.to_string(),
            kind,
            name: name.clone(),
        };
        self.restore_item_actions
            .keys()
            .map(|name| identifier(PluginKind::RestoreItemAction, name))
            .chain(
                self.volume_snapshotters
                    .keys()
                    .map(|name| identifier(PluginKind::VolumeSnapshotter, name)),
            )
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.restore_item_actions.is_empty() && self.volume_snapshotters.is_empty()
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use serde_json::Value;

    use super::*;
    use crate::types::{
        ResourceSelector, RestoreItemActionExecuteInput, RestoreItemActionExecuteOutput,
    };

    struct Noop;

    impl RestoreItemAction for Noop {
        fn applies_to(&self) -> Result<ResourceSelector, BkplugError> {
            Ok(ResourceSelector::default())
        }

        fn execute(
            &self,
            _input: RestoreItemActionExecuteInput,
        ) -> Result<RestoreItemActionExecuteOutput, BkplugError> {
            Ok(RestoreItemActionExecuteOutput::unchanged())
        }
    }

    #[test]
    fn test_valid_plugin_names() {
        for name in ["bkplug.io/local", "example.com/a", "a/b-c_d", "x-1.y-2/name"] {
            assert!(validate_plugin_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_plugin_names() {
        for name in [
            "",
            "noslash",
            "a/b/c",
            "/name",
            "bkplug.io/",
            "Upper.io/name",
            "-dash.io/name",
            "dash-.io/name",
            "under_score.io/name",
        ] {
            assert_matches!(
                validate_plugin_name(name),
                Err(BkplugError::InvalidPluginName { .. }),
                "{name} should be invalid"
            );
        }
        let long_prefix = format!("{}/name", "a".repeat(DNS1123_SUBDOMAIN_MAX_LENGTH + 1));
        assert!(validate_plugin_name(&long_prefix).is_err());
    }

    #[test]
    fn test_prefix_length_limit() {
        let label = "a".repeat(63);
        // Four 63 character labels joined by dots: 255 characters.
        let labels = [label.as_str(); 4].join(".");

        let longest = format!("{}/name", &labels[..DNS1123_SUBDOMAIN_MAX_LENGTH]);
        assert!(validate_plugin_name(&longest).is_ok());

        let too_long = format!("{}/name", &labels[..=DNS1123_SUBDOMAIN_MAX_LENGTH]);
        assert!(validate_plugin_name(&too_long).is_err());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = PluginRegistry::new();
        registry
            .register_restore_item_action("bkplug.io/noop", Arc::new(Noop))
            .unwrap();
        assert_matches!(
            registry.register_restore_item_action("bkplug.io/noop", Arc::new(Noop)),
            Err(BkplugError::PluginAlreadyRegistered {
                kind: PluginKind::RestoreItemAction,
                ..
            })
        );
    }

    #[test]
    fn test_lookup() {
        let mut registry = PluginRegistry::new();
        assert!(registry.is_empty());
        registry
            .register_restore_item_action("bkplug.io/noop", Arc::new(Noop))
            .unwrap();

        let action = registry.restore_item_action("bkplug.io/noop").unwrap();
        let output = action
            .execute(RestoreItemActionExecuteInput {
                item: Value::Null,
                item_from_backup: Value::Null,
                restore: Value::Null,
            })
            .unwrap();
        assert_eq!(output, RestoreItemActionExecuteOutput::unchanged());

        assert_matches!(
            registry.restore_item_action("bkplug.io/missing").err(),
            Some(BkplugError::PluginNotFound { .. })
        );
        // Names are scoped per kind.
        assert_matches!(
            registry.volume_snapshotter("bkplug.io/noop").err(),
            Some(BkplugError::PluginNotFound {
                kind: PluginKind::VolumeSnapshotter,
                ..
            })
        );
    }

    #[test]
    fn test_list_is_ordered() {
        let mut registry = PluginRegistry::new();
        registry
            .register_restore_item_action("z.io/last", Arc::new(Noop))
            .unwrap();
        registry
            .register_restore_item_action("a.io/first", Arc::new(Noop))
            .unwrap();

        let names: Vec<_> = registry
            .list("/usr/sbin/bkplug-rpc")
            .into_iter()
            .map(|p| (p.kind, p.name, p.command))
            .collect();
        assert_eq!(
            names,
            vec![
                (
                    PluginKind::RestoreItemAction,
                    "a.io/first".to_string(),
                    "/usr/sbin/bkplug-rpc".to_string()
                ),
                (
                    PluginKind::RestoreItemAction,
                    "z.io/last".to_string(),
                    "/usr/sbin/bkplug-rpc".to_string()
                ),
            ]
        );
    }
}
