// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

//! Domain types exchanged between an orchestrator and its plugins.
//!
//! Documents (items, restores and persistent volumes) are kept as
//! [`serde_json::Value`]. Plugins read and rewrite the fields they care
//! about and pass everything else through untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ParseError;

/// Identifies a single cluster resource that should also be restored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    pub group: String,
    pub resource: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentifier {
    pub fn new(group: &str, resource: &str, namespace: &str, name: &str) -> Self {
        Self {
            group: group.to_string(),
            resource: resource.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group_resource = if self.group.is_empty() {
            self.resource.clone()
        } else {
            format!("{}.{}", self.resource, self.group)
        };
        if self.namespace.is_empty() {
            write!(f, "{group_resource}/{}", self.name)
        } else {
            write!(f, "{group_resource}/{}/{}", self.namespace, self.name)
        }
    }
}

/// Describes which resources a restore item action wants to see.
///
/// An empty selector matches every item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSelector {
    pub included_namespaces: Vec<String>,
    pub excluded_namespaces: Vec<String>,
    pub included_resources: Vec<String>,
    pub excluded_resources: Vec<String>,
    pub selector: String,
}

impl ResourceSelector {
    pub fn for_resources(resources: &[&str]) -> Self {
        Self {
            included_resources: resources.iter().map(|r| (*r).to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreItemActionExecuteInput {
    /// The item as it is about to be restored.
    pub item: Value,
    /// The item exactly as it was stored in the backup.
    pub item_from_backup: Value,
    /// The restore object driving this operation.
    pub restore: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreItemActionExecuteOutput {
    /// `None` leaves the item unchanged.
    pub updated_item: Option<Value>,
    pub additional_items: Vec<ResourceIdentifier>,
    pub skip_restore: bool,
}

impl RestoreItemActionExecuteOutput {
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn updated(item: Value) -> Self {
        Self {
            updated_item: Some(item),
            ..Default::default()
        }
    }

    pub fn skip() -> Self {
        Self {
            skip_restore: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub volume_type: String,
    pub iops: Option<i64>,
}

/// Converts a wire IOPS value, where zero means unset.
pub fn iops_from_wire(iops: i64) -> Option<i64> {
    if iops == 0 { None } else { Some(iops) }
}

pub fn iops_to_wire(iops: Option<i64>) -> i64 {
    iops.unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PluginKind {
    RestoreItemAction,
    VolumeSnapshotter,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::RestoreItemAction => write!(f, "RestoreItemAction"),
            PluginKind::VolumeSnapshotter => write!(f, "VolumeSnapshotter"),
        }
    }
}

impl TryFrom<&str> for PluginKind {
    type Error = ParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(match value {
            "RestoreItemAction" => PluginKind::RestoreItemAction,
            "VolumeSnapshotter" => PluginKind::VolumeSnapshotter,
            other => {
                return Err(ParseError::InvalidPluginKind {
                    kind: other.to_string(),
                });
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginIdentifier {
    /// Path of the binary hosting the plugin.
    pub command: String,
    pub kind: PluginKind,
    pub name: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_iops_zero_is_unset() {
        assert_eq!(iops_from_wire(0), None);
        assert_eq!(iops_from_wire(3000), Some(3000));
        assert_eq!(iops_to_wire(None), 0);
        assert_eq!(iops_to_wire(Some(125)), 125);
    }

    #[test]
    fn test_plugin_kind_names() {
        for kind in [PluginKind::RestoreItemAction, PluginKind::VolumeSnapshotter] {
            assert_eq!(
                PluginKind::try_from(kind.to_string().as_str()).unwrap(),
                kind
            );
        }
        assert!(PluginKind::try_from("ObjectStore").is_err());
    }

    #[test]
    fn test_resource_identifier_display() {
        let pv = ResourceIdentifier::new("", "persistentvolumes", "", "pv-1");
        assert_eq!(pv.to_string(), "persistentvolumes/pv-1");
        let deploy = ResourceIdentifier::new("apps", "deployments", "default", "web");
        assert_eq!(deploy.to_string(), "deployments.apps/default/web");
    }

    #[test]
    fn test_empty_selector() {
        assert!(ResourceSelector::default().is_empty());
        assert!(!ResourceSelector::for_resources(&["pods"]).is_empty());
    }
}
