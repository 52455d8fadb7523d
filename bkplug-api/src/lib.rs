// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

//! gRPC surface for bkplug plugins: the generated wire types, a plugin host
//! and typed clients.

pub mod client;
pub mod config;
pub mod server;
#[path = "generated.rs"]
#[rustfmt::skip]
#[allow(clippy::all)]
pub mod v1;

use bkplug::{
    errors::ParseError,
    types::{PluginIdentifier, PluginKind, ResourceIdentifier, ResourceSelector},
};

impl From<ResourceIdentifier> for v1::ResourceIdentifier {
    fn from(value: ResourceIdentifier) -> Self {
        v1::ResourceIdentifier {
            group: value.group,
            resource: value.resource,
            namespace: value.namespace,
            name: value.name,
        }
    }
}

impl From<v1::ResourceIdentifier> for ResourceIdentifier {
    fn from(value: v1::ResourceIdentifier) -> Self {
        ResourceIdentifier {
            group: value.group,
            resource: value.resource,
            namespace: value.namespace,
            name: value.name,
        }
    }
}

impl From<ResourceSelector> for v1::ResourceSelector {
    fn from(value: ResourceSelector) -> Self {
        v1::ResourceSelector {
            included_namespaces: value.included_namespaces,
            excluded_namespaces: value.excluded_namespaces,
            included_resources: value.included_resources,
            excluded_resources: value.excluded_resources,
            selector: value.selector,
        }
    }
}

impl From<v1::ResourceSelector> for ResourceSelector {
    fn from(value: v1::ResourceSelector) -> Self {
        ResourceSelector {
            included_namespaces: value.included_namespaces,
            excluded_namespaces: value.excluded_namespaces,
            included_resources: value.included_resources,
            excluded_resources: value.excluded_resources,
            selector: value.selector,
        }
    }
}

impl From<PluginIdentifier> for v1::PluginIdentifier {
    fn from(value: PluginIdentifier) -> Self {
        v1::PluginIdentifier {
            command: value.command,
            kind: value.kind.to_string(),
            name: value.name,
        }
    }
}

impl TryFrom<v1::PluginIdentifier> for PluginIdentifier {
    type Error = ParseError;

    fn try_from(value: v1::PluginIdentifier) -> Result<Self, Self::Error> {
        Ok(PluginIdentifier {
            command: value.command,
            kind: PluginKind::try_from(value.kind.as_str())?,
            name: value.name,
        })
    }
}
