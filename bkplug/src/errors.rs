// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use thiserror::Error;

use crate::types::PluginKind;

#[derive(Debug, Error)]
pub enum BkplugError {
    #[error("unknown {kind} plugin: {name}")]
    PluginNotFound { kind: PluginKind, name: String },
    #[error("plugin name {name} is already used by another {kind} plugin")]
    PluginAlreadyRegistered { kind: PluginKind, name: String },
    #[error("invalid plugin name {name}: {reason}")]
    InvalidPluginName { name: String, reason: String },
    #[error("plugin name is required")]
    MissingPluginName,
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error("invalid configuration key {key} for plugin {plugin}")]
    InvalidConfigKey { plugin: String, key: String },
    #[error("{0} has not been initialized")]
    NotInitialized(String),
    #[error("snapshot {0} not found")]
    SnapshotNotFound(String),
    #[error("{0}: {1}")]
    DatabaseError(String, String),
    #[error("Failed to acquire database lock, please try again later")]
    DatabaseLockError,
    #[error("Internal error occurred. {0}")]
    InternalError(String),
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("{kind} is not a valid plugin kind")]
    InvalidPluginKind { kind: String },
    #[error("Error parsing config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),
}
