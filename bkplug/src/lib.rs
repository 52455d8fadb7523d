// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

//! Plugin contracts for backup orchestration.
//!
//! A plugin host registers [`plugin::RestoreItemAction`] and
//! [`plugin::VolumeSnapshotter`] implementations in a
//! [`registry::PluginRegistry`] under a `<DNS subdomain>/<name>` plugin name.
//! Every request an orchestrator sends names the plugin that should serve it.

pub mod builtin;
pub mod config;
pub mod errors;
pub mod plugin;
pub mod registry;
pub mod types;
pub mod utils;

use log::debug;

use crate::{config::Config, errors::BkplugError, registry::PluginRegistry};

pub mod directories {
    // The following directories are used by bkplug. They should be created by the
    // bkplug-rpc service via its unit settings. They will be manually created in the
    // case where bkplug-rpc is not being run as a service.
    //
    // ConfigurationDirectory: /etc/bkplug/
    pub const CFGDIR: &str = "/etc/bkplug";
    pub const CFGPATH_BKPLUG_CONFIG: &str = "/etc/bkplug/bkplug.toml";

    // RuntimeDirectory: /run/bkplug/
    pub const RTDIR: &str = "/run/bkplug";
    pub const RTPATH_BKPLUG_SOCKET: &str = "/run/bkplug/bkplug.sock";

    // StateDirectory: /var/lib/bkplug/
    pub const STDIR: &str = "/var/lib/bkplug";
    pub const STDIR_SNAPSHOTS: &str = "/var/lib/bkplug/snapshots";
}

/// Builds a registry holding every built-in plugin.
///
/// # Example
///
/// ```rust,no_run
/// use bkplug::{builtin::LOCAL_SNAPSHOTTER_PLUGIN, setup_registry, utils::open_config_file};
///
/// let registry = setup_registry(&open_config_file()).unwrap();
/// let snapshotter = registry.volume_snapshotter(LOCAL_SNAPSHOTTER_PLUGIN).unwrap();
/// ```
pub fn setup_registry(config: &Config) -> Result<PluginRegistry, BkplugError> {
    debug!("Registering built-in plugins");
    let mut registry = PluginRegistry::new();
    builtin::register_builtin_plugins(&mut registry, config)?;
    Ok(registry)
}
