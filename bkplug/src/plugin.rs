// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use std::collections::HashMap;

use serde_json::Value;

use crate::{
    errors::BkplugError,
    types::{
        ResourceSelector, RestoreItemActionExecuteInput, RestoreItemActionExecuteOutput,
        VolumeInfo,
    },
};

/// A restore item action inspects, rewrites or skips items while a restore
/// runs.
pub trait RestoreItemAction: Send + Sync {
    /// Returns the set of resources this action should be invoked for.
    fn applies_to(&self) -> Result<ResourceSelector, BkplugError>;

    /// Runs the action against a single item.
    fn execute(
        &self,
        input: RestoreItemActionExecuteInput,
    ) -> Result<RestoreItemActionExecuteOutput, BkplugError>;
}

/// A volume snapshotter takes and restores point-in-time copies of storage
/// volumes.
///
/// `init` is called with the snapshot location configuration before any
/// other method.
pub trait VolumeSnapshotter: Send + Sync {
    fn init(&self, config: HashMap<String, String>) -> Result<(), BkplugError>;

    /// Creates a new volume from a snapshot and returns the new volume ID.
    fn create_volume_from_snapshot(
        &self,
        snapshot_id: &str,
        volume_type: &str,
        volume_az: &str,
        iops: Option<i64>,
    ) -> Result<String, BkplugError>;

    fn get_volume_info(&self, volume_id: &str, volume_az: &str) -> Result<VolumeInfo, BkplugError>;

    /// Snapshots a volume and returns the snapshot ID.
    fn create_snapshot(
        &self,
        volume_id: &str,
        volume_az: &str,
        tags: &HashMap<String, String>,
    ) -> Result<String, BkplugError>;

    fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), BkplugError>;

    /// Extracts the volume ID from a persistent volume. An empty ID means the
    /// volume is not handled by this snapshotter.
    fn get_volume_id(&self, persistent_volume: &Value) -> Result<String, BkplugError>;

    /// Returns the persistent volume rewritten to point at `volume_id`.
    fn set_volume_id(
        &self,
        persistent_volume: Value,
        volume_id: &str,
    ) -> Result<Value, BkplugError>;
}
