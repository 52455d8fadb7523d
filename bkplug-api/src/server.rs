// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

//! Plugin host: gRPC services dispatching requests to registered plugins.

use std::sync::Arc;

use async_trait::async_trait;
use bkplug::{
    errors::BkplugError,
    registry::PluginRegistry,
    types::{RestoreItemActionExecuteInput, iops_from_wire, iops_to_wire},
};
use log::{debug, error};
use serde_json::Value;
use tokio::task::spawn_blocking;
use tonic::{Request, Response, Status};

use crate::v1::{
    CreateSnapshotRequest, CreateSnapshotResponse, CreateVolumeRequest, CreateVolumeResponse,
    DeleteSnapshotRequest, Empty, GetVolumeIdRequest, GetVolumeIdResponse, GetVolumeInfoRequest,
    GetVolumeInfoResponse, ListPluginsResponse, RestoreItemActionAppliesToRequest,
    RestoreItemActionAppliesToResponse, RestoreItemActionExecuteRequest,
    RestoreItemActionExecuteResponse, SetVolumeIdRequest, SetVolumeIdResponse,
    VolumeSnapshotterInitRequest, plugin_lister_server::PluginLister,
    restore_item_action_server::RestoreItemAction, volume_snapshotter_server::VolumeSnapshotter,
};

/// Maps a plugin failure to the status code reported to the orchestrator.
pub fn status_from_error(e: &BkplugError) -> Status {
    let message = e.to_string();
    match e {
        BkplugError::PluginNotFound { .. } | BkplugError::SnapshotNotFound(_) => {
            Status::not_found(message)
        }
        BkplugError::MissingPluginName
        | BkplugError::InvalidPluginName { .. }
        | BkplugError::InvalidDocument(_)
        | BkplugError::InvalidConfigKey { .. }
        | BkplugError::JsonError(_) => Status::invalid_argument(message),
        BkplugError::NotInitialized(_) => Status::failed_precondition(message),
        _ => Status::unknown(message),
    }
}

fn into_status<T>(method: &str, result: Result<T, BkplugError>) -> Result<Response<T>, Status> {
    result.map(Response::new).map_err(|e| {
        error!("Error in {method}: {e}");
        status_from_error(&e)
    })
}

fn require_plugin(plugin: &str) -> Result<(), BkplugError> {
    if plugin.is_empty() {
        return Err(BkplugError::MissingPluginName);
    }
    Ok(())
}

fn decode_document(bytes: &[u8], what: &str) -> Result<Value, BkplugError> {
    serde_json::from_slice(bytes).map_err(|e| BkplugError::InvalidDocument(format!("{what}: {e}")))
}

async fn run_blocking<T, F>(f: F) -> Result<T, BkplugError>
where
    F: FnOnce() -> Result<T, BkplugError> + Send + 'static,
    T: Send + 'static,
{
    match spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(BkplugError::InternalError(e.to_string())),
    }
}

pub struct RestoreItemActionService {
    registry: Arc<PluginRegistry>,
}

impl RestoreItemActionService {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    async fn do_applies_to(
        &self,
        request: RestoreItemActionAppliesToRequest,
    ) -> Result<RestoreItemActionAppliesToResponse, BkplugError> {
        require_plugin(&request.plugin)?;
        let action = self.registry.restore_item_action(&request.plugin)?;
        let selector = run_blocking(move || action.applies_to()).await?;
        Ok(RestoreItemActionAppliesToResponse {
            resource_selector: Some(selector.into()),
        })
    }

    async fn do_execute(
        &self,
        request: RestoreItemActionExecuteRequest,
    ) -> Result<RestoreItemActionExecuteResponse, BkplugError> {
        require_plugin(&request.plugin)?;
        let action = self.registry.restore_item_action(&request.plugin)?;
        let input = RestoreItemActionExecuteInput {
            item: decode_document(&request.item, "item")?,
            item_from_backup: decode_document(&request.item_from_backup, "item from backup")?,
            restore: decode_document(&request.restore, "restore")?,
        };

        let output = run_blocking(move || action.execute(input)).await?;
        let item = match output.updated_item {
            Some(updated) => serde_json::to_vec(&updated)?,
            None => {
                debug!("{} left the item unchanged", request.plugin);
                request.item
            }
        };
        Ok(RestoreItemActionExecuteResponse {
            item,
            additional_items: output
                .additional_items
                .into_iter()
                .map(Into::into)
                .collect(),
            skip_restore: output.skip_restore,
        })
    }
}

#[async_trait]
impl RestoreItemAction for RestoreItemActionService {
    async fn applies_to(
        &self,
        request: Request<RestoreItemActionAppliesToRequest>,
    ) -> Result<Response<RestoreItemActionAppliesToResponse>, Status> {
        into_status("applies_to", self.do_applies_to(request.into_inner()).await)
    }

    async fn execute(
        &self,
        request: Request<RestoreItemActionExecuteRequest>,
    ) -> Result<Response<RestoreItemActionExecuteResponse>, Status> {
        into_status("execute", self.do_execute(request.into_inner()).await)
    }
}

pub struct VolumeSnapshotterService {
    registry: Arc<PluginRegistry>,
}

impl VolumeSnapshotterService {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    async fn do_init(&self, request: VolumeSnapshotterInitRequest) -> Result<Empty, BkplugError> {
        require_plugin(&request.plugin)?;
        let snapshotter = self.registry.volume_snapshotter(&request.plugin)?;
        let config = request.config;
        run_blocking(move || snapshotter.init(config)).await?;
        Ok(Empty {})
    }

    async fn do_create_volume_from_snapshot(
        &self,
        request: CreateVolumeRequest,
    ) -> Result<CreateVolumeResponse, BkplugError> {
        require_plugin(&request.plugin)?;
        let snapshotter = self.registry.volume_snapshotter(&request.plugin)?;
        let volume_id = run_blocking(move || {
            snapshotter.create_volume_from_snapshot(
                &request.snapshot_id,
                &request.volume_type,
                &request.volume_az,
                iops_from_wire(request.iops),
            )
        })
        .await?;
        Ok(CreateVolumeResponse { volume_id })
    }

    async fn do_get_volume_info(
        &self,
        request: GetVolumeInfoRequest,
    ) -> Result<GetVolumeInfoResponse, BkplugError> {
        require_plugin(&request.plugin)?;
        let snapshotter = self.registry.volume_snapshotter(&request.plugin)?;
        let info = run_blocking(move || {
            snapshotter.get_volume_info(&request.volume_id, &request.volume_az)
        })
        .await?;
        Ok(GetVolumeInfoResponse {
            volume_type: info.volume_type,
            iops: iops_to_wire(info.iops),
        })
    }

    async fn do_create_snapshot(
        &self,
        request: CreateSnapshotRequest,
    ) -> Result<CreateSnapshotResponse, BkplugError> {
        require_plugin(&request.plugin)?;
        let snapshotter = self.registry.volume_snapshotter(&request.plugin)?;
        let snapshot_id = run_blocking(move || {
            snapshotter.create_snapshot(&request.volume_id, &request.volume_az, &request.tags)
        })
        .await?;
        Ok(CreateSnapshotResponse { snapshot_id })
    }

    async fn do_delete_snapshot(
        &self,
        request: DeleteSnapshotRequest,
    ) -> Result<Empty, BkplugError> {
        require_plugin(&request.plugin)?;
        let snapshotter = self.registry.volume_snapshotter(&request.plugin)?;
        run_blocking(move || snapshotter.delete_snapshot(&request.snapshot_id)).await?;
        Ok(Empty {})
    }

    async fn do_get_volume_id(
        &self,
        request: GetVolumeIdRequest,
    ) -> Result<GetVolumeIdResponse, BkplugError> {
        require_plugin(&request.plugin)?;
        let snapshotter = self.registry.volume_snapshotter(&request.plugin)?;
        let pv = decode_document(&request.persistent_volume, "persistent volume")?;
        let volume_id = run_blocking(move || snapshotter.get_volume_id(&pv)).await?;
        Ok(GetVolumeIdResponse { volume_id })
    }

    async fn do_set_volume_id(
        &self,
        request: SetVolumeIdRequest,
    ) -> Result<SetVolumeIdResponse, BkplugError> {
        require_plugin(&request.plugin)?;
        let snapshotter = self.registry.volume_snapshotter(&request.plugin)?;
        let pv = decode_document(&request.persistent_volume, "persistent volume")?;
        let volume_id = request.volume_id;
        let updated = run_blocking(move || snapshotter.set_volume_id(pv, &volume_id)).await?;
        Ok(SetVolumeIdResponse {
            persistent_volume: serde_json::to_vec(&updated)?,
        })
    }
}

#[async_trait]
impl VolumeSnapshotter for VolumeSnapshotterService {
    async fn init(
        &self,
        request: Request<VolumeSnapshotterInitRequest>,
    ) -> Result<Response<Empty>, Status> {
        into_status("init", self.do_init(request.into_inner()).await)
    }

    async fn create_volume_from_snapshot(
        &self,
        request: Request<CreateVolumeRequest>,
    ) -> Result<Response<CreateVolumeResponse>, Status> {
        into_status(
            "create_volume_from_snapshot",
            self.do_create_volume_from_snapshot(request.into_inner())
                .await,
        )
    }

    async fn get_volume_info(
        &self,
        request: Request<GetVolumeInfoRequest>,
    ) -> Result<Response<GetVolumeInfoResponse>, Status> {
        into_status(
            "get_volume_info",
            self.do_get_volume_info(request.into_inner()).await,
        )
    }

    async fn create_snapshot(
        &self,
        request: Request<CreateSnapshotRequest>,
    ) -> Result<Response<CreateSnapshotResponse>, Status> {
        into_status(
            "create_snapshot",
            self.do_create_snapshot(request.into_inner()).await,
        )
    }

    async fn delete_snapshot(
        &self,
        request: Request<DeleteSnapshotRequest>,
    ) -> Result<Response<Empty>, Status> {
        into_status(
            "delete_snapshot",
            self.do_delete_snapshot(request.into_inner()).await,
        )
    }

    async fn get_volume_id(
        &self,
        request: Request<GetVolumeIdRequest>,
    ) -> Result<Response<GetVolumeIdResponse>, Status> {
        into_status(
            "get_volume_id",
            self.do_get_volume_id(request.into_inner()).await,
        )
    }

    async fn set_volume_id(
        &self,
        request: Request<SetVolumeIdRequest>,
    ) -> Result<Response<SetVolumeIdResponse>, Status> {
        into_status(
            "set_volume_id",
            self.do_set_volume_id(request.into_inner()).await,
        )
    }
}

/// Lists the plugins this host serves.
pub struct PluginListerService {
    registry: Arc<PluginRegistry>,
    command: String,
}

impl PluginListerService {
    pub fn new(registry: Arc<PluginRegistry>, command: &str) -> Self {
        Self {
            registry,
            command: command.to_string(),
        }
    }
}

#[async_trait]
impl PluginLister for PluginListerService {
    async fn list_plugins(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<ListPluginsResponse>, Status> {
        let plugins = self
            .registry
            .list(&self.command)
            .into_iter()
            .map(Into::into)
            .collect();
        Ok(Response::new(ListPluginsResponse { plugins }))
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use bkplug::{
        builtin::{
            LOCAL_SNAPSHOTTER_PLUGIN, PV_FROM_PVC_PLUGIN, RESTORE_ANNOTATIONS_PLUGIN,
            register_builtin_plugins,
        },
        config::Config,
    };
    use serde_json::json;
    use tonic::Code;

    use super::*;

    fn registry() -> Arc<PluginRegistry> {
        let mut registry = PluginRegistry::new();
        register_builtin_plugins(&mut registry, &Config::default()).unwrap();
        Arc::new(registry)
    }

    fn execute_request(plugin: &str, item: &[u8]) -> RestoreItemActionExecuteRequest {
        RestoreItemActionExecuteRequest {
            plugin: plugin.to_string(),
            item: item.to_vec(),
            item_from_backup: item.to_vec(),
            restore: br#"{"metadata": {"name": "restore-1"}, "spec": {"backupName": "nightly"}}"#
                .to_vec(),
        }
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                BkplugError::PluginNotFound {
                    kind: bkplug::types::PluginKind::VolumeSnapshotter,
                    name: "a.io/b".to_string(),
                },
                Code::NotFound,
            ),
            (
                BkplugError::SnapshotNotFound("snap-1".to_string()),
                Code::NotFound,
            ),
            (BkplugError::MissingPluginName, Code::InvalidArgument),
            (
                BkplugError::InvalidDocument("item".to_string()),
                Code::InvalidArgument,
            ),
            (
                BkplugError::NotInitialized("a.io/b".to_string()),
                Code::FailedPrecondition,
            ),
            (
                BkplugError::InternalError("boom".to_string()),
                Code::Unknown,
            ),
        ];
        for (error, code) in cases {
            assert_eq!(status_from_error(&error).code(), code, "{error}");
        }
    }

    #[tokio::test]
    async fn test_execute_requires_plugin() {
        let service = RestoreItemActionService::new(registry());
        let res = service
            .execute(Request::new(execute_request("", b"{}")))
            .await;
        assert_eq!(res.unwrap_err().code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_execute_unknown_plugin() {
        let service = RestoreItemActionService::new(registry());
        let res = service
            .execute(Request::new(execute_request("example.com/missing", b"{}")))
            .await;
        assert_eq!(res.unwrap_err().code(), Code::NotFound);
    }

    #[tokio::test]
    async fn test_execute_invalid_json() {
        let service = RestoreItemActionService::new(registry());
        let request = Request::new(execute_request(PV_FROM_PVC_PLUGIN, b"not json"));
        let res = service.execute(request).await;
        assert_eq!(res.unwrap_err().code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_execute_unchanged_item_is_echoed() {
        let service = RestoreItemActionService::new(registry());
        let item = br#"{ "kind" : "PersistentVolumeClaim",  "spec": {"volumeName": "pv-7"} }"#;

        let response = service
            .execute(Request::new(execute_request(PV_FROM_PVC_PLUGIN, item)))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.item, item.to_vec());
        assert!(!response.skip_restore);
        assert_eq!(response.additional_items.len(), 1);
        assert_eq!(response.additional_items[0].resource, "persistentvolumes");
        assert_eq!(response.additional_items[0].name, "pv-7");
    }

    #[tokio::test]
    async fn test_execute_updated_item() {
        let service = RestoreItemActionService::new(registry());
        let item = br#"{"kind": "ConfigMap", "metadata": {"name": "settings"}}"#;

        let request = Request::new(execute_request(RESTORE_ANNOTATIONS_PLUGIN, item));
        let response = service.execute(request).await.unwrap().into_inner();
        let updated: Value = serde_json::from_slice(&response.item).unwrap();
        assert_eq!(
            updated["metadata"]["annotations"]["bkplug.io/restore-name"],
            json!("restore-1")
        );
        assert_eq!(
            updated["metadata"]["annotations"]["bkplug.io/backup-name"],
            json!("nightly")
        );
    }

    #[tokio::test]
    async fn test_applies_to() {
        let service = RestoreItemActionService::new(registry());
        let response = service
            .applies_to(Request::new(RestoreItemActionAppliesToRequest {
                plugin: PV_FROM_PVC_PLUGIN.to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(
            response.resource_selector.unwrap().included_resources,
            vec!["persistentvolumeclaims".to_string()]
        );
    }

    #[tokio::test]
    async fn test_snapshotter_requires_init() {
        let service = VolumeSnapshotterService::new(registry());
        let res = service
            .create_snapshot(Request::new(CreateSnapshotRequest {
                plugin: LOCAL_SNAPSHOTTER_PLUGIN.to_string(),
                volume_id: "vol-1".to_string(),
                ..Default::default()
            }))
            .await;
        assert_eq!(res.unwrap_err().code(), Code::FailedPrecondition);
    }

    #[tokio::test]
    async fn test_snapshotter_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let service = VolumeSnapshotterService::new(registry());
        let plugin = LOCAL_SNAPSHOTTER_PLUGIN.to_string();

        service
            .init(Request::new(VolumeSnapshotterInitRequest {
                plugin: plugin.clone(),
                config: HashMap::from([
                    (
                        "path".to_string(),
                        dir.path().join("catalogue").display().to_string(),
                    ),
                    ("volumeType".to_string(), "ssd".to_string()),
                ]),
            }))
            .await
            .unwrap();

        let snapshot_id = service
            .create_snapshot(Request::new(CreateSnapshotRequest {
                plugin: plugin.clone(),
                volume_id: "vol-source".to_string(),
                volume_az: "zone-a".to_string(),
                tags: HashMap::from([("backup".to_string(), "nightly".to_string())]),
            }))
            .await
            .unwrap()
            .into_inner()
            .snapshot_id;
        assert!(snapshot_id.starts_with("snap-"));

        let volume_id = service
            .create_volume_from_snapshot(Request::new(CreateVolumeRequest {
                plugin: plugin.clone(),
                snapshot_id: snapshot_id.clone(),
                volume_type: String::new(),
                volume_az: "zone-b".to_string(),
                iops: 3000,
            }))
            .await
            .unwrap()
            .into_inner()
            .volume_id;
        assert!(volume_id.starts_with("vol-"));

        let info = service
            .get_volume_info(Request::new(GetVolumeInfoRequest {
                plugin: plugin.clone(),
                volume_id: volume_id.clone(),
                volume_az: "zone-b".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(info.volume_type, "ssd");
        assert_eq!(info.iops, 3000);

        let unknown = service
            .get_volume_info(Request::new(GetVolumeInfoRequest {
                plugin: plugin.clone(),
                volume_id: "vol-unknown".to_string(),
                volume_az: String::new(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(unknown.iops, 0);

        let missing = service
            .create_volume_from_snapshot(Request::new(CreateVolumeRequest {
                plugin: plugin.clone(),
                snapshot_id: "snap-missing".to_string(),
                ..Default::default()
            }))
            .await;
        assert_eq!(missing.unwrap_err().code(), Code::NotFound);

        service
            .delete_snapshot(Request::new(DeleteSnapshotRequest {
                plugin: plugin.clone(),
                snapshot_id,
            }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_volume_id_round_trip_through_pv() {
        let dir = tempfile::tempdir().unwrap();
        let service = VolumeSnapshotterService::new(registry());
        let plugin = LOCAL_SNAPSHOTTER_PLUGIN.to_string();
        service
            .init(Request::new(VolumeSnapshotterInitRequest {
                plugin: plugin.clone(),
                config: HashMap::from([("path".to_string(), dir.path().display().to_string())]),
            }))
            .await
            .unwrap();

        let pv = serde_json::to_vec(&json!({
            "kind": "PersistentVolume",
            "metadata": {"name": "pv-1"},
            "spec": {"csi": {"driver": "local.csi", "volumeHandle": "vol-old"}}
        }))
        .unwrap();

        let updated = service
            .set_volume_id(Request::new(SetVolumeIdRequest {
                plugin: plugin.clone(),
                persistent_volume: pv,
                volume_id: "vol-new".to_string(),
            }))
            .await
            .unwrap()
            .into_inner()
            .persistent_volume;

        let volume_id = service
            .get_volume_id(Request::new(GetVolumeIdRequest {
                plugin: plugin.clone(),
                persistent_volume: updated,
            }))
            .await
            .unwrap()
            .into_inner()
            .volume_id;
        assert_eq!(volume_id, "vol-new");

        let res = service
            .get_volume_id(Request::new(GetVolumeIdRequest {
                plugin,
                persistent_volume: b"{".to_vec(),
            }))
            .await;
        assert_eq!(res.unwrap_err().code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_list_plugins() {
        let service = PluginListerService::new(registry(), "/usr/sbin/bkplug-rpc");
        let plugins = service
            .list_plugins(Request::new(Empty {}))
            .await
            .unwrap()
            .into_inner()
            .plugins;
        assert_eq!(plugins.len(), 4);
        assert!(plugins.iter().all(|p| p.command == "/usr/sbin/bkplug-rpc"));
        assert_eq!(plugins[3].kind, "VolumeSnapshotter");
        assert_eq!(plugins[3].name, LOCAL_SNAPSHOTTER_PLUGIN);
    }
}
