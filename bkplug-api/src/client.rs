// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

//! Typed clients for plugins served by a bkplug host.
//!
//! Each client binds a channel to one plugin name, so callers work with the
//! domain types from [`bkplug::types`] rather than the wire messages.

use std::collections::HashMap;

use bkplug::{
    errors::ParseError,
    types::{
        PluginIdentifier, ResourceSelector, RestoreItemActionExecuteInput,
        RestoreItemActionExecuteOutput, VolumeInfo, iops_from_wire, iops_to_wire,
    },
};
use log::{debug, warn};
use serde_json::Value;
use thiserror::Error;
use tokio::net::UnixStream;
use tonic::{
    Request, Status,
    transport::{Channel, Endpoint, Uri},
};
use tower::service_fn;

use crate::{
    config::{self, Config},
    v1::{
        CreateSnapshotRequest, CreateVolumeRequest, DeleteSnapshotRequest, Empty,
        GetVolumeIdRequest, GetVolumeInfoRequest, RestoreItemActionAppliesToRequest,
        RestoreItemActionExecuteRequest, SetVolumeIdRequest, VolumeSnapshotterInitRequest,
        plugin_lister_client::PluginListerClient,
        restore_item_action_client::RestoreItemActionClient,
        volume_snapshotter_client::VolumeSnapshotterClient,
    },
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("plugin call failed: {0}")]
    Status(#[from] Status),
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("no enabled unix endpoint found in config")]
    NoEndpoint,
}

/// Returns a lazily connected channel to a host listening on `path`.
pub fn connect_unix(path: &str) -> Result<Channel, ClientError> {
    let address = Endpoint::try_from(format!("unix:/{path}"))?;
    let path = path.to_string();
    let connector = service_fn(move |_: Uri| UnixStream::connect(path.clone()));
    Ok(address.connect_with_connector_lazy(connector))
}

/// Picks the first enabled unix endpoint that yields a channel. Endpoints
/// whose address does not parse are disabled in `config`.
pub fn select_channel(config: &mut Config) -> Result<Channel, ClientError> {
    for endpoint in config.grpc.endpoints.iter_mut() {
        match endpoint {
            config::Endpoint::Unix { path, enabled } => {
                if !*enabled {
                    continue;
                }
                match connect_unix(path) {
                    Ok(channel) => {
                        debug!("Using unix endpoint {path}");
                        return Ok(channel);
                    }
                    Err(e) => {
                        warn!("Failed to parse unix endpoint {path}: {e}");
                        *enabled = false;
                    }
                }
            }
        }
    }
    warn!("No enabled unix endpoints found in config");
    Err(ClientError::NoEndpoint)
}

/// Lists every plugin served by the host behind `channel`.
pub async fn list_plugins(channel: Channel) -> Result<Vec<PluginIdentifier>, ClientError> {
    let mut client = PluginListerClient::new(channel);
    let response = client
        .list_plugins(Request::new(Empty {}))
        .await?
        .into_inner();
    response
        .plugins
        .into_iter()
        .map(|p| PluginIdentifier::try_from(p).map_err(ClientError::from))
        .collect()
}

pub struct RestoreItemActionPlugin {
    client: RestoreItemActionClient<Channel>,
    plugin: String,
}

impl RestoreItemActionPlugin {
    pub fn new(channel: Channel, plugin: &str) -> Self {
        Self {
            client: RestoreItemActionClient::new(channel),
            plugin: plugin.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.plugin
    }

    pub async fn applies_to(&mut self) -> Result<ResourceSelector, ClientError> {
        let response = self
            .client
            .applies_to(Request::new(RestoreItemActionAppliesToRequest {
                plugin: self.plugin.clone(),
            }))
            .await?
            .into_inner();
        Ok(response.resource_selector.unwrap_or_default().into())
    }

    /// Runs the action on one item. The wire reply always carries an item,
    /// so `updated_item` is `None` when the returned item equals the input.
    pub async fn execute(
        &mut self,
        input: &RestoreItemActionExecuteInput,
    ) -> Result<RestoreItemActionExecuteOutput, ClientError> {
        let response = self
            .client
            .execute(Request::new(RestoreItemActionExecuteRequest {
                plugin: self.plugin.clone(),
                item: serde_json::to_vec(&input.item)?,
                restore: serde_json::to_vec(&input.restore)?,
                item_from_backup: serde_json::to_vec(&input.item_from_backup)?,
            }))
            .await?
            .into_inner();

        let item: Value = serde_json::from_slice(&response.item)?;
        Ok(RestoreItemActionExecuteOutput {
            updated_item: (item != input.item).then_some(item),
            additional_items: response
                .additional_items
                .into_iter()
                .map(Into::into)
                .collect(),
            skip_restore: response.skip_restore,
        })
    }
}

pub struct VolumeSnapshotterPlugin {
    client: VolumeSnapshotterClient<Channel>,
    plugin: String,
}

impl VolumeSnapshotterPlugin {
    pub fn new(channel: Channel, plugin: &str) -> Self {
        Self {
            client: VolumeSnapshotterClient::new(channel),
            plugin: plugin.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.plugin
    }

    pub async fn init(&mut self, config: HashMap<String, String>) -> Result<(), ClientError> {
        self.client
            .init(Request::new(VolumeSnapshotterInitRequest {
                plugin: self.plugin.clone(),
                config,
            }))
            .await?;
        Ok(())
    }

    pub async fn create_volume_from_snapshot(
        &mut self,
        snapshot_id: &str,
        volume_type: &str,
        volume_az: &str,
        iops: Option<i64>,
    ) -> Result<String, ClientError> {
        let response = self
            .client
            .create_volume_from_snapshot(Request::new(CreateVolumeRequest {
                plugin: self.plugin.clone(),
                snapshot_id: snapshot_id.to_string(),
                volume_type: volume_type.to_string(),
                volume_az: volume_az.to_string(),
                iops: iops_to_wire(iops),
            }))
            .await?
            .into_inner();
        Ok(response.volume_id)
    }

    pub async fn get_volume_info(
        &mut self,
        volume_id: &str,
        volume_az: &str,
    ) -> Result<VolumeInfo, ClientError> {
        let response = self
            .client
            .get_volume_info(Request::new(GetVolumeInfoRequest {
                plugin: self.plugin.clone(),
                volume_id: volume_id.to_string(),
                volume_az: volume_az.to_string(),
            }))
            .await?
            .into_inner();
        Ok(VolumeInfo {
            volume_type: response.volume_type,
            iops: iops_from_wire(response.iops),
        })
    }

    pub async fn create_snapshot(
        &mut self,
        volume_id: &str,
        volume_az: &str,
        tags: HashMap<String, String>,
    ) -> Result<String, ClientError> {
        let response = self
            .client
            .create_snapshot(Request::new(CreateSnapshotRequest {
                plugin: self.plugin.clone(),
                volume_id: volume_id.to_string(),
                volume_az: volume_az.to_string(),
                tags,
            }))
            .await?
            .into_inner();
        Ok(response.snapshot_id)
    }

    pub async fn delete_snapshot(&mut self, snapshot_id: &str) -> Result<(), ClientError> {
        self.client
            .delete_snapshot(Request::new(DeleteSnapshotRequest {
                plugin: self.plugin.clone(),
                snapshot_id: snapshot_id.to_string(),
            }))
            .await?;
        Ok(())
    }

    pub async fn get_volume_id(
        &mut self,
        persistent_volume: &Value,
    ) -> Result<String, ClientError> {
        let response = self
            .client
            .get_volume_id(Request::new(GetVolumeIdRequest {
                plugin: self.plugin.clone(),
                persistent_volume: serde_json::to_vec(persistent_volume)?,
            }))
            .await?
            .into_inner();
        Ok(response.volume_id)
    }

    pub async fn set_volume_id(
        &mut self,
        persistent_volume: &Value,
        volume_id: &str,
    ) -> Result<Value, ClientError> {
        let response = self
            .client
            .set_volume_id(Request::new(SetVolumeIdRequest {
                plugin: self.plugin.clone(),
                persistent_volume: serde_json::to_vec(persistent_volume)?,
                volume_id: volume_id.to_string(),
            }))
            .await?
            .into_inner();
        Ok(serde_json::from_slice(&response.persistent_volume)?)
    }
}

#[cfg(test)]
mod test {
    use std::{path::Path, sync::Arc};

    use assert_matches::assert_matches;
    use bkplug::{
        builtin::{
            CHANGE_STORAGE_CLASS_PLUGIN, LOCAL_SNAPSHOTTER_PLUGIN, PV_FROM_PVC_PLUGIN,
            RESTORE_ANNOTATIONS_PLUGIN,
        },
        config::Config as PluginConfig,
        setup_registry,
        types::{PluginKind, ResourceIdentifier},
    };
    use serde_json::json;
    use tokio::{net::UnixListener, task::JoinHandle};
    use tokio_stream::wrappers::UnixListenerStream;
    use tonic::{Code, transport::Server};

    use super::*;
    use crate::{
        server::{PluginListerService, RestoreItemActionService, VolumeSnapshotterService},
        v1::{
            plugin_lister_server::PluginListerServer,
            restore_item_action_server::RestoreItemActionServer,
            volume_snapshotter_server::VolumeSnapshotterServer,
        },
    };

    const PLUGIN_CONFIG: &str = r#"
        [storage_class_mapping]
        gp2 = "standard"
    "#;

    fn start_host(socket: &Path) -> JoinHandle<()> {
        let plugin_config: PluginConfig = PLUGIN_CONFIG.parse().unwrap();
        let registry = Arc::new(setup_registry(&plugin_config).unwrap());
        let incoming = UnixListenerStream::new(UnixListener::bind(socket).unwrap());

        let router = Server::builder()
            .add_service(RestoreItemActionServer::new(RestoreItemActionService::new(
                registry.clone(),
            )))
            .add_service(VolumeSnapshotterServer::new(VolumeSnapshotterService::new(
                registry.clone(),
            )))
            .add_service(PluginListerServer::new(PluginListerService::new(
                registry,
                "bkplug-rpc",
            )));
        tokio::spawn(async move {
            router.serve_with_incoming(incoming).await.unwrap();
        })
    }

    fn socket_path(dir: &tempfile::TempDir) -> String {
        dir.path().join("bkplug.sock").display().to_string()
    }

    #[tokio::test]
    async fn test_list_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let socket = socket_path(&dir);
        let host = start_host(Path::new(&socket));

        let plugins = list_plugins(connect_unix(&socket).unwrap()).await.unwrap();
        let names: Vec<_> = plugins.iter().map(|p| (p.kind, p.name.as_str())).collect();
        assert_eq!(
            names,
            vec![
                (PluginKind::RestoreItemAction, CHANGE_STORAGE_CLASS_PLUGIN),
                (PluginKind::RestoreItemAction, PV_FROM_PVC_PLUGIN),
                (PluginKind::RestoreItemAction, RESTORE_ANNOTATIONS_PLUGIN),
                (PluginKind::VolumeSnapshotter, LOCAL_SNAPSHOTTER_PLUGIN),
            ]
        );
        host.abort();
    }

    #[tokio::test]
    async fn test_restore_item_actions() {
        let dir = tempfile::tempdir().unwrap();
        let socket = socket_path(&dir);
        let host = start_host(Path::new(&socket));
        let channel = connect_unix(&socket).unwrap();

        let mut storage_class =
            RestoreItemActionPlugin::new(channel.clone(), CHANGE_STORAGE_CLASS_PLUGIN);
        let selector = storage_class.applies_to().await.unwrap();
        assert_eq!(
            selector.included_resources,
            vec!["persistentvolumeclaims", "persistentvolumes"]
        );

        let claim = json!({
            "kind": "PersistentVolumeClaim",
            "metadata": {"name": "data", "namespace": "db"},
            "spec": {"storageClassName": "gp2", "volumeName": "pv-1"}
        });
        let input = RestoreItemActionExecuteInput {
            item: claim.clone(),
            item_from_backup: claim.clone(),
            restore: json!({"metadata": {"name": "restore-1"}}),
        };
        let output = storage_class.execute(&input).await.unwrap();
        assert_eq!(
            output.updated_item.unwrap()["spec"]["storageClassName"],
            json!("standard")
        );

        let mut pv_from_pvc = RestoreItemActionPlugin::new(channel, PV_FROM_PVC_PLUGIN);
        let output = pv_from_pvc.execute(&input).await.unwrap();
        assert_eq!(output.updated_item, None);
        assert_eq!(
            output.additional_items,
            vec![ResourceIdentifier::new("", "persistentvolumes", "", "pv-1")]
        );
        host.abort();
    }

    #[tokio::test]
    async fn test_unknown_and_missing_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let socket = socket_path(&dir);
        let host = start_host(Path::new(&socket));
        let channel = connect_unix(&socket).unwrap();

        let mut unknown = RestoreItemActionPlugin::new(channel.clone(), "example.com/missing");
        assert_matches!(
            unknown.applies_to().await,
            Err(ClientError::Status(s)) if s.code() == Code::NotFound
        );

        let mut unnamed = VolumeSnapshotterPlugin::new(channel, "");
        assert_matches!(
            unnamed.delete_snapshot("snap-1").await,
            Err(ClientError::Status(s)) if s.code() == Code::InvalidArgument
        );
        host.abort();
    }

    #[tokio::test]
    async fn test_volume_snapshotter() {
        let dir = tempfile::tempdir().unwrap();
        let socket = socket_path(&dir);
        let host = start_host(Path::new(&socket));
        let mut snapshotter =
            VolumeSnapshotterPlugin::new(connect_unix(&socket).unwrap(), LOCAL_SNAPSHOTTER_PLUGIN);

        assert_matches!(
            snapshotter.get_volume_info("vol-1", "").await,
            Err(ClientError::Status(s)) if s.code() == Code::FailedPrecondition
        );

        snapshotter
            .init(HashMap::from([(
                "path".to_string(),
                dir.path().join("catalogue").display().to_string(),
            )]))
            .await
            .unwrap();

        let snapshot_id = snapshotter
            .create_snapshot("vol-1", "zone-a", HashMap::new())
            .await
            .unwrap();
        let volume_id = snapshotter
            .create_volume_from_snapshot(&snapshot_id, "fast", "zone-a", None)
            .await
            .unwrap();
        assert_eq!(
            snapshotter
                .get_volume_info(&volume_id, "zone-a")
                .await
                .unwrap(),
            VolumeInfo {
                volume_type: "fast".to_string(),
                iops: None,
            }
        );

        let pv = json!({"spec": {"csi": {"volumeHandle": "vol-1"}}});
        assert_eq!(snapshotter.get_volume_id(&pv).await.unwrap(), "vol-1");
        let pv = snapshotter.set_volume_id(&pv, &volume_id).await.unwrap();
        assert_eq!(pv["spec"]["csi"]["volumeHandle"], json!(volume_id));

        snapshotter.delete_snapshot(&snapshot_id).await.unwrap();
        assert_matches!(
            snapshotter
                .create_volume_from_snapshot(&snapshot_id, "", "zone-a", None)
                .await,
            Err(ClientError::Status(s)) if s.code() == Code::NotFound
        );
        host.abort();
    }

    #[test]
    fn test_select_channel_skips_disabled() {
        let mut config: Config = r#"
            [[grpc.endpoints]]
            type = "unix"
            enabled = false
            path = "/run/bkplug/off.sock"
        "#
        .parse()
        .unwrap();
        assert_matches!(select_channel(&mut config), Err(ClientError::NoEndpoint));
    }
}
