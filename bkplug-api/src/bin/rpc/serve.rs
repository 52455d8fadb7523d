// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use std::{
    fs::remove_file,
    os::unix::prelude::{FromRawFd, IntoRawFd},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, anyhow, bail};
use bkplug::{
    registry::PluginRegistry,
    utils::{SOCK_MODE, set_file_permissions},
};
use bkplug_api::{
    server::{PluginListerService, RestoreItemActionService, VolumeSnapshotterService},
    v1::{
        plugin_lister_server::PluginListerServer,
        restore_item_action_server::RestoreItemActionServer,
        volume_snapshotter_server::VolumeSnapshotterServer,
    },
};
use libsystemd::activation::IsType;
use log::{debug, error, info, warn};
use tokio::{
    join,
    net::UnixListener,
    signal::unix::{SignalKind, signal},
    sync::broadcast,
    task::{JoinHandle, JoinSet},
};
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;

#[derive(Clone)]
struct Services {
    restore_item_action: RestoreItemActionServer<RestoreItemActionService>,
    volume_snapshotter: VolumeSnapshotterServer<VolumeSnapshotterService>,
    plugin_lister: PluginListerServer<PluginListerService>,
}

impl Services {
    fn new(registry: Arc<PluginRegistry>, command: &str) -> Self {
        Self {
            restore_item_action: RestoreItemActionServer::new(RestoreItemActionService::new(
                registry.clone(),
            )),
            volume_snapshotter: VolumeSnapshotterServer::new(VolumeSnapshotterService::new(
                registry.clone(),
            )),
            plugin_lister: PluginListerServer::new(PluginListerService::new(registry, command)),
        }
    }
}

pub async fn serve(
    registry: Arc<PluginRegistry>,
    command: &str,
    sockets: &[PathBuf],
    timeout: u64,
) -> anyhow::Result<()> {
    let (shutdown_tx, _) = broadcast::channel(32);
    let services = Services::new(registry, command);

    let mut listeners: Vec<_> = Vec::new();
    if let Ok(stream) = systemd_unix_stream() {
        listeners.push(serve_unix(
            stream,
            "systemd socket".to_string(),
            services.clone(),
            shutdown_tx.subscribe(),
        ));
    } else {
        for path in sockets {
            match std_unix_stream(path).await {
                Ok(stream) => listeners.push(serve_unix(
                    stream,
                    path.display().to_string(),
                    services.clone(),
                    shutdown_tx.subscribe(),
                )),
                Err(e) => error!("Unable to listen on {}: {e:?}", path.display()),
            }
        }
    }
    if listeners.is_empty() {
        bail!("no unix endpoint to listen on");
    }

    let shutdown_handle = tokio::spawn(shutdown_handler(timeout, shutdown_tx));
    let (_, res) = join!(join_listeners(listeners), shutdown_handle);
    res??;
    Ok(())
}

pub(crate) async fn shutdown_handler(
    timeout: u64,
    shutdown_tx: broadcast::Sender<()>,
) -> anyhow::Result<()> {
    let mut joinset = JoinSet::new();
    if timeout > 0 {
        info!("Shutting down after {} seconds", timeout);
        joinset.spawn(tokio::time::sleep(Duration::from_secs(timeout)));
    } else {
        info!("Using no shutdown timer");
    }

    let mut sigint = signal(SignalKind::interrupt()).context("unable to handle SIGINT")?;
    joinset.spawn(async move {
        sigint.recv().await;
        debug!("Received SIGINT");
    });

    let mut sigterm = signal(SignalKind::terminate()).context("unable to handle SIGTERM")?;
    joinset.spawn(async move {
        sigterm.recv().await;
        debug!("Received SIGTERM");
    });

    joinset.join_next().await;
    if shutdown_tx.send(()).is_err() {
        warn!("No listeners left to shut down");
    }
    Ok(())
}

async fn join_listeners(listeners: Vec<JoinHandle<()>>) {
    for listener in listeners {
        if let Err(e) = listener.await {
            error!("Listener task failed: {e:?}");
        }
    }
}

fn serve_unix(
    stream: UnixListenerStream,
    name: String,
    services: Services,
    mut shutdown_channel: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let serve = Server::builder()
        .add_service(services.restore_item_action)
        .add_service(services.volume_snapshotter)
        .add_service(services.plugin_lister)
        .serve_with_incoming_shutdown(stream, async move {
            match shutdown_channel.recv().await {
                Ok(()) => debug!("Unix Socket: Received shutdown signal"),
                Err(e) => error!("Error receiving shutdown signal {:?}", e),
            };
        });

    tokio::spawn(async move {
        info!("Listening on {name}");
        if let Err(e) = serve.await {
            error!("Error serving {name}: {e:?}");
        }
        info!("Shutdown Unix Handler {name}");
    })
}

fn systemd_unix_stream() -> anyhow::Result<UnixListenerStream> {
    let listen_fds = libsystemd::activation::receive_descriptors(true)?;
    if listen_fds.len() == 1 {
        if let Some(fd) = listen_fds.first() {
            if !fd.is_unix() {
                return Err(anyhow!("Wrong Socket"));
            }
            // SAFETY: systemd hands over ownership of the descriptor.
            let std_listener =
                unsafe { std::os::unix::net::UnixListener::from_raw_fd(fd.clone().into_raw_fd()) };
            std_listener.set_nonblocking(true)?;
            let tokio_listener = UnixListener::from_std(std_listener)?;
            info!("Using a Unix socket from systemd");
            return Ok(UnixListenerStream::new(tokio_listener));
        }
    }

    Err(anyhow!("Unable to retrieve fd from systemd"))
}

async fn std_unix_stream(path: &Path) -> anyhow::Result<UnixListenerStream> {
    if path.exists() {
        // bind fails if the socket is left over from a previous run
        remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let uds = UnixListener::bind(path)?;
    let stream = UnixListenerStream::new(uds);
    set_file_permissions(path, SOCK_MODE);

    info!("Using Unix socket {}", path.display());
    Ok(stream)
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_after_timeout() {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        shutdown_handler(1, shutdown_tx).await.unwrap();
        assert!(shutdown_rx.try_recv().is_ok());
    }
}
