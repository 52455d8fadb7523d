// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use std::collections::HashMap;

use bkplug_api::client::VolumeSnapshotterPlugin;
use log::debug;
use tonic::transport::Channel;

use crate::{args::SnapshotterSubcommand, read_document, table::OutputTable};

fn to_map(pairs: &Option<Vec<(String, String)>>) -> HashMap<String, String> {
    pairs.clone().unwrap_or_default().into_iter().collect()
}

impl SnapshotterSubcommand {
    pub(crate) async fn execute(&self, channel: Channel) -> anyhow::Result<()> {
        match self {
            SnapshotterSubcommand::Init(args) => {
                let mut snapshotter = VolumeSnapshotterPlugin::new(channel, &args.plugin.plugin);
                snapshotter.init(to_map(&args.config)).await?;
                debug!("Initialized {}", snapshotter.name());
            }
            SnapshotterSubcommand::CreateSnapshot(args) => {
                let mut snapshotter = VolumeSnapshotterPlugin::new(channel, &args.plugin.plugin);
                let snapshot_id = snapshotter
                    .create_snapshot(&args.volume_id, &args.volume_az, to_map(&args.tags))
                    .await?;
                println!("{snapshot_id}");
            }
            SnapshotterSubcommand::DeleteSnapshot(args) => {
                let mut snapshotter = VolumeSnapshotterPlugin::new(channel, &args.plugin.plugin);
                snapshotter.delete_snapshot(&args.snapshot_id).await?;
            }
            SnapshotterSubcommand::CreateVolume(args) => {
                let mut snapshotter = VolumeSnapshotterPlugin::new(channel, &args.plugin.plugin);
                let volume_id = snapshotter
                    .create_volume_from_snapshot(
                        &args.snapshot_id,
                        &args.volume_type,
                        &args.volume_az,
                        args.iops,
                    )
                    .await?;
                println!("{volume_id}");
            }
            SnapshotterSubcommand::VolumeInfo(args) => {
                let mut snapshotter = VolumeSnapshotterPlugin::new(channel, &args.plugin.plugin);
                let info = snapshotter
                    .get_volume_info(&args.volume_id, &args.volume_az)
                    .await?;
                OutputTable::new_volume_info(&args.volume_id, &info).print();
            }
            SnapshotterSubcommand::GetVolumeId(args) => {
                let mut snapshotter = VolumeSnapshotterPlugin::new(channel, &args.plugin.plugin);
                let pv = read_document(&args.persistent_volume)?;
                let volume_id = snapshotter.get_volume_id(&pv).await?;
                if volume_id.is_empty() {
                    eprintln!("{} does not handle this volume", snapshotter.name());
                } else {
                    println!("{volume_id}");
                }
            }
            SnapshotterSubcommand::SetVolumeId(args) => {
                let mut snapshotter = VolumeSnapshotterPlugin::new(channel, &args.plugin.plugin);
                let pv = read_document(&args.persistent_volume)?;
                let updated = snapshotter.set_volume_id(&pv, &args.volume_id).await?;
                println!("{}", serde_json::to_string_pretty(&updated)?);
            }
        }
        Ok(())
    }
}
