// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{completions, manpage};

#[derive(Parser, Debug)]
#[command(
    long_about = "A client for bkplug plugin hosts: list plugins, run restore item actions and drive volume snapshotters."
)]
#[command(name = "bkplug", version, long_version = env!("BKPLUG_BUILD_INFO"))]
pub(crate) struct Cli {
    /// Optional: Unix socket of the plugin host.
    /// Defaults to the first enabled endpoint in /etc/bkplug/bkplug.toml.
    #[clap(long, global = true, verbatim_doc_comment)]
    pub(crate) socket_path: Option<String>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// List the plugins served by the host.
    List,
    /// Call a RestoreItemAction plugin.
    #[command(subcommand)]
    RestoreAction(RestoreActionSubcommand),
    /// Call a VolumeSnapshotter plugin.
    #[command(subcommand)]
    Snapshotter(SnapshotterSubcommand),
    /// Generate shell completion scripts.
    Completions(completions::Args),
    /// Generate man pages.
    Manpage(manpage::Args),
}

#[derive(Args, Debug)]
pub(crate) struct PluginArgs {
    /// Required: Plugin name.
    /// Example: --plugin bkplug.io/restore-annotations
    #[clap(short, long, verbatim_doc_comment)]
    pub(crate) plugin: String,
}

#[derive(Subcommand, Debug)]
pub(crate) enum RestoreActionSubcommand {
    /// Show which resources the action applies to.
    AppliesTo(PluginArgs),
    /// Run the action against an item read from a JSON file.
    Execute(ExecuteArgs),
}

#[derive(Args, Debug)]
pub(crate) struct ExecuteArgs {
    #[command(flatten)]
    pub(crate) plugin: PluginArgs,

    /// Required: JSON file holding the item about to be restored.
    #[clap(short, long)]
    pub(crate) item: PathBuf,

    /// Optional: JSON file holding the item as stored in the backup.
    /// Defaults to the item itself.
    #[clap(long, verbatim_doc_comment)]
    pub(crate) item_from_backup: Option<PathBuf>,

    /// Optional: JSON file holding the restore object.
    #[clap(short, long)]
    pub(crate) restore: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum SnapshotterSubcommand {
    /// Configure the snapshotter. Must be called before any other operation.
    Init(InitArgs),
    /// Snapshot a volume.
    CreateSnapshot(CreateSnapshotArgs),
    /// Delete a snapshot.
    DeleteSnapshot(DeleteSnapshotArgs),
    /// Create a volume from a snapshot.
    CreateVolume(CreateVolumeArgs),
    /// Show the type and IOPS of a volume.
    VolumeInfo(VolumeInfoArgs),
    /// Print the volume ID referenced by a persistent volume.
    GetVolumeId(GetVolumeIdArgs),
    /// Point a persistent volume at another volume ID.
    SetVolumeId(SetVolumeIdArgs),
}

#[derive(Args, Debug)]
pub(crate) struct InitArgs {
    #[command(flatten)]
    pub(crate) plugin: PluginArgs,

    /// Optional: Snapshot location configuration.
    /// Format: <KEY>=<VALUE>
    /// Example: --config path=/var/lib/bkplug/snapshots,volumeType=ssd
    #[clap(short, long, verbatim_doc_comment, value_parser=parse_key_val, value_delimiter = ',')]
    pub(crate) config: Option<Vec<(String, String)>>,
}

#[derive(Args, Debug)]
pub(crate) struct CreateSnapshotArgs {
    #[command(flatten)]
    pub(crate) plugin: PluginArgs,

    /// Required: ID of the volume to snapshot.
    #[clap(long)]
    pub(crate) volume_id: String,

    /// Optional: Availability zone of the volume.
    #[clap(long, default_value = "")]
    pub(crate) volume_az: String,

    /// Optional: Tags to attach to the snapshot.
    /// Format: <KEY>=<VALUE>
    #[clap(short, long, verbatim_doc_comment, value_parser=parse_key_val, value_delimiter = ',')]
    pub(crate) tags: Option<Vec<(String, String)>>,
}

#[derive(Args, Debug)]
pub(crate) struct DeleteSnapshotArgs {
    #[command(flatten)]
    pub(crate) plugin: PluginArgs,

    /// Required: ID of the snapshot to delete.
    #[clap(long)]
    pub(crate) snapshot_id: String,
}

#[derive(Args, Debug)]
pub(crate) struct CreateVolumeArgs {
    #[command(flatten)]
    pub(crate) plugin: PluginArgs,

    /// Required: ID of the snapshot to restore from.
    #[clap(long)]
    pub(crate) snapshot_id: String,

    /// Optional: Volume type. Defaults to the type of the snapshotted volume.
    #[clap(long, default_value = "")]
    pub(crate) volume_type: String,

    /// Optional: Availability zone for the new volume.
    #[clap(long, default_value = "")]
    pub(crate) volume_az: String,

    /// Optional: Provisioned IOPS for the new volume.
    #[clap(long)]
    pub(crate) iops: Option<i64>,
}

#[derive(Args, Debug)]
pub(crate) struct VolumeInfoArgs {
    #[command(flatten)]
    pub(crate) plugin: PluginArgs,

    /// Required: ID of the volume.
    #[clap(long)]
    pub(crate) volume_id: String,

    /// Optional: Availability zone of the volume.
    #[clap(long, default_value = "")]
    pub(crate) volume_az: String,
}

#[derive(Args, Debug)]
pub(crate) struct GetVolumeIdArgs {
    #[command(flatten)]
    pub(crate) plugin: PluginArgs,

    /// Required: JSON file holding the persistent volume.
    #[clap(long)]
    pub(crate) persistent_volume: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct SetVolumeIdArgs {
    #[command(flatten)]
    pub(crate) plugin: PluginArgs,

    /// Required: JSON file holding the persistent volume.
    #[clap(long)]
    pub(crate) persistent_volume: PathBuf,

    /// Required: Volume ID to write into the persistent volume.
    #[clap(long)]
    pub(crate) volume_id: String,
}

/// Parse a single key-value pair
pub(crate) fn parse_key_val(s: &str) -> Result<(String, String), std::io::Error> {
    let pos = s.find('=').ok_or(std::io::ErrorKind::InvalidInput)?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("volumeType=ssd=fast").unwrap(),
            ("volumeType".to_string(), "ssd=fast".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
    }

    #[test]
    fn test_snapshotter_init_config_list() {
        let cli = Cli::parse_from([
            "bkplug",
            "snapshotter",
            "init",
            "--plugin",
            "bkplug.io/local",
            "--config",
            "path=/tmp/catalogue,volumeType=ssd",
        ]);
        match cli.command {
            Commands::Snapshotter(SnapshotterSubcommand::Init(args)) => {
                assert_eq!(args.plugin.plugin, "bkplug.io/local");
                assert_eq!(
                    args.config.unwrap(),
                    vec![
                        ("path".to_string(), "/tmp/catalogue".to_string()),
                        ("volumeType".to_string(), "ssd".to_string()),
                    ]
                );
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
