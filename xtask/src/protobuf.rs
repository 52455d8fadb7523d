use clap::Parser;

use crate::workspace::WORKSPACE_ROOT;

#[derive(Debug, Parser)]
pub struct Options {}

const PROTOS: &[&str] = &[
    "Shared.proto",
    "RestoreItemAction.proto",
    "VolumeSnapshotter.proto",
    "PluginLister.proto",
];

/// Regenerates `bkplug-api/src/generated.rs` from the files in `proto/`.
pub fn build(_opts: Options) -> anyhow::Result<()> {
    let out_dir = WORKSPACE_ROOT.join("bkplug-api/src");
    let proto_dir = WORKSPACE_ROOT.join("proto");

    let protos: Vec<_> = PROTOS.iter().map(|p| proto_dir.join(p)).collect();
    tonic_build::configure()
        .out_dir(out_dir)
        .compile(&protos, &[proto_dir])?;
    Ok(())
}
