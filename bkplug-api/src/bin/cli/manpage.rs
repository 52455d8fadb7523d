// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use std::{
    fs::{File, create_dir_all},
    io::Write as _,
    path::{Path, PathBuf},
};

use clap::{CommandFactory, Parser};
use flate2::{Compression, write::GzEncoder};

use crate::args::Cli;

#[derive(Debug, Parser)]
pub struct Args {
    /// Output directory
    out_dir: PathBuf,
}

fn build_manpage(cmd: clap::Command, name: &str, out_dir: &Path) -> anyhow::Result<()> {
    let man = clap_mangen::Man::new(cmd);
    let mut buffer: Vec<u8> = Default::default();
    man.render(&mut buffer)?;
    let file_path = out_dir.join(format!("{name}.1.gz"));
    let f = File::create(&file_path)?;
    let mut e = GzEncoder::new(f, Compression::default());
    e.write_all(&buffer)?;
    e.finish()?;
    log::debug!("man page generated in {file_path:?}");
    Ok(())
}

/// Writes one gzipped page for `bkplug` and one per visible subcommand,
/// named `bkplug-<subcommand>[-<subcommand>].1.gz`.
pub fn generate(args: &Args) -> anyhow::Result<()> {
    let Args { out_dir } = args;
    create_dir_all(out_dir)?;

    let cmd = Cli::command();
    let name = cmd.get_name().to_owned();
    let mut commands = vec![(cmd, name)];

    while let Some((cmd, name)) = commands.pop() {
        for subcommand in cmd.get_subcommands() {
            if subcommand.is_hide_set() || subcommand.get_name() == "help" {
                continue;
            }
            let subcommand_name = format!("{}-{}", name, subcommand.get_name());
            commands.push((subcommand.clone(), subcommand_name));
        }
        build_manpage(cmd, &name, out_dir)?;
    }
    eprintln!("man pages generated in {out_dir:?}");
    Ok(())
}
