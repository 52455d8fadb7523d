// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use std::{
    fs::create_dir_all,
    path::{Path, PathBuf},
};

use clap::{CommandFactory, Parser};
use clap_complete::{Generator, Shell};

use crate::args::Cli;

#[derive(Debug, Parser)]
pub struct Args {
    /// Output directory
    out_dir: PathBuf,
    /// Optional: shell to generate completions for
    #[clap(long, short)]
    shell: Option<Shell>,
}

fn write_completions_file<G: Generator>(generator: G, out_dir: &Path) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    let path = clap_complete::generate_to(generator, &mut cmd, "bkplug", out_dir)?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

pub fn generate(args: &Args) -> anyhow::Result<()> {
    let Args { out_dir, shell } = args;
    create_dir_all(out_dir)?;

    let shells = match shell {
        Some(shell) => vec![*shell],
        None => vec![
            Shell::Bash,
            Shell::Elvish,
            Shell::Fish,
            Shell::PowerShell,
            Shell::Zsh,
        ],
    };
    for shell in shells {
        write_completions_file(shell, out_dir)?;
    }
    eprintln!("completion scripts generated in {out_dir:?}");
    Ok(())
}
