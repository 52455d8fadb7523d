// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use std::{fs, path::Path};

use anyhow::Context;
use args::{Cli, Commands};
use bkplug_api::{
    client::{connect_unix, select_channel},
    config::Config,
};
use clap::Parser;
use list::execute_list;
use serde_json::Value;
use tonic::transport::Channel;

mod args;
mod completions;
mod list;
mod manpage;
mod restore_action;
mod snapshotter;
mod table;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    cli.execute().await
}

impl Cli {
    pub(crate) async fn execute(&self) -> anyhow::Result<()> {
        match &self.command {
            Commands::Completions(args) => completions::generate(args),
            Commands::Manpage(args) => manpage::generate(args),
            Commands::List => execute_list(self.channel()?).await,
            Commands::RestoreAction(r) => r.execute(self.channel()?).await,
            Commands::Snapshotter(s) => s.execute(self.channel()?).await,
        }
    }

    fn channel(&self) -> anyhow::Result<Channel> {
        let channel = match &self.socket_path {
            Some(path) => connect_unix(path)?,
            None => select_channel(&mut Config::load())?,
        };
        Ok(channel)
    }
}

pub(crate) fn read_document(path: &Path) -> anyhow::Result<Value> {
    let content = fs::read(path).with_context(|| format!("unable to read {}", path.display()))?;
    serde_json::from_slice(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))
}

#[cfg(test)]
mod test {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn test_read_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"kind": "PersistentVolume"}}"#).unwrap();
        let document = read_document(file.path()).unwrap();
        assert_eq!(document["kind"], "PersistentVolume");

        let mut invalid = tempfile::NamedTempFile::new().unwrap();
        write!(invalid, "kind: PersistentVolume").unwrap();
        assert!(read_document(invalid.path()).is_err());
    }
}
