// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug
use std::{env, fs::create_dir_all, path::PathBuf, str::FromStr, sync::Arc};

use anyhow::Context;
use bkplug::{directories::RTDIR, setup_registry, utils::open_config_file};
use bkplug_api::config::Config;
use clap::Parser;
use log::{debug, info};
use systemd_journal_logger::{JournalLog, connected_to_journal};

use crate::serve::serve;

mod serve;

const BKPLUG_ENV_LOG_LEVEL: &str = "RUST_LOG";

#[derive(Parser, Debug)]
#[command(long_about = "A gRPC host serving bkplug restore item actions and volume snapshotters")]
#[command(name = "bkplug-rpc", version, long_version = env!("BKPLUG_BUILD_INFO"))]
pub(crate) struct Rpc {
    /// Optional: Shut down N seconds after startup. Use 0 to disable.
    /// Requests do not extend the deadline.
    #[clap(long, verbatim_doc_comment, default_value = "0")]
    pub(crate) timeout: u64,
    /// Optional: Listen on this unix socket instead of the endpoints from the
    /// config file.
    #[clap(long, verbatim_doc_comment)]
    pub(crate) socket_path: Option<PathBuf>,
}

fn manage_rpc_journal_log_level() {
    // env_logger uses the environment variable RUST_LOG to set the log
    // level. Parse RUST_LOG to set the log level for journald.
    log::set_max_level(log::LevelFilter::Error);
    if let Ok(level) = env::var(BKPLUG_ENV_LOG_LEVEL) {
        match log::LevelFilter::from_str(&level) {
            Ok(value) => log::set_max_level(value),
            Err(e) => log::error!("Invalid Log Level: {}", e),
        }
    }
}

fn initialize_rpc() -> anyhow::Result<()> {
    if connected_to_journal() {
        // If bkplug-rpc is running as a service, log to journald.
        JournalLog::new()?
            .with_extra_fields(vec![("VERSION", env!("CARGO_PKG_VERSION"))])
            .install()
            .context("unable to initialize journal based logs")?;
        manage_rpc_journal_log_level();
        debug!("Log using journald");
    } else {
        // Ignore error if already initialized.
        let _ = env_logger::try_init();
        debug!("Log using env_logger");
    }

    create_dir_all(RTDIR).context("unable to create runtime directory")?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Rpc::parse();
    initialize_rpc()?;

    let sockets = match args.socket_path {
        Some(path) => vec![path],
        None => Config::load()
            .unix_sockets()
            .into_iter()
            .map(PathBuf::from)
            .collect(),
    };

    let registry = setup_registry(&open_config_file()).context("unable to register plugins")?;
    let command = env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "bkplug-rpc".to_string());
    info!("Serving {} plugins", registry.list(&command).len());

    serve(Arc::new(registry), &command, &sockets, args.timeout).await
}
