// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use bkplug::types::RestoreItemActionExecuteInput;
use bkplug_api::client::RestoreItemActionPlugin;
use serde_json::{Value, json};
use tonic::transport::Channel;

use crate::{
    args::{ExecuteArgs, RestoreActionSubcommand},
    read_document,
    table::OutputTable,
};

impl RestoreActionSubcommand {
    pub(crate) async fn execute(&self, channel: Channel) -> anyhow::Result<()> {
        match self {
            RestoreActionSubcommand::AppliesTo(args) => {
                let mut action = RestoreItemActionPlugin::new(channel, &args.plugin);
                let selector = action.applies_to().await?;
                OutputTable::new_selector(action.name(), &selector).print();
                Ok(())
            }
            RestoreActionSubcommand::Execute(args) => execute_restore_action(args, channel).await,
        }
    }
}

async fn execute_restore_action(args: &ExecuteArgs, channel: Channel) -> anyhow::Result<()> {
    let item = read_document(&args.item)?;
    let item_from_backup = match &args.item_from_backup {
        Some(path) => read_document(path)?,
        None => item.clone(),
    };
    let restore: Value = match &args.restore {
        Some(path) => read_document(path)?,
        None => json!({}),
    };

    let mut action = RestoreItemActionPlugin::new(channel, &args.plugin.plugin);
    let output = action
        .execute(&RestoreItemActionExecuteInput {
            item,
            item_from_backup,
            restore,
        })
        .await?;

    OutputTable::new_execute_output(action.name(), &output).print();
    if let Some(updated) = &output.updated_item {
        println!("{}", serde_json::to_string_pretty(updated)?);
    }
    Ok(())
}
