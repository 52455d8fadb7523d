// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use bkplug_api::client::list_plugins;
use tonic::transport::Channel;

use crate::table::OutputTable;

pub(crate) async fn execute_list(channel: Channel) -> anyhow::Result<()> {
    let mut table = OutputTable::new_list();
    for plugin in list_plugins(channel).await? {
        table.add_plugin(&plugin);
    }
    table.print();
    Ok(())
}
