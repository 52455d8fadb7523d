// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use bkplug::types::{
    PluginIdentifier, ResourceSelector, RestoreItemActionExecuteOutput, VolumeInfo,
};
use comfy_table::{Cell, Color, Table};

pub(crate) struct OutputTable(Table);

fn none_if_empty(values: &[String]) -> String {
    if values.is_empty() {
        "None".to_string()
    } else {
        values.join(", ")
    }
}

impl OutputTable {
    fn new_details(title: &str) -> Self {
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::NOTHING);
        table.set_header(vec![
            Cell::new(title)
                .add_attribute(comfy_table::Attribute::Bold)
                .add_attribute(comfy_table::Attribute::Underlined)
                .fg(Color::Green),
        ]);
        OutputTable(table)
    }

    pub(crate) fn new_list() -> Self {
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::NOTHING);
        table.set_header(vec!["Kind", "Name", "Command"]);
        OutputTable(table)
    }

    pub(crate) fn add_plugin(&mut self, plugin: &PluginIdentifier) {
        self.0.add_row(vec![
            plugin.kind.to_string(),
            plugin.name.clone(),
            plugin.command.clone(),
        ]);
    }

    pub(crate) fn new_selector(plugin: &str, selector: &ResourceSelector) -> Self {
        let mut table = Self::new_details(plugin);
        if selector.is_empty() {
            table.0.add_row(vec!["Applies To:", "All resources"]);
            return table;
        }
        table.0.add_row(vec![
            "Included Namespaces:".to_string(),
            none_if_empty(&selector.included_namespaces),
        ]);
        table.0.add_row(vec![
            "Excluded Namespaces:".to_string(),
            none_if_empty(&selector.excluded_namespaces),
        ]);
        table.0.add_row(vec![
            "Included Resources:".to_string(),
            none_if_empty(&selector.included_resources),
        ]);
        table.0.add_row(vec![
            "Excluded Resources:".to_string(),
            none_if_empty(&selector.excluded_resources),
        ]);
        let label_selector = if selector.selector.is_empty() {
            "None"
        } else {
            selector.selector.as_str()
        };
        table.0.add_row(vec!["Label Selector:", label_selector]);
        table
    }

    pub(crate) fn new_execute_output(
        plugin: &str,
        output: &RestoreItemActionExecuteOutput,
    ) -> Self {
        let mut table = Self::new_details(plugin);
        table
            .0
            .add_row(vec!["Skip Restore:", &output.skip_restore.to_string()]);
        table.0.add_row(vec![
            "Item:",
            if output.updated_item.is_some() {
                "Updated"
            } else {
                "Unchanged"
            },
        ]);
        if output.additional_items.is_empty() {
            table.0.add_row(vec!["Additional Items:", "None"]);
        } else {
            for (i, item) in output.additional_items.iter().enumerate() {
                let label = if i == 0 { "Additional Items:" } else { "" };
                table.0.add_row(vec![label.to_string(), item.to_string()]);
            }
        }
        table
    }

    pub(crate) fn new_volume_info(volume_id: &str, info: &VolumeInfo) -> Self {
        let mut table = Self::new_details(volume_id);
        table.0.add_row(vec!["Volume Type:", &info.volume_type]);
        let iops = info
            .iops
            .map_or_else(|| "None".to_string(), |iops| iops.to_string());
        table.0.add_row(vec!["IOPS:", &iops]);
        table
    }

    pub(crate) fn print(&self) {
        println!("{self}\n")
    }
}

impl std::fmt::Display for OutputTable {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
