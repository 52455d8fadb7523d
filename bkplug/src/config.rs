// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use std::{collections::HashMap, str::FromStr};

use serde::Deserialize;

use crate::errors::ParseError;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    storage_class_mapping: HashMap<String, String>,
    database: Option<DatabaseConfig>,
}

impl Config {
    /// Maps a storage class found in a backup to the one used on restore.
    pub fn storage_class_mapping(&self) -> &HashMap<String, String> {
        &self.storage_class_mapping
    }

    pub fn database(&self) -> DatabaseConfig {
        self.database.clone().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub max_retries: u32,
    pub millisec_delay: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            // Maximum numbers of times to attempt to open the database after a failed attempt
            max_retries: 10,
            // Number of milli-seconds to wait between failed database attempts
            millisec_delay: 1000,
        }
    }
}

impl FromStr for Config {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(ParseError::ConfigParseError)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_config_from_invalid_string() {
        assert!(Config::from_str("i am a teapot").is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_str("").expect("error parsing toml input");
        assert!(config.storage_class_mapping().is_empty());
        assert_eq!(config.database(), DatabaseConfig::default());
    }

    #[test]
    fn test_config_storage_class_mapping() {
        let input = r#"
        [storage_class_mapping]
        gp2 = "standard"
        "fast-ssd" = "premium-rwo"
        "#;
        let config = Config::from_str(input).expect("error parsing toml input");
        let mapping = config.storage_class_mapping();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get("gp2").unwrap(), "standard");
        assert_eq!(mapping.get("fast-ssd").unwrap(), "premium-rwo");
    }

    #[test]
    fn test_config_database_and_unrelated_sections() {
        let input = r#"
        [database]
        max_retries = 3
        millisec_delay = 50

        [[grpc.endpoints]]
        type = "unix"
        path = "/tmp/bkplug.sock"
        "#;
        let config = Config::from_str(input).expect("error parsing toml input");
        assert_eq!(
            config.database(),
            DatabaseConfig {
                max_retries: 3,
                millisec_delay: 50
            }
        );
    }
}
