// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use std::{fs, str::FromStr};

use bkplug::directories::{CFGPATH_BKPLUG_CONFIG, RTPATH_BKPLUG_SOCKET};
use log::warn;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub grpc: Grpc,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error parsing config file: {0}")]
    ParseError(#[from] toml::de::Error),
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(ConfigError::ParseError)
    }
}

impl Config {
    /// Reads the config file, falling back to defaults when it is missing or
    /// invalid.
    pub fn load() -> Self {
        if let Ok(c) = fs::read_to_string(CFGPATH_BKPLUG_CONFIG) {
            c.parse().unwrap_or_else(|e| {
                warn!("Unable to parse config file, using defaults: {e}");
                Config::default()
            })
        } else {
            warn!("Unable to read config file, using defaults");
            Config::default()
        }
    }

    /// Paths of every enabled unix endpoint.
    pub fn unix_sockets(&self) -> Vec<String> {
        self.grpc
            .endpoints
            .iter()
            .filter_map(|e| match e {
                Endpoint::Unix { path, enabled } if *enabled => Some(path.clone()),
                Endpoint::Unix { .. } => None,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Grpc {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl Default for Grpc {
    fn default() -> Self {
        Self {
            endpoints: vec![Endpoint::default()],
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Endpoint {
    Unix {
        #[serde(default = "default_unix")]
        path: String,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Unix {
            path: default_unix(),
            enabled: default_enabled(),
        }
    }
}

fn default_unix() -> String {
    RTPATH_BKPLUG_SOCKET.to_string()
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_config_from_invalid_string() {
        assert!(Config::from_str("i am a teapot").is_err());
    }

    #[test]
    fn test_config_endpoint_default() {
        let config = Config::from_str("").expect("error parsing toml input");
        assert_eq!(config.grpc.endpoints, vec![Endpoint::default()]);
        assert_eq!(
            config.unix_sockets(),
            vec![RTPATH_BKPLUG_SOCKET.to_string()]
        );
    }

    #[test]
    fn test_config_endpoint_unix_default() {
        let input = r#"
            [[grpc.endpoints]]
            type = "unix"
            "#;

        let config = Config::from_str(input).expect("error parsing toml input");
        assert_eq!(
            config.grpc.endpoints,
            vec![Endpoint::Unix {
                path: default_unix(),
                enabled: true
            }]
        );
    }

    #[test]
    fn test_config_endpoints() {
        let input = r#"
            [[grpc.endpoints]]
            type = "unix"
            enabled = false
            path = "/run/bkplug/disabled.sock"

            [[grpc.endpoints]]
            type = "unix"
            path = "/tmp/bkplug.sock"

            [storage_class_mapping]
            gp2 = "standard"
        "#;

        let config = Config::from_str(input).expect("error parsing toml input");
        assert_eq!(config.grpc.endpoints.len(), 2);
        assert_eq!(config.unix_sockets(), vec!["/tmp/bkplug.sock".to_string()]);
    }

    #[test]
    fn test_config_unknown_endpoint_type() {
        let input = r#"
            [[grpc.endpoints]]
            type = "tcp"
            "#;
        assert!(Config::from_str(input).is_err());
    }
}
