// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use std::{
    fs::set_permissions,
    io::ErrorKind,
    os::unix::fs::PermissionsExt,
    path::Path,
    thread::sleep,
    time::Duration,
};

use log::{debug, info, warn};
use serde_json::{Map, Value};
use sled::{Config as SledConfig, Db};

use crate::{
    config::{Config, DatabaseConfig},
    directories::CFGPATH_BKPLUG_CONFIG,
    errors::BkplugError,
};

// The bkplug socket should always allow the same users and members of the same group
// to Read/Write to it.
pub const SOCK_MODE: u32 = 0o0660;

pub fn set_file_permissions(path: &Path, mode: u32) {
    // Set the permissions on the file based on input
    if (set_permissions(path, std::fs::Permissions::from_mode(mode))).is_err() {
        debug!(
            "Unable to set permissions on file {}. Continuing",
            path.to_path_buf().display()
        );
    }
}

pub fn open_config_file() -> Config {
    if let Ok(c) = std::fs::read_to_string(CFGPATH_BKPLUG_CONFIG) {
        c.parse().unwrap_or_else(|_| {
            warn!("Unable to parse config file, using defaults");
            Config::default()
        })
    } else {
        warn!("Unable to read config file, using defaults");
        Config::default()
    }
}

/// Returns true when sled failed because another handle holds the database
/// file lock.
fn is_lock_contention(e: &sled::Error) -> bool {
    match e {
        sled::Error::Io(io) => {
            io.kind() == ErrorKind::WouldBlock || io.to_string().contains("could not acquire lock")
        }
        _ => false,
    }
}

/// Opens a sled database, retrying while another process holds its lock.
pub fn open_database(
    sled_config: SledConfig,
    database_config: &DatabaseConfig,
) -> Result<Db, BkplugError> {
    for _ in 0..=database_config.max_retries {
        match sled_config.open() {
            Ok(db) => {
                debug!("Successfully opened database");
                return Ok(db);
            }
            Err(e) if is_lock_contention(&e) => {
                info!(
                    "Database lock is already held, retrying after {} milliseconds",
                    database_config.millisec_delay
                );
                sleep(Duration::from_millis(database_config.millisec_delay));
            }
            Err(e) => {
                return Err(BkplugError::DatabaseError(
                    "unable to open database".to_string(),
                    e.to_string(),
                ));
            }
        }
    }
    Err(BkplugError::DatabaseLockError)
}

/// Walks `path` through nested JSON objects.
pub fn nested<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(doc, |value, key| value.get(key))
}

pub fn nested_str<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a str> {
    nested(doc, path).and_then(Value::as_str)
}

/// Returns the object at `path`, creating empty objects along the way.
/// Fields set to `null` count as missing.
pub fn nested_object_mut<'a>(
    doc: &'a mut Value,
    path: &[&str],
) -> Result<&'a mut Map<String, Value>, BkplugError> {
    let mut current = doc;
    for key in path {
        let object = current.as_object_mut().ok_or_else(|| {
            BkplugError::InvalidDocument(format!("expected an object above field {key}"))
        })?;
        let field = object.entry((*key).to_string()).or_insert(Value::Null);
        if field.is_null() {
            *field = Value::Object(Map::new());
        }
        current = field;
    }
    current.as_object_mut().ok_or_else(|| {
        BkplugError::InvalidDocument(format!("field {} is not an object", path.join(".")))
    })
}
