// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of bkplug

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Mutex, MutexGuard},
};

use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use sled::{Config as SledConfig, Db, Tree};

use crate::{
    config::DatabaseConfig,
    directories::STDIR_SNAPSHOTS,
    errors::BkplugError,
    plugin::VolumeSnapshotter,
    types::VolumeInfo,
    utils::{nested_object_mut, nested_str, open_database},
};

const PLUGIN_NAME: &str = "bkplug.io/local";
const CONFIG_KEY_PATH: &str = "path";
const CONFIG_KEY_VOLUME_TYPE: &str = "volumeType";
const DEFAULT_VOLUME_TYPE: &str = "local";
const SNAPSHOTS_TREE: &str = "snapshots";
const VOLUMES_TREE: &str = "volumes";
const SNAPSHOT_PREFIX: &str = "snap-";
const VOLUME_PREFIX: &str = "vol-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SnapshotRecord {
    volume_id: String,
    volume_az: String,
    volume_type: String,
    iops: Option<i64>,
    tags: HashMap<String, String>,
    created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct VolumeRecord {
    volume_type: String,
    volume_az: String,
    iops: Option<i64>,
    source_snapshot: String,
}

struct Catalogue {
    path: PathBuf,
    volume_type: String,
    // Keeps the database open for the lifetime of the trees.
    _db: Db,
    snapshots: Tree,
    volumes: Tree,
}

impl Catalogue {
    fn get<T: DeserializeOwned>(tree: &Tree, id: &str) -> Result<Option<T>, BkplugError> {
        tree.get(id)
            .map_err(|e| BkplugError::DatabaseError(format!("unable to read {id}"), e.to_string()))?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(BkplugError::from))
            .transpose()
    }

    fn put<T: Serialize>(tree: &Tree, id: &str, record: &T) -> Result<(), BkplugError> {
        tree.insert(id, serde_json::to_vec(record)?).map_err(|e| {
            BkplugError::DatabaseError(format!("unable to write {id}"), e.to_string())
        })?;
        tree.flush().map_err(|e| {
            BkplugError::DatabaseError("unable to flush database".to_string(), e.to_string())
        })?;
        Ok(())
    }
}

/// A volume snapshotter that keeps its snapshot and volume catalogue in a
/// local sled database.
pub struct LocalVolumeSnapshotter {
    database_config: DatabaseConfig,
    catalogue: Mutex<Option<Catalogue>>,
}

impl LocalVolumeSnapshotter {
    pub fn new(database_config: DatabaseConfig) -> Self {
        Self {
            database_config,
            catalogue: Mutex::new(None),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Catalogue>>, BkplugError> {
        self.catalogue
            .lock()
            .map_err(|e| BkplugError::InternalError(format!("catalogue lock poisoned: {e}")))
    }

    fn with_catalogue<T>(
        &self,
        f: impl FnOnce(&Catalogue) -> Result<T, BkplugError>,
    ) -> Result<T, BkplugError> {
        let guard = self.lock()?;
        let catalogue = guard
            .as_ref()
            .ok_or_else(|| BkplugError::NotInitialized(PLUGIN_NAME.to_string()))?;
        f(catalogue)
    }
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}{}", hex::encode(rand::random::<[u8; 8]>()))
}

impl VolumeSnapshotter for LocalVolumeSnapshotter {
    fn init(&self, config: HashMap<String, String>) -> Result<(), BkplugError> {
        if let Some(key) = config
            .keys()
            .find(|k| *k != CONFIG_KEY_PATH && *k != CONFIG_KEY_VOLUME_TYPE)
        {
            return Err(BkplugError::InvalidConfigKey {
                plugin: PLUGIN_NAME.to_string(),
                key: key.clone(),
            });
        }

        let path = config
            .get(CONFIG_KEY_PATH)
            .map_or_else(|| PathBuf::from(STDIR_SNAPSHOTS), PathBuf::from);
        let volume_type = config
            .get(CONFIG_KEY_VOLUME_TYPE)
            .cloned()
            .unwrap_or_else(|| DEFAULT_VOLUME_TYPE.to_string());

        let mut guard = self.lock()?;
        if let Some(catalogue) = guard.as_mut() {
            if catalogue.path == path {
                debug!("Snapshot catalogue at {} is already open", path.display());
                catalogue.volume_type = volume_type;
                return Ok(());
            }
        }

        // The open catalogue stays in place until the new one is ready.
        let db = open_database(SledConfig::default().path(&path), &self.database_config)?;
        let open_tree = |name: &str| {
            db.open_tree(name).map_err(|e| {
                BkplugError::DatabaseError(format!("unable to open tree {name}"), e.to_string())
            })
        };
        let snapshots = open_tree(SNAPSHOTS_TREE)?;
        let volumes = open_tree(VOLUMES_TREE)?;

        info!("Opened snapshot catalogue at {}", path.display());
        *guard = Some(Catalogue {
            path,
            volume_type,
            _db: db,
            snapshots,
            volumes,
        });
        Ok(())
    }

    fn create_volume_from_snapshot(
        &self,
        snapshot_id: &str,
        volume_type: &str,
        volume_az: &str,
        iops: Option<i64>,
    ) -> Result<String, BkplugError> {
        self.with_catalogue(|catalogue| {
            let snapshot: SnapshotRecord = Catalogue::get(&catalogue.snapshots, snapshot_id)?
                .ok_or_else(|| BkplugError::SnapshotNotFound(snapshot_id.to_string()))?;

            let volume = VolumeRecord {
                volume_type: if volume_type.is_empty() {
                    snapshot.volume_type
                } else {
                    volume_type.to_string()
                },
                volume_az: volume_az.to_string(),
                iops: iops.or(snapshot.iops),
                source_snapshot: snapshot_id.to_string(),
            };
            let volume_id = new_id(VOLUME_PREFIX);
            Catalogue::put(&catalogue.volumes, &volume_id, &volume)?;
            info!("Created volume {volume_id} from snapshot {snapshot_id}");
            Ok(volume_id)
        })
    }

    fn get_volume_info(
        &self,
        volume_id: &str,
        _volume_az: &str,
    ) -> Result<VolumeInfo, BkplugError> {
        self.with_catalogue(|catalogue| {
            Ok(
                match Catalogue::get::<VolumeRecord>(&catalogue.volumes, volume_id)? {
                    Some(volume) => VolumeInfo {
                        volume_type: volume.volume_type,
                        iops: volume.iops,
                    },
                    None => VolumeInfo {
                        volume_type: catalogue.volume_type.clone(),
                        iops: None,
                    },
                },
            )
        })
    }

    fn create_snapshot(
        &self,
        volume_id: &str,
        volume_az: &str,
        tags: &HashMap<String, String>,
    ) -> Result<String, BkplugError> {
        self.with_catalogue(|catalogue| {
            let (volume_type, iops) =
                match Catalogue::get::<VolumeRecord>(&catalogue.volumes, volume_id)? {
                    Some(volume) => (volume.volume_type, volume.iops),
                    None => (catalogue.volume_type.clone(), None),
                };
            let snapshot = SnapshotRecord {
                volume_id: volume_id.to_string(),
                volume_az: volume_az.to_string(),
                volume_type,
                iops,
                tags: tags.clone(),
                created_at: Utc::now().to_rfc3339(),
            };
            let snapshot_id = new_id(SNAPSHOT_PREFIX);
            Catalogue::put(&catalogue.snapshots, &snapshot_id, &snapshot)?;
            info!("Created snapshot {snapshot_id} of volume {volume_id}");
            Ok(snapshot_id)
        })
    }

    fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), BkplugError> {
        self.with_catalogue(|catalogue| {
            let removed = catalogue.snapshots.remove(snapshot_id).map_err(|e| {
                BkplugError::DatabaseError(
                    format!("unable to delete snapshot {snapshot_id}"),
                    e.to_string(),
                )
            })?;
            if removed.is_none() {
                debug!("Snapshot {snapshot_id} does not exist, nothing to delete");
            } else {
                info!("Deleted snapshot {snapshot_id}");
            }
            Ok(())
        })
    }

    fn get_volume_id(&self, persistent_volume: &Value) -> Result<String, BkplugError> {
        self.with_catalogue(|_| Ok(()))?;
        let handle = nested_str(persistent_volume, &["spec", "csi", "volumeHandle"]);
        Ok(handle.unwrap_or_default().to_string())
    }

    fn set_volume_id(
        &self,
        mut persistent_volume: Value,
        volume_id: &str,
    ) -> Result<Value, BkplugError> {
        self.with_catalogue(|_| Ok(()))?;
        if persistent_volume
            .get("spec")
            .and_then(|spec| spec.get("csi"))
            .is_none()
        {
            return Err(BkplugError::InvalidDocument(
                "persistent volume has no spec.csi section".to_string(),
            ));
        }
        nested_object_mut(&mut persistent_volume, &["spec", "csi"])?.insert(
            "volumeHandle".to_string(),
            Value::String(volume_id.to_string()),
        );
        Ok(persistent_volume)
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn initialized() -> (TempDir, LocalVolumeSnapshotter) {
        let dir = tempfile::tempdir().unwrap();
        let snapshotter = LocalVolumeSnapshotter::new(DatabaseConfig::default());
        snapshotter
            .init(HashMap::from([(
                CONFIG_KEY_PATH.to_string(),
                dir.path().join("catalogue").display().to_string(),
            )]))
            .unwrap();
        (dir, snapshotter)
    }

    #[test]
    fn test_requires_init() {
        let snapshotter = LocalVolumeSnapshotter::new(DatabaseConfig::default());
        assert_matches!(
            snapshotter.create_snapshot("vol-1", "zone-a", &HashMap::new()),
            Err(BkplugError::NotInitialized(_))
        );
        assert_matches!(
            snapshotter.get_volume_id(&json!({})),
            Err(BkplugError::NotInitialized(_))
        );
        assert_matches!(
            snapshotter.delete_snapshot("snap-1"),
            Err(BkplugError::NotInitialized(_))
        );
    }

    #[test]
    fn test_init_rejects_unknown_keys() {
        let snapshotter = LocalVolumeSnapshotter::new(DatabaseConfig::default());
        let config = HashMap::from([("region".to_string(), "eu".to_string())]);
        assert_matches!(
            snapshotter.init(config),
            Err(BkplugError::InvalidConfigKey { key, .. }) if key == "region"
        );
    }

    #[test]
    fn test_reinit_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalogue").display().to_string();
        let snapshotter = LocalVolumeSnapshotter::new(DatabaseConfig::default());
        let config = HashMap::from([(CONFIG_KEY_PATH.to_string(), path.clone())]);
        snapshotter.init(config).unwrap();
        snapshotter
            .init(HashMap::from([
                (CONFIG_KEY_PATH.to_string(), path),
                (CONFIG_KEY_VOLUME_TYPE.to_string(), "ssd".to_string()),
            ]))
            .unwrap();
        assert_eq!(
            snapshotter
                .get_volume_info("vol-unknown", "zone-a")
                .unwrap(),
            VolumeInfo {
                volume_type: "ssd".to_string(),
                iops: None
            }
        );
    }

    #[test]
    fn test_failed_reinit_keeps_catalogue() {
        let (dir, snapshotter) = initialized();
        let snapshot_id = snapshotter
            .create_snapshot("vol-src", "zone-a", &HashMap::new())
            .unwrap();

        let file = dir.path().join("file");
        std::fs::write(&file, "not a directory").unwrap();
        let unusable = file.join("sub").display().to_string();
        let config = HashMap::from([(CONFIG_KEY_PATH.to_string(), unusable)]);
        assert_matches!(
            snapshotter.init(config),
            Err(BkplugError::DatabaseError(_, _))
        );

        assert!(
            snapshotter
                .create_volume_from_snapshot(&snapshot_id, "", "zone-a", None)
                .is_ok()
        );
    }

    #[test]
    fn test_snapshot_lifecycle() {
        let (_dir, snapshotter) = initialized();
        let tags = HashMap::from([("backup".to_string(), "nightly".to_string())]);

        let snapshot_id = snapshotter
            .create_snapshot("vol-src", "zone-a", &tags)
            .unwrap();
        assert!(snapshot_id.starts_with(SNAPSHOT_PREFIX));
        assert_eq!(snapshot_id.len(), SNAPSHOT_PREFIX.len() + 16);

        let volume_id = snapshotter
            .create_volume_from_snapshot(&snapshot_id, "", "zone-b", Some(3000))
            .unwrap();
        assert!(volume_id.starts_with(VOLUME_PREFIX));
        assert_eq!(
            snapshotter.get_volume_info(&volume_id, "zone-b").unwrap(),
            VolumeInfo {
                volume_type: DEFAULT_VOLUME_TYPE.to_string(),
                iops: Some(3000)
            }
        );

        // A snapshot of the restored volume inherits its type and IOPS.
        let second = snapshotter
            .create_snapshot(&volume_id, "zone-b", &HashMap::new())
            .unwrap();
        let copy = snapshotter
            .create_volume_from_snapshot(&second, "", "zone-b", None)
            .unwrap();
        assert_eq!(
            snapshotter.get_volume_info(&copy, "zone-b").unwrap().iops,
            Some(3000)
        );

        snapshotter.delete_snapshot(&snapshot_id).unwrap();
        assert_matches!(
            snapshotter.create_volume_from_snapshot(&snapshot_id, "", "zone-a", None),
            Err(BkplugError::SnapshotNotFound(id)) if id == snapshot_id
        );
        // Deleting twice is fine.
        snapshotter.delete_snapshot(&snapshot_id).unwrap();
    }

    #[test]
    fn test_explicit_volume_type() {
        let (_dir, snapshotter) = initialized();
        let snapshot_id = snapshotter
            .create_snapshot("vol-src", "zone-a", &HashMap::new())
            .unwrap();
        let volume_id = snapshotter
            .create_volume_from_snapshot(&snapshot_id, "fast", "zone-a", None)
            .unwrap();
        assert_eq!(
            snapshotter.get_volume_info(&volume_id, "zone-a").unwrap(),
            VolumeInfo {
                volume_type: "fast".to_string(),
                iops: None
            }
        );
    }

    #[test]
    fn test_volume_id_round_trip_through_pv() {
        let (_dir, snapshotter) = initialized();
        let pv = json!({
            "kind": "PersistentVolume",
            "metadata": {"name": "pv-1"},
            "spec": {"csi": {"driver": "hostpath.csi.k8s.io", "volumeHandle": "vol-old"}}
        });
        assert_eq!(snapshotter.get_volume_id(&pv).unwrap(), "vol-old");

        let updated = snapshotter.set_volume_id(pv, "vol-new").unwrap();
        assert_eq!(updated["spec"]["csi"]["volumeHandle"], "vol-new");
        assert_eq!(updated["spec"]["csi"]["driver"], "hostpath.csi.k8s.io");
        assert_eq!(snapshotter.get_volume_id(&updated).unwrap(), "vol-new");
    }

    #[test]
    fn test_non_csi_volume() {
        let (_dir, snapshotter) = initialized();
        let pv = json!({"kind": "PersistentVolume", "spec": {"hostPath": {"path": "/data"}}});
        assert_eq!(snapshotter.get_volume_id(&pv).unwrap(), "");
        assert_matches!(
            snapshotter.set_volume_id(pv, "vol-new"),
            Err(BkplugError::InvalidDocument(_))
        );
    }
}
