use std::path::PathBuf;

use cargo_metadata::MetadataCommand;
use lazy_static::lazy_static;

lazy_static! {
    pub static ref WORKSPACE_ROOT: PathBuf = workspace_root();
}

fn workspace_root() -> PathBuf {
    match MetadataCommand::new().no_deps().exec() {
        Ok(metadata) => metadata.workspace_root.into_std_path_buf(),
        Err(e) => panic!("failed to run cargo metadata: {e}"),
    }
}
