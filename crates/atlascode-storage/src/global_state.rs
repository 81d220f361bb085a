//! Global state file shared by every process of the installation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use atlascode_core::{GlobalStateStore, RepoResult};

use crate::fs::{load_map, update_map};

/// File name of the global state inside the data directory.
pub const GLOBAL_STATE_FILE: &str = "global-state.json";

pub struct JsonGlobalStateStore {
    path: PathBuf,
}

impl JsonGlobalStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `{data_dir}/global-state.json`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(GLOBAL_STATE_FILE))
    }
}

#[async_trait]
impl GlobalStateStore for JsonGlobalStateStore {
    async fn get(&self, key: &str) -> RepoResult<Option<String>> {
        Ok(load_map(&self.path).await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> RepoResult<()> {
        let (key, value) = (key.to_string(), value.to_string());
        update_map(&self.path, move |map| {
            map.insert(key, value);
            true
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> RepoResult<()> {
        let key = key.to_string();
        update_map(&self.path, move |map| map.remove(&key).is_some()).await?;
        Ok(())
    }
}
