//! JSON map files shared between processes.
//!
//! Every read goes to disk so writes of other processes are observed. Writes
//! run load-modify-save under an exclusive OS lock on a sidecar `.lock` file
//! and replace the map atomically (write tmp + rename).

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use fs4::fs_std::FileExt;

pub(crate) type JsonMap = BTreeMap<String, String>;

/// Load the map at `path`; a missing file is an empty map.
pub(crate) async fn load_map(path: &Path) -> anyhow::Result<JsonMap> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => parse_map(path, &contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(JsonMap::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Apply `modify` to the map at `path` while holding the file lock.
///
/// `modify` returns whether it changed the map; unchanged maps are not
/// rewritten. The returned flag is the one `modify` produced.
pub(crate) async fn update_map<F>(path: &Path, modify: F) -> anyhow::Result<bool>
where
    F: FnOnce(&mut JsonMap) -> bool + Send + 'static,
{
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let _lock = FileLock::acquire(&path)?;
        let mut map = read_map(&path)?;
        let changed = modify(&mut map);
        if changed {
            write_map(&path, &map)?;
        }
        Ok(changed)
    })
    .await
    .context("State file update was aborted")?
}

fn parse_map(path: &Path, contents: &str) -> anyhow::Result<JsonMap> {
    if contents.trim().is_empty() {
        return Ok(JsonMap::new());
    }
    serde_json::from_str(contents).with_context(|| format!("Corrupt state file {}", path.display()))
}

fn read_map(path: &Path) -> anyhow::Result<JsonMap> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_map(path, &contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(JsonMap::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

fn write_map(path: &Path, map: &JsonMap) -> anyhow::Result<()> {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(map)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_path = sibling(path, &format!("{}.{}.tmp", std::process::id(), seq));
    std::fs::write(&tmp_path, json)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// `{file name}.{suffix}` next to `path`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    path.with_file_name(format!("{}.{}", name, suffix))
}

/// Exclusive lock on `{path}.lock`, released on drop.
struct FileLock {
    file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let lock_path = sibling(path, "lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open {}", lock_path.display()))?;
        FileExt::lock_exclusive(&file)
            .with_context(|| format!("Failed to lock {}", lock_path.display()))?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
