//! Encrypted secret file
//!
//! One JSON object of `key -> hex(AES-GCM ciphertext)` shared by every
//! process of the installation. The master key lives in the OS keychain.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use atlascode_core::{RepoResult, SecretStorage};
use tracing::{debug, warn};

use crate::crypto::SecretCipher;
use crate::fs::{load_map, update_map};
use crate::keychain::MasterKeyProvider;

/// File name of the secret file inside the data directory.
pub const SECRETS_FILE: &str = "secrets.json";

pub struct EncryptedFileSecretStorage {
    path: PathBuf,
    cipher: SecretCipher,
}

impl EncryptedFileSecretStorage {
    pub fn new(path: impl Into<PathBuf>, cipher: SecretCipher) -> Self {
        Self {
            path: path.into(),
            cipher,
        }
    }

    /// Open `{data_dir}/secrets.json` with the master key from `keys`.
    pub fn open(data_dir: &Path, keys: &dyn MasterKeyProvider) -> anyhow::Result<Self> {
        let master_key = keys.get_or_create_key()?;
        let cipher = SecretCipher::new(&master_key)?;
        Ok(Self::new(data_dir.join(SECRETS_FILE), cipher))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SecretStorage for EncryptedFileSecretStorage {
    async fn get(&self, key: &str) -> RepoResult<Option<String>> {
        let map = load_map(&self.path).await?;
        let Some(ciphertext) = map.get(key) else {
            return Ok(None);
        };
        match self.cipher.decrypt(ciphertext, key) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(e) => {
                // Written under another master key; unusable
                warn!("[SecretStorage] Cannot decrypt '{}': {}", key, e);
                Ok(None)
            }
        }
    }

    async fn store(&self, key: &str, value: &str) -> RepoResult<()> {
        let ciphertext = self.cipher.encrypt(value, key)?;
        let entry = key.to_string();
        update_map(&self.path, move |map| {
            map.insert(entry, ciphertext);
            true
        })
        .await?;
        debug!("[SecretStorage] Stored '{}'", key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> RepoResult<()> {
        let entry = key.to_string();
        if update_map(&self.path, move |map| map.remove(&entry).is_some()).await? {
            debug!("[SecretStorage] Deleted '{}'", key);
        }
        Ok(())
    }
}
