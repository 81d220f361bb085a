//! OS keychain access.
//!
//! Uses the platform-native secure storage:
//! - Windows: Credential Manager
//! - macOS: Keychain
//! - Linux: Secret Service (GNOME Keyring, KWallet)
//!
//! The keychain holds the master key of the secret file and, for older
//! installations, the credentials themselves (read once for migration).

use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use atlascode_core::{branding, LegacyKeychain};
use keyring::Entry;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{generate_master_key, KEY_SIZE};

/// Account name of the master encryption key.
const MASTER_KEY_NAME: &str = "master-encryption-key";

/// Source of the secret file's master key.
pub trait MasterKeyProvider: Send + Sync {
    /// Get the master key, creating one if it doesn't exist.
    fn get_or_create_key(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>>;

    fn key_exists(&self) -> bool;

    /// Delete the master key (for testing or reset).
    fn delete_key(&self) -> Result<()>;
}

/// Master key stored in the OS keychain.
pub struct KeychainKeyProvider {
    entry: Entry,
}

impl KeychainKeyProvider {
    pub fn new() -> Result<Self> {
        Self::with_names(branding::SECRETS_KEYCHAIN_SERVICE, MASTER_KEY_NAME)
    }

    /// Create with a custom service and account name.
    pub fn with_names(service: &str, key_name: &str) -> Result<Self> {
        let entry = Entry::new(service, key_name).context("Failed to create keychain entry")?;
        Ok(Self { entry })
    }
}

impl MasterKeyProvider for KeychainKeyProvider {
    fn get_or_create_key(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
        match self.entry.get_password() {
            Ok(hex_key) => {
                debug!("[Keychain] Retrieved existing master key");
                let key_bytes = Zeroizing::new(
                    hex::decode(&hex_key).context("Invalid key format in keychain")?,
                );
                if key_bytes.len() != KEY_SIZE {
                    anyhow::bail!(
                        "Invalid key size in keychain: expected {}, got {}",
                        KEY_SIZE,
                        key_bytes.len()
                    );
                }
                let mut key = Zeroizing::new([0u8; KEY_SIZE]);
                key.copy_from_slice(&key_bytes);
                Ok(key)
            }
            Err(keyring::Error::NoEntry) => {
                info!("[Keychain] No master key found, generating new key");
                let key = Zeroizing::new(generate_master_key()?);
                let hex_key = Zeroizing::new(hex::encode(*key));
                self.entry
                    .set_password(&hex_key)
                    .context("Failed to store master key in keychain")?;
                Ok(key)
            }
            Err(e) => {
                warn!("[Keychain] Error: {:?}", e);
                Err(anyhow::anyhow!("Failed to access keychain: {}", e))
            }
        }
    }

    fn key_exists(&self) -> bool {
        self.entry.get_password().is_ok()
    }

    fn delete_key(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) => {
                info!("[Keychain] Master key deleted");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("Failed to delete key from keychain: {}", e)),
        }
    }
}

/// In-memory master key, for tests and headless hosts.
#[derive(Default)]
pub struct MemoryKeyProvider {
    key: Mutex<Option<[u8; KEY_SIZE]>>,
}

impl MemoryKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: [u8; KEY_SIZE]) -> Self {
        Self {
            key: Mutex::new(Some(key)),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<[u8; KEY_SIZE]>> {
        self.key.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MasterKeyProvider for MemoryKeyProvider {
    fn get_or_create_key(&self) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
        let mut slot = self.slot();
        if let Some(key) = *slot {
            return Ok(Zeroizing::new(key));
        }
        let key = generate_master_key()?;
        *slot = Some(key);
        Ok(Zeroizing::new(key))
    }

    fn key_exists(&self) -> bool {
        self.slot().is_some()
    }

    fn delete_key(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}

/// Credentials written by older releases directly into the OS keychain.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringLegacyKeychain;

impl KeyringLegacyKeychain {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LegacyKeychain for KeyringLegacyKeychain {
    async fn get_password(&self, service: &str, account: &str) -> Option<String> {
        let (service, account) = (service.to_string(), account.to_string());
        let result = tokio::task::spawn_blocking(move || {
            Entry::new(&service, &account).and_then(|entry| entry.get_password())
        })
        .await;
        match result {
            Ok(Ok(password)) => Some(password),
            Ok(Err(keyring::Error::NoEntry)) => None,
            Ok(Err(e)) => {
                debug!("[Keychain] Legacy keychain unavailable: {}", e);
                None
            }
            Err(e) => {
                warn!("[Keychain] Legacy keychain task failed: {}", e);
                None
            }
        }
    }

    async fn delete_password(&self, service: &str, account: &str) -> bool {
        let (service, account) = (service.to_string(), account.to_string());
        let result = tokio::task::spawn_blocking(move || {
            Entry::new(&service, &account).and_then(|entry| entry.delete_credential())
        })
        .await;
        match result {
            Ok(Ok(())) => true,
            Ok(Err(keyring::Error::NoEntry)) => false,
            Ok(Err(e)) => {
                warn!("[Keychain] Failed to delete legacy credential: {}", e);
                false
            }
            Err(e) => {
                warn!("[Keychain] Legacy keychain task failed: {}", e);
                false
            }
        }
    }
}
