//! In-memory collaborators for tests and ephemeral hosts.

use std::collections::HashMap;

use async_trait::async_trait;
use atlascode_core::{GlobalStateStore, LegacyKeychain, RepoResult, SecretStorage};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemorySecretStorage {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySecretStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.values.read().await.contains_key(key)
    }
}

#[async_trait]
impl SecretStorage for MemorySecretStorage {
    async fn get(&self, key: &str) -> RepoResult<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn store(&self, key: &str, value: &str) -> RepoResult<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> RepoResult<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryGlobalState {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryGlobalState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GlobalStateStore for MemoryGlobalState {
    async fn get(&self, key: &str) -> RepoResult<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> RepoResult<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> RepoResult<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

/// Legacy keychain keyed by `(service, account)`.
#[derive(Default)]
pub struct MemoryKeychain {
    passwords: RwLock<HashMap<(String, String), String>>,
}

impl MemoryKeychain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(
        mut self,
        service: impl Into<String>,
        account: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.passwords
            .get_mut()
            .insert((service.into(), account.into()), password.into());
        self
    }

    pub async fn has_password(&self, service: &str, account: &str) -> bool {
        self.passwords
            .read()
            .await
            .contains_key(&(service.to_string(), account.to_string()))
    }
}

#[async_trait]
impl LegacyKeychain for MemoryKeychain {
    async fn get_password(&self, service: &str, account: &str) -> Option<String> {
        self.passwords
            .read()
            .await
            .get(&(service.to_string(), account.to_string()))
            .cloned()
    }

    async fn delete_password(&self, service: &str, account: &str) -> bool {
        self.passwords
            .write()
            .await
            .remove(&(service.to_string(), account.to_string()))
            .is_some()
    }
}
