//! Collaborator traits
//!
//! Narrow interfaces over the host-provided services: the secret store, the
//! legacy OS keychain, the process-shared global state and user
//! notifications. Implementations live in `atlascode-storage` (and in the
//! test mocks).

use async_trait::async_trait;

/// Result type for repository operations
pub type RepoResult<T> = anyhow::Result<T>;

/// Persistent secret store, keyed by `"{product}-{credential id}"`.
///
/// Values are opaque strings (the credential JSON).
#[async_trait]
pub trait SecretStorage: Send + Sync {
    async fn get(&self, key: &str) -> RepoResult<Option<String>>;

    async fn store(&self, key: &str, value: &str) -> RepoResult<()>;

    /// Delete a value. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> RepoResult<()>;
}

/// Legacy OS keychain, read once per credential for migration.
#[async_trait]
pub trait LegacyKeychain: Send + Sync {
    /// Read a password; `None` when absent or the keychain is unavailable.
    async fn get_password(&self, service: &str, account: &str) -> Option<String>;

    /// Delete a password, returning whether anything was removed.
    async fn delete_password(&self, service: &str, account: &str) -> bool;
}

/// Key/value state shared by every process of the same installation.
///
/// Reads must observe writes made by other processes.
#[async_trait]
pub trait GlobalStateStore: Send + Sync {
    async fn get(&self, key: &str) -> RepoResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> RepoResult<()>;

    async fn delete(&self, key: &str) -> RepoResult<()>;
}

/// User-facing notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Show a warning; resolves to the chosen action, if any.
    async fn show_warning(&self, message: &str, actions: &[&str]) -> Option<String>;

    /// Show an error; resolves to the chosen action, if any.
    async fn show_error(&self, message: &str, actions: &[&str]) -> Option<String>;
}
