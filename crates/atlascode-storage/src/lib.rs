//! # Atlascode Storage
//!
//! Concrete collaborators for the auth core.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │      SecretStorage / GlobalStateStore traits         │
//! ├──────────────────────────────────────────────────────┤
//! │  EncryptedFileSecretStorage   JsonGlobalStateStore   │
//! ├──────────────────────────────────────────────────────┤
//! │         SecretCipher (AES-256-GCM)                   │
//! ├──────────────────────────────────────────────────────┤
//! │   KeychainKeyProvider (master key in OS keychain)    │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! `KeyringLegacyKeychain` reads credentials older releases kept in the OS
//! keychain. The `Memory*` types implement the same traits without I/O.

pub mod crypto;
mod fs;
mod global_state;
pub mod keychain;
mod memory;
mod secret_file;

pub use crypto::{generate_master_key, CipherError, SecretCipher, KEY_SIZE};
pub use global_state::{JsonGlobalStateStore, GLOBAL_STATE_FILE};
pub use keychain::{KeychainKeyProvider, KeyringLegacyKeychain, MasterKeyProvider, MemoryKeyProvider};
pub use memory::{MemoryGlobalState, MemoryKeychain, MemorySecretStorage};
pub use secret_file::{EncryptedFileSecretStorage, SECRETS_FILE};
