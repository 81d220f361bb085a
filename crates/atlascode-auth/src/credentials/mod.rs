//! Credential persistence and caching.

mod manager;
mod queue;

pub use manager::CredentialManager;
pub use queue::{Priority, SerialQueue};
