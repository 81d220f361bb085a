//! Global State Service
//!
//! Typed access to the process-shared key/value store: the ruling process id
//! and the per-product site lists.

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{DetailedSiteInfo, GlobalStateStore, ProductKey};

/// Global state key constants.
pub mod keys {
    /// Pid of the process responsible for token refresh (u32)
    pub const RULING_PID: &str = crate::branding::RULING_PID_KEY;
}

/// Typed wrapper over a [`GlobalStateStore`].
///
/// Cheap to clone; every read goes to the store so values written by other
/// processes are observed.
#[derive(Clone)]
pub struct GlobalState {
    store: Arc<dyn GlobalStateStore>,
}

impl GlobalState {
    pub fn new(store: Arc<dyn GlobalStateStore>) -> Self {
        Self { store }
    }

    /// Get a value parsed as JSON.
    ///
    /// Returns `None` if the key doesn't exist or parsing fails.
    pub async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(value)) => match serde_json::from_str(&value) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!("[GlobalState] Failed to parse '{}': {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("[GlobalState] Failed to get '{}': {}", key, e);
                None
            }
        }
    }

    pub async fn set_typed<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(value)?;
        self.store.set(key, &serialized).await
    }

    pub async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.store.delete(key).await
    }

    pub async fn ruling_pid(&self) -> Option<u32> {
        self.get_typed(keys::RULING_PID).await
    }

    pub async fn set_ruling_pid(&self, pid: u32) -> anyhow::Result<()> {
        debug!("[GlobalState] Setting ruling pid to {}", pid);
        self.set_typed(keys::RULING_PID, &pid).await
    }

    /// Sites registered for a product (empty when unset).
    pub async fn sites(&self, product: ProductKey) -> Vec<DetailedSiteInfo> {
        self.get_typed(&product.sites_key())
            .await
            .unwrap_or_default()
    }

    pub async fn set_sites(
        &self,
        product: ProductKey,
        sites: &[DetailedSiteInfo],
    ) -> anyhow::Result<()> {
        self.set_typed(&product.sites_key(), &sites).await
    }
}
