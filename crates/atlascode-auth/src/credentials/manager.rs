//! Credential manager
//!
//! Per-site credentials cached in memory and persisted in the secret store
//! under `"{product}-{credential id}"`. Credentials still sitting in the
//! legacy OS keychain are migrated on first read. A registered site with no
//! credential anywhere is pruned from the site registry.
//!
//! OAuth writes are ordered by `(iat, received_at)`: a write that is older
//! than the stored credential is dropped, so a slow refresh can never replace
//! a newer token.

use std::sync::Arc;

use atlascode_core::{
    AuthError, AuthEvent, AuthInfo, AuthResult, DetailedSiteInfo, EventSender, LegacyKeychain,
    SecretStorage,
};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::queue::{Priority, SerialQueue};
use crate::sites::SiteRegistry;

pub struct CredentialManager {
    secrets: Arc<dyn SecretStorage>,
    keychain: Option<Arc<dyn LegacyKeychain>>,
    keychain_service: String,
    sites: SiteRegistry,
    events: EventSender,
    memory: DashMap<String, AuthInfo>,
    queue: SerialQueue,
}

impl CredentialManager {
    pub fn new(secrets: Arc<dyn SecretStorage>, sites: SiteRegistry, events: EventSender) -> Self {
        Self {
            secrets,
            keychain: None,
            keychain_service: atlascode_core::branding::KEYCHAIN_SERVICE_V3.to_string(),
            sites,
            events,
            memory: DashMap::new(),
            queue: SerialQueue::new("secret-storage"),
        }
    }

    /// Enable one-time migration from the legacy keychain `service`.
    pub fn with_legacy_keychain(
        mut self,
        keychain: Arc<dyn LegacyKeychain>,
        service: impl Into<String>,
    ) -> Self {
        self.keychain = Some(keychain);
        self.keychain_service = service.into();
        self
    }

    /// Credential of `site`.
    ///
    /// With `allow_cache` the in-memory copy is returned when present;
    /// otherwise the secret store is read (observing writes made by other
    /// processes). `Ok(None)` means no credential exists anywhere and the
    /// site has been deregistered.
    pub async fn get_auth_info(
        &self,
        site: &DetailedSiteInfo,
        allow_cache: bool,
    ) -> AuthResult<Option<AuthInfo>> {
        let key = site.storage_key();
        if allow_cache {
            if let Some(info) = self.memory.get(&key) {
                return Ok(Some(info.clone()));
            }
        }

        let stored = self
            .queue
            .run(Priority::Read, self.read_stored(&key))
            .await?;
        if let Some(info) = stored {
            self.memory.insert(key, info.clone());
            return Ok(Some(info));
        }

        if let Some(info) = self.migrate_from_keychain(&key).await? {
            self.memory.insert(key, info.clone());
            return Ok(Some(info));
        }

        self.memory.remove(&key);
        warn!(
            "[Credentials] No credentials for {} {}, removing site",
            site.product, site.host
        );
        if let Err(e) = self.sites.remove_site(site).await {
            warn!("[Credentials] Failed to prune site {}: {}", site.host, e);
        }
        Ok(None)
    }

    /// Persist a credential for `site`.
    ///
    /// Out-of-order OAuth writes and writes identical to the stored
    /// credential are no-ops.
    pub async fn save_auth_info(&self, site: &DetailedSiteInfo, info: &AuthInfo) -> AuthResult<()> {
        let key = site.storage_key();
        let (current, changed) = self
            .queue
            .run(Priority::Write, async {
                if let Some(existing) = self.read_stored(&key).await? {
                    if let (Some(new), Some(old)) = (info.oauth_secret(), existing.oauth_secret()) {
                        if new.is_older_than(old) {
                            debug!(
                                new_iat = ?new.iat,
                                old_iat = ?old.iat,
                                new_received_at = new.received_at,
                                old_received_at = old.received_at,
                                "[Credentials] Dropping out-of-order write for {}",
                                site.host
                            );
                            return Ok::<_, AuthError>((existing, false));
                        }
                    }
                    if existing.same_as(info) {
                        debug!("[Credentials] Unchanged credentials for {}", site.host);
                        return Ok((info.clone(), false));
                    }
                }

                let json = serde_json::to_string(info)
                    .map_err(|e| AuthError::decode("credential", e))?;
                self.secrets
                    .store(&key, &json)
                    .await
                    .map_err(|e| AuthError::storage("credential write", e))?;
                Ok((info.clone(), true))
            })
            .await?;

        self.memory.insert(key, current);
        if changed {
            debug!("[Credentials] Saved credentials for {}", site.host);
            self.events.emit(AuthEvent::CredentialsUpdated {
                site: site.clone(),
                credential_id: site.credential_id.clone(),
            });
        }
        Ok(())
    }

    /// Delete the credential of `site`. Returns whether anything was removed.
    pub async fn remove_auth_info(&self, site: &DetailedSiteInfo) -> AuthResult<bool> {
        let key = site.storage_key();
        let in_memory = self.memory.remove(&key).is_some();
        let stored = self
            .queue
            .run(Priority::Write, async {
                let existed = self
                    .secrets
                    .get(&key)
                    .await
                    .map_err(|e| AuthError::storage("credential read", e))?
                    .is_some();
                if existed {
                    self.secrets
                        .delete(&key)
                        .await
                        .map_err(|e| AuthError::storage("credential delete", e))?;
                }
                Ok::<_, AuthError>(existed)
            })
            .await?;

        if !(in_memory || stored) {
            return Ok(false);
        }
        info!("[Credentials] Removed credentials for {}", site.host);
        self.events.emit(AuthEvent::CredentialsRemoved {
            product: site.product,
            credential_id: site.credential_id.clone(),
            user_id: site.user_id.clone(),
        });
        Ok(true)
    }

    /// Drop every in-memory copy; the next read goes to the secret store.
    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    async fn read_stored(&self, key: &str) -> AuthResult<Option<AuthInfo>> {
        let raw = self
            .secrets
            .get(key)
            .await
            .map_err(|e| AuthError::storage("credential read", e))?;
        raw.map(|json| serde_json::from_str(&json).map_err(|e| AuthError::decode("credential", e)))
            .transpose()
    }

    async fn migrate_from_keychain(&self, key: &str) -> AuthResult<Option<AuthInfo>> {
        let Some(keychain) = &self.keychain else {
            return Ok(None);
        };
        let Some(raw) = keychain.get_password(&self.keychain_service, key).await else {
            return Ok(None);
        };
        let info: AuthInfo = match serde_json::from_str(&raw) {
            Ok(info) => info,
            Err(e) => {
                warn!("[Credentials] Unreadable legacy credential {}: {}", key, e);
                return Ok(None);
            }
        };

        self.queue
            .run(Priority::Write, self.secrets.store(key, &raw))
            .await
            .map_err(|e| AuthError::storage("credential migration", e))?;
        keychain.delete_password(&self.keychain_service, key).await;
        info!("[Credentials] Migrated {} from the legacy keychain", key);
        Ok(Some(info))
    }
}
