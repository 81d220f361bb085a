//! Registered sites per product, persisted in global state under
//! `{product}Sites`.

use atlascode_core::{
    AuthError, AuthEvent, AuthResult, DetailedSiteInfo, EventSender, GlobalState, ProductKey,
};
use tracing::info;

#[derive(Clone)]
pub struct SiteRegistry {
    state: GlobalState,
    events: EventSender,
}

impl SiteRegistry {
    pub fn new(state: GlobalState, events: EventSender) -> Self {
        Self { state, events }
    }

    pub async fn get_sites(&self, product: ProductKey) -> Vec<DetailedSiteInfo> {
        self.state.sites(product).await
    }

    pub async fn all_sites(&self) -> Vec<DetailedSiteInfo> {
        let mut sites = Vec::new();
        for product in ProductKey::all() {
            sites.extend(self.get_sites(product).await);
        }
        sites
    }

    /// Insert a site, replacing any entry bound to the same credential slot.
    pub async fn add_or_update_site(&self, site: &DetailedSiteInfo) -> AuthResult<()> {
        let mut sites = self.get_sites(site.product).await;
        match sites
            .iter_mut()
            .find(|s| s.credential_id == site.credential_id)
        {
            Some(existing) => *existing = site.clone(),
            None => {
                info!("[Sites] Adding {} site {}", site.product, site.host);
                sites.push(site.clone());
            }
        }
        self.state
            .set_sites(site.product, &sites)
            .await
            .map_err(|e| AuthError::storage("site registration", e))
    }

    /// Remove a site. Returns whether it was registered.
    pub async fn remove_site(&self, site: &DetailedSiteInfo) -> AuthResult<bool> {
        let mut sites = self.get_sites(site.product).await;
        let before = sites.len();
        sites.retain(|s| s.credential_id != site.credential_id);
        if sites.len() == before {
            return Ok(false);
        }

        self.state
            .set_sites(site.product, &sites)
            .await
            .map_err(|e| AuthError::storage("site removal", e))?;
        info!("[Sites] Removed {} site {}", site.product, site.host);
        self.events.emit(AuthEvent::SiteRemoved { site: site.clone() });
        Ok(true)
    }
}
