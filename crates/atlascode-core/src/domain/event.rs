//! Auth events
//!
//! Emitted by the credential manager and the site registry, consumed by the
//! client manager (cache invalidation) and the host (status output).

use serde::{Deserialize, Serialize};

use super::{DetailedSiteInfo, ProductKey};

/// A change to stored credentials or registered sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthEvent {
    /// A credential was written for the site.
    CredentialsUpdated {
        site: DetailedSiteInfo,
        credential_id: String,
    },

    /// A credential slot was deleted.
    CredentialsRemoved {
        product: ProductKey,
        credential_id: String,
        user_id: String,
    },

    /// A site was removed from the product's site list.
    SiteRemoved { site: DetailedSiteInfo },
}

impl AuthEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CredentialsUpdated { .. } => "credentials_updated",
            Self::CredentialsRemoved { .. } => "credentials_removed",
            Self::SiteRemoved { .. } => "site_removed",
        }
    }

    /// Credential slot affected by this event.
    pub fn credential_id(&self) -> &str {
        match self {
            Self::CredentialsUpdated { credential_id, .. }
            | Self::CredentialsRemoved { credential_id, .. } => credential_id,
            Self::SiteRemoved { site } => &site.credential_id,
        }
    }
}
