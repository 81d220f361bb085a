use serde::{Deserialize, Serialize};

use super::{generate_credential_id, ProductKey};

/// A product instance the user is logged into.
///
/// Created after a successful login; immutable afterwards except for
/// re-issuance when credentials are replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedSiteInfo {
    /// Stable site id (cloud id for cloud sites, host for server sites)
    pub id: String,
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub avatar_url: String,
    pub base_link_url: String,
    pub base_api_url: String,
    pub is_cloud: bool,
    pub user_id: String,
    /// Content-derived key of the credential slot, see [`generate_credential_id`]
    pub credential_id: String,
    pub product: ProductKey,
}

impl DetailedSiteInfo {
    /// Create a site; links default to `https://{host}` and the credential id
    /// is derived from `(id, user_id)`.
    pub fn new(
        product: ProductKey,
        id: impl Into<String>,
        name: impl Into<String>,
        host: impl Into<String>,
        is_cloud: bool,
        user_id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let host = host.into();
        let user_id = user_id.into();
        let base_link_url = format!("https://{}", host);
        let base_api_url = match product {
            ProductKey::Jira => format!("{}/rest", base_link_url),
            ProductKey::Bitbucket if is_cloud => "https://api.bitbucket.org/2.0".to_string(),
            ProductKey::Bitbucket => format!("{}/rest", base_link_url),
        };
        Self {
            credential_id: generate_credential_id(&id, &user_id),
            id,
            name: name.into(),
            host,
            avatar_url: String::new(),
            base_link_url,
            base_api_url,
            is_cloud,
            user_id,
            product,
        }
    }

    pub fn with_base_api_url(mut self, url: impl Into<String>) -> Self {
        self.base_api_url = url.into();
        self
    }

    pub fn with_base_link_url(mut self, url: impl Into<String>) -> Self {
        self.base_link_url = url.into();
        self
    }

    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = url.into();
        self
    }

    /// Secret storage key, e.g. `jira-<credential id>`.
    pub fn storage_key(&self) -> String {
        format!("{}-{}", self.product.key(), self.credential_id)
    }

    /// Same product instance, regardless of the logged-in user.
    pub fn same_instance(&self, other: &DetailedSiteInfo) -> bool {
        self.product == other.product && self.id == other.id
    }
}

impl std::fmt::Display for DetailedSiteInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.host, self.product)
    }
}
