//! Login and logout flows
//!
//! Cloud logins run the OAuth dance and register one site per accessible
//! resource. Server logins register a single site with basic or personal
//! access token credentials.

use std::sync::Arc;

use atlascode_core::{
    AuthInfo, AuthInfoState, AuthResult, AuthSecret, DetailedSiteInfo, OAuthProvider, ProductKey,
    UserInfo,
};
use tracing::info;

use crate::credentials::CredentialManager;
use crate::oauth::{AccessibleResource, OAuthDancer, OAuthResponse};
use crate::sites::SiteRegistry;

pub struct LoginManager {
    dancer: Arc<OAuthDancer>,
    credentials: Arc<CredentialManager>,
    sites: SiteRegistry,
}

impl LoginManager {
    pub fn new(
        dancer: Arc<OAuthDancer>,
        credentials: Arc<CredentialManager>,
        sites: SiteRegistry,
    ) -> Self {
        Self {
            dancer,
            credentials,
            sites,
        }
    }

    /// Authorize with `provider` in the browser and register the granted sites.
    ///
    /// When `site_hint` names the host of a granted resource only that site
    /// is registered.
    pub async fn user_initiated_oauth_login(
        &self,
        provider: OAuthProvider,
        site_hint: &str,
        callback: &str,
    ) -> AuthResult<Vec<DetailedSiteInfo>> {
        let response = self.dancer.do_dance(provider, site_hint, callback).await?;
        let secret = response.secret();

        let mut created = Vec::new();
        for resource in select_resources(&response.accessible_resources, site_hint) {
            let site = site_for_resource(provider, &response, resource);
            let auth = AuthInfo::oauth(response.user.clone(), secret.clone());
            self.credentials.save_auth_info(&site, &auth).await?;
            self.sites.add_or_update_site(&site).await?;
            info!(
                provider = %provider,
                "[Login] Logged into {} as {}", site.host, response.user.display_name
            );
            created.push(site);
        }
        Ok(created)
    }

    /// Register a server site with basic or personal access token credentials.
    pub async fn server_login(
        &self,
        site: &DetailedSiteInfo,
        user: UserInfo,
        secret: AuthSecret,
    ) -> AuthResult<()> {
        let auth = AuthInfo {
            user,
            state: AuthInfoState::Valid,
            secret,
        };
        self.credentials.save_auth_info(site, &auth).await?;
        self.sites.add_or_update_site(site).await?;
        info!("[Login] Logged into server site {}", site.host);
        Ok(())
    }

    /// Forget the credential and the registration of `site`.
    pub async fn logout(&self, site: &DetailedSiteInfo) -> AuthResult<()> {
        self.credentials.remove_auth_info(site).await?;
        self.sites.remove_site(site).await?;
        info!("[Login] Logged out of {}", site.host);
        Ok(())
    }
}

fn select_resources<'a>(
    resources: &'a [AccessibleResource],
    site_hint: &str,
) -> Vec<&'a AccessibleResource> {
    let hint = site_hint.trim().to_lowercase();
    let matching: Vec<_> = resources
        .iter()
        .filter(|r| !hint.is_empty() && r.host().to_lowercase() == hint)
        .collect();
    if matching.is_empty() {
        resources.iter().collect()
    } else {
        matching
    }
}

fn site_for_resource(
    provider: OAuthProvider,
    response: &OAuthResponse,
    resource: &AccessibleResource,
) -> DetailedSiteInfo {
    let product = provider.product();
    let api_url = response.api_url.trim_end_matches('/');
    let base_api_url = match product {
        ProductKey::Jira => format!("{}/ex/jira/{}/rest", api_url, resource.id),
        ProductKey::Bitbucket => api_url.to_string(),
    };
    DetailedSiteInfo::new(
        product,
        resource.id.clone(),
        resource.name.clone(),
        resource.host(),
        true,
        response.user.id.clone(),
    )
    .with_base_api_url(base_api_url)
    .with_avatar_url(resource.avatar_url.clone())
}
