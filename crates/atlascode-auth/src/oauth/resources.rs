//! Post-exchange lookups: accessible resources and the user profile.

use std::collections::HashMap;

use atlascode_core::{AuthError, AuthResult, OAuthProvider, ProductKey, UserInfo};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::strategy::OAuthStrategy;

/// A site the token grants access to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibleResource {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl AccessibleResource {
    /// The single resource a Bitbucket Cloud token grants.
    pub fn bitbucket_cloud(provider: OAuthProvider) -> Self {
        let host = if provider.is_staging() {
            "staging.bb-inf.net"
        } else {
            "bitbucket.org"
        };
        Self {
            id: host.to_string(),
            name: "Bitbucket Cloud".to_string(),
            url: format!("https://{}", host),
            avatar_url: String::new(),
            scopes: Vec::new(),
        }
    }

    pub fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.url.clone())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JiraMyself {
    account_id: String,
    display_name: String,
    #[serde(default)]
    email_address: Option<String>,
    #[serde(default)]
    avatar_urls: HashMap<String, String>,
}

#[derive(Deserialize)]
struct BitbucketUser {
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    display_name: String,
    #[serde(default)]
    links: Option<BitbucketLinks>,
}

#[derive(Deserialize)]
struct BitbucketLinks {
    #[serde(default)]
    avatar: Option<BitbucketHref>,
}

#[derive(Deserialize)]
struct BitbucketHref {
    href: String,
}

#[derive(Deserialize)]
struct BitbucketEmails {
    #[serde(default)]
    values: Vec<BitbucketEmail>,
}

#[derive(Deserialize)]
struct BitbucketEmail {
    email: String,
    #[serde(default)]
    is_primary: bool,
}

/// Resources reachable with `access_token`.
pub async fn fetch_accessible_resources(
    http: &reqwest::Client,
    strategy: &dyn OAuthStrategy,
    access_token: &str,
) -> AuthResult<Vec<AccessibleResource>> {
    match strategy.provider().product() {
        ProductKey::Jira => {
            let url = strategy.accessible_resources_url().ok_or_else(|| {
                AuthError::NoAccessibleResources {
                    provider: strategy.provider().to_string(),
                }
            })?;
            get_json(http, url, access_token, "accessible resources lookup").await
        }
        ProductKey::Bitbucket => Ok(vec![AccessibleResource::bitbucket_cloud(
            strategy.provider(),
        )]),
    }
}

/// Profile of the user that authorized the token.
pub async fn fetch_user(
    http: &reqwest::Client,
    strategy: &dyn OAuthStrategy,
    access_token: &str,
    resource: &AccessibleResource,
) -> AuthResult<UserInfo> {
    match strategy.provider().product() {
        ProductKey::Jira => {
            let url = format!(
                "{}/ex/jira/{}/rest/api/2/myself",
                strategy.api_url().trim_end_matches('/'),
                resource.id
            );
            let me: JiraMyself = get_json(http, &url, access_token, "user lookup").await?;
            let avatar = me.avatar_urls.get("48x48").cloned().unwrap_or_default();
            Ok(UserInfo::new(me.account_id, me.display_name)
                .with_email(me.email_address.unwrap_or_default())
                .with_avatar_url(avatar))
        }
        ProductKey::Bitbucket => {
            let profile_url = strategy.profile_url().unwrap_or(strategy.api_url());
            let user: BitbucketUser =
                get_json(http, profile_url, access_token, "user lookup").await?;

            let email = match strategy.emails_url() {
                Some(url) => {
                    let emails: BitbucketEmails =
                        get_json(http, url, access_token, "email lookup").await?;
                    emails
                        .values
                        .iter()
                        .find(|e| e.is_primary)
                        .or_else(|| emails.values.first())
                        .map(|e| e.email.clone())
                        .unwrap_or_default()
                }
                None => String::new(),
            };

            let id = user
                .account_id
                .or(user.uuid)
                .ok_or_else(|| AuthError::decode("Bitbucket user", "missing account id"))?;
            let avatar = user
                .links
                .and_then(|l| l.avatar)
                .map(|a| a.href)
                .unwrap_or_default();
            Ok(UserInfo::new(id, user.display_name)
                .with_email(email)
                .with_avatar_url(avatar))
        }
    }
}

async fn get_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
    access_token: &str,
    action: &str,
) -> AuthResult<T> {
    debug!("[OAuth] {} via {}", action, url);
    let response = http
        .get(url)
        .bearer_auth(access_token)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| AuthError::transport(action, e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AuthError::transport(action, e))?;
    if !status.is_success() {
        return Err(AuthError::Http {
            action: action.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| AuthError::decode(action, e))
}
