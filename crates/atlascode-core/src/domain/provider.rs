use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{DetailedSiteInfo, ProductKey};
use crate::AuthError;

/// OAuth provider a cloud site authenticates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OAuthProvider {
    #[serde(rename = "jiracloud")]
    JiraCloud,
    #[serde(rename = "jiracloudstaging")]
    JiraCloudStaging,
    #[serde(rename = "bbcloud")]
    BitbucketCloud,
    #[serde(rename = "bbcloudstaging")]
    BitbucketCloudStaging,
}

impl OAuthProvider {
    pub const ALL: [OAuthProvider; 4] = [
        Self::JiraCloud,
        Self::JiraCloudStaging,
        Self::BitbucketCloud,
        Self::BitbucketCloudStaging,
    ];

    /// Wire name, also the callback path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JiraCloud => "jiracloud",
            Self::JiraCloudStaging => "jiracloudstaging",
            Self::BitbucketCloud => "bbcloud",
            Self::BitbucketCloudStaging => "bbcloudstaging",
        }
    }

    pub fn product(&self) -> ProductKey {
        match self {
            Self::JiraCloud | Self::JiraCloudStaging => ProductKey::Jira,
            Self::BitbucketCloud | Self::BitbucketCloudStaging => ProductKey::Bitbucket,
        }
    }

    pub fn is_staging(&self) -> bool {
        matches!(self, Self::JiraCloudStaging | Self::BitbucketCloudStaging)
    }

    /// Jira providers use PKCE, Bitbucket providers use a client secret.
    pub fn uses_pkce(&self) -> bool {
        self.product() == ProductKey::Jira
    }

    /// Provider of a cloud site, `None` for server/data-center sites.
    pub fn for_site(site: &DetailedSiteInfo) -> Option<Self> {
        if !site.is_cloud {
            return None;
        }
        let host = site.host.to_lowercase();
        Some(match site.product {
            ProductKey::Jira if host.ends_with("jira-dev.com") => Self::JiraCloudStaging,
            ProductKey::Jira => Self::JiraCloud,
            ProductKey::Bitbucket if host.contains("bb-inf.net") => Self::BitbucketCloudStaging,
            ProductKey::Bitbucket => Self::BitbucketCloud,
        })
    }
}

impl FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| AuthError::UnknownProvider(s.to_string()))
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
