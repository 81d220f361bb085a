//! Credential entity - per-site secret material
//!
//! The secret is a closed union: OAuth tokens, basic auth, or a personal
//! access token. Invalid credentials are kept (not deleted) so the site
//! binding survives until the user re-authenticates.

use serde::{Deserialize, Serialize};

/// Identity of the user a credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar_url: String,
}

impl UserInfo {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            email: String::new(),
            avatar_url: String::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = url.into();
        self
    }
}

/// Validity of a stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthInfoState {
    Valid,
    Invalid,
}

/// OAuth token material.
///
/// `expiration_date` and `received_at` are epoch milliseconds, `iat` is the
/// JWT issued-at in epoch seconds (Jira only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthSecret {
    pub access: String,
    #[serde(default)]
    pub refresh: String,
    #[serde(default)]
    pub expiration_date: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    /// Older releases persisted this field as `recievedAt`.
    #[serde(alias = "recievedAt")]
    pub received_at: i64,
}

impl OAuthSecret {
    /// Whether `self` was issued (or received) strictly before `existing`.
    ///
    /// Missing `iat` values compare as 0.
    pub fn is_older_than(&self, existing: &OAuthSecret) -> bool {
        let new_iat = self.iat.unwrap_or(0);
        let old_iat = existing.iat.unwrap_or(0);
        if new_iat != old_iat {
            return new_iat < old_iat;
        }
        self.received_at < existing.received_at
    }

    /// Whether the access token expires within `grace_ms` of `now_ms`.
    ///
    /// Tokens without an expiration never need a refresh.
    pub fn expires_within(&self, now_ms: i64, grace_ms: i64) -> bool {
        match self.expiration_date {
            Some(expiration) => now_ms + grace_ms >= expiration,
            None => false,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_within(now_ms, 0)
    }
}

/// Secret material; the tag always matches the shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthSecret {
    #[serde(rename = "oauth")]
    OAuth(OAuthSecret),
    Basic {
        username: String,
        password: String,
    },
    #[serde(rename = "pat")]
    PersonalAccessToken { token: String },
}

/// Stored credential for one site/user pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub user: UserInfo,
    pub state: AuthInfoState,
    pub secret: AuthSecret,
}

impl AuthInfo {
    pub fn oauth(user: UserInfo, secret: OAuthSecret) -> Self {
        Self {
            user,
            state: AuthInfoState::Valid,
            secret: AuthSecret::OAuth(secret),
        }
    }

    pub fn basic(user: UserInfo, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user,
            state: AuthInfoState::Valid,
            secret: AuthSecret::Basic {
                username: username.into(),
                password: password.into(),
            },
        }
    }

    pub fn personal_access_token(user: UserInfo, token: impl Into<String>) -> Self {
        Self {
            user,
            state: AuthInfoState::Valid,
            secret: AuthSecret::PersonalAccessToken {
                token: token.into(),
            },
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state == AuthInfoState::Valid
    }

    /// Copy of this credential marked invalid.
    pub fn invalidated(&self) -> Self {
        Self {
            state: AuthInfoState::Invalid,
            ..self.clone()
        }
    }

    pub fn oauth_secret(&self) -> Option<&OAuthSecret> {
        match &self.secret {
            AuthSecret::OAuth(secret) => Some(secret),
            AuthSecret::Basic { .. } | AuthSecret::PersonalAccessToken { .. } => None,
        }
    }

    /// Same secret material and same validity state.
    pub fn same_as(&self, other: &AuthInfo) -> bool {
        self.state == other.state && self.secret == other.secret
    }
}

/// Deterministic credential slot id: hex MD5 of `"{site_id}::{user_id}"`.
pub fn generate_credential_id(site_id: &str, user_id: &str) -> String {
    format!("{:x}", md5::compute(format!("{}::{}", site_id, user_id)))
}
