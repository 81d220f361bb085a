//! OAuth strategies
//!
//! Per-provider endpoints and request shaping. Jira uses PKCE with JSON token
//! bodies; Bitbucket uses a static client id/secret pair sent as HTTP Basic
//! auth with form bodies.

use std::collections::HashMap;
use std::sync::Arc;

use atlascode_core::OAuthProvider;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use super::pkce::PkceChallenge;

const JIRA_SCOPES: &str =
    "read:jira-user read:jira-work write:jira-work offline_access manage:jira-project";

/// Endpoints and client credentials of one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    /// Base of the REST API the resulting token is valid for
    pub api_url: String,
    #[serde(default)]
    pub accessible_resources_url: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub emails_url: Option<String>,
    #[serde(default)]
    pub scopes: String,
    #[serde(default)]
    pub audience: Option<String>,
}

impl ProviderSettings {
    /// Public Atlassian endpoints for `provider`.
    pub fn defaults(provider: OAuthProvider) -> Self {
        match provider {
            OAuthProvider::JiraCloud => Self::jira(
                "bJChVgBQd0aNUPuFZ8YzYBVZz3X4QTe2",
                "https://auth.atlassian.com",
                "https://api.atlassian.com",
            ),
            OAuthProvider::JiraCloudStaging => Self::jira(
                "pmzXmUav3Rr5XEL0Sie7Biec0WGU8BKg",
                "https://auth.stg.atlassian.com",
                "https://api.stg.atlassian.com",
            ),
            OAuthProvider::BitbucketCloud => Self::bitbucket(
                "3hasX42a7Ugka2FJja",
                "st7a4WtBYVh7L2mZMU8V5ehDtvQcWs9S",
                "https://bitbucket.org",
                "https://api.bitbucket.org/2.0",
            ),
            OAuthProvider::BitbucketCloudStaging => Self::bitbucket(
                "7jspxC7fgemuUbnWQL",
                "sjHugFh6SVVshhVE7PUW3bgXbbQDVjJD",
                "https://staging.bb-inf.net",
                "https://api-staging.bb-inf.net/2.0",
            ),
        }
    }

    fn jira(client_id: &str, auth_base: &str, api_base: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: None,
            authorize_url: format!("{}/authorize", auth_base),
            token_url: format!("{}/oauth/token", auth_base),
            api_url: api_base.to_string(),
            accessible_resources_url: Some(format!(
                "{}/oauth/token/accessible-resources",
                api_base
            )),
            profile_url: None,
            emails_url: None,
            scopes: JIRA_SCOPES.to_string(),
            audience: Some(
                api_base
                    .trim_start_matches("https://")
                    .trim_end_matches('/')
                    .to_string(),
            ),
        }
    }

    fn bitbucket(client_id: &str, client_secret: &str, site_base: &str, api_base: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: Some(client_secret.to_string()),
            authorize_url: format!("{}/site/oauth2/authorize", site_base),
            token_url: format!("{}/site/oauth2/access_token", site_base),
            api_url: api_base.to_string(),
            accessible_resources_url: None,
            profile_url: Some(format!("{}/user", api_base)),
            emails_url: Some(format!("{}/user/emails", api_base)),
            scopes: String::new(),
            audience: None,
        }
    }
}

/// Settings for every provider, with optional overrides.
#[derive(Debug, Clone, Default)]
pub struct OAuthSettings {
    overrides: HashMap<OAuthProvider, ProviderSettings>,
}

impl OAuthSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the settings of one provider.
    pub fn with_provider(mut self, provider: OAuthProvider, settings: ProviderSettings) -> Self {
        self.overrides.insert(provider, settings);
        self
    }

    pub fn get(&self, provider: OAuthProvider) -> ProviderSettings {
        self.overrides
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| ProviderSettings::defaults(provider))
    }
}

/// Token endpoint request body.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenRequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

impl TokenRequestBody {
    pub fn apply(self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Json(value) => request.json(&value),
            Self::Form(pairs) => request.form(&pairs),
        }
    }
}

/// Provider-specific description of the authorization code flow.
///
/// PKCE strategies hold the verifier of one authorization attempt and must
/// not be reused across attempts.
pub trait OAuthStrategy: Send + Sync {
    fn provider(&self) -> OAuthProvider;

    /// Browser URL starting the authorization.
    fn authorize_url(&self, state: &str) -> String;

    fn token_url(&self) -> &str;

    fn accessible_resources_url(&self) -> Option<&str>;

    fn api_url(&self) -> &str;

    fn token_authorization_data(&self, code: &str) -> TokenRequestBody;

    fn token_refresh_data(&self, refresh_token: &str) -> TokenRequestBody;

    /// Headers sent with code exchange and refresh requests.
    fn refresh_headers(&self) -> HeaderMap;

    fn profile_url(&self) -> Option<&str>;

    fn emails_url(&self) -> Option<&str>;

    fn code_verifier(&self) -> Option<&str>;
}

/// Jira Cloud strategy (PKCE, JSON bodies).
pub struct PkceStrategy {
    provider: OAuthProvider,
    settings: ProviderSettings,
    redirect_uri: String,
    pkce: PkceChallenge,
}

impl PkceStrategy {
    pub fn new(provider: OAuthProvider, settings: ProviderSettings, redirect_uri: &str) -> Self {
        Self {
            provider,
            settings,
            redirect_uri: redirect_uri.to_string(),
            pkce: PkceChallenge::generate(),
        }
    }
}

impl OAuthStrategy for PkceStrategy {
    fn provider(&self) -> OAuthProvider {
        self.provider
    }

    fn authorize_url(&self, state: &str) -> String {
        let mut params = vec![
            ("client_id", self.settings.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", self.settings.scopes.as_str()),
            ("state", state),
            ("prompt", "consent"),
            ("code_challenge", self.pkce.challenge.as_str()),
            ("code_challenge_method", PkceChallenge::METHOD),
        ];
        if let Some(audience) = &self.settings.audience {
            params.push(("audience", audience.as_str()));
        }
        with_query(&self.settings.authorize_url, &params)
    }

    fn token_url(&self) -> &str {
        &self.settings.token_url
    }

    fn accessible_resources_url(&self) -> Option<&str> {
        self.settings.accessible_resources_url.as_deref()
    }

    fn api_url(&self) -> &str {
        &self.settings.api_url
    }

    fn token_authorization_data(&self, code: &str) -> TokenRequestBody {
        TokenRequestBody::Json(serde_json::json!({
            "grant_type": "authorization_code",
            "code": code,
            "redirect_uri": self.redirect_uri,
            "client_id": self.settings.client_id,
            "code_verifier": self.pkce.verifier,
        }))
    }

    fn token_refresh_data(&self, refresh_token: &str) -> TokenRequestBody {
        TokenRequestBody::Json(serde_json::json!({
            "grant_type": "refresh_token",
            "client_id": self.settings.client_id,
            "refresh_token": refresh_token,
        }))
    }

    fn refresh_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn profile_url(&self) -> Option<&str> {
        self.settings.profile_url.as_deref()
    }

    fn emails_url(&self) -> Option<&str> {
        self.settings.emails_url.as_deref()
    }

    fn code_verifier(&self) -> Option<&str> {
        Some(&self.pkce.verifier)
    }
}

/// Bitbucket Cloud strategy (client secret, HTTP Basic, form bodies).
pub struct BasicAuthStrategy {
    provider: OAuthProvider,
    settings: ProviderSettings,
}

impl BasicAuthStrategy {
    pub fn new(provider: OAuthProvider, settings: ProviderSettings) -> Self {
        Self { provider, settings }
    }

    fn basic_credentials(&self) -> String {
        let secret = self.settings.client_secret.as_deref().unwrap_or_default();
        STANDARD.encode(format!("{}:{}", self.settings.client_id, secret))
    }
}

impl OAuthStrategy for BasicAuthStrategy {
    fn provider(&self) -> OAuthProvider {
        self.provider
    }

    fn authorize_url(&self, state: &str) -> String {
        with_query(
            &self.settings.authorize_url,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("response_type", "code"),
                ("state", state),
            ],
        )
    }

    fn token_url(&self) -> &str {
        &self.settings.token_url
    }

    fn accessible_resources_url(&self) -> Option<&str> {
        self.settings.accessible_resources_url.as_deref()
    }

    fn api_url(&self) -> &str {
        &self.settings.api_url
    }

    fn token_authorization_data(&self, code: &str) -> TokenRequestBody {
        TokenRequestBody::Form(vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code.to_string()),
        ])
    }

    fn token_refresh_data(&self, refresh_token: &str) -> TokenRequestBody {
        TokenRequestBody::Form(vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
        ])
    }

    fn refresh_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        match HeaderValue::from_str(&format!("Basic {}", self.basic_credentials())) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(e) => warn!("[OAuth] Invalid Bitbucket client credentials: {}", e),
        }
        headers
    }

    fn profile_url(&self) -> Option<&str> {
        self.settings.profile_url.as_deref()
    }

    fn emails_url(&self) -> Option<&str> {
        self.settings.emails_url.as_deref()
    }

    fn code_verifier(&self) -> Option<&str> {
        None
    }
}

/// Strategy for one authorization attempt against `provider`.
pub fn strategy_for(
    provider: OAuthProvider,
    settings: &OAuthSettings,
    redirect_uri: &str,
) -> Arc<dyn OAuthStrategy> {
    let provider_settings = settings.get(provider);
    match provider {
        OAuthProvider::JiraCloud | OAuthProvider::JiraCloudStaging => {
            Arc::new(PkceStrategy::new(provider, provider_settings, redirect_uri))
        }
        OAuthProvider::BitbucketCloud | OAuthProvider::BitbucketCloudStaging => {
            Arc::new(BasicAuthStrategy::new(provider, provider_settings))
        }
    }
}

fn with_query(base: &str, params: &[(&str, &str)]) -> String {
    match Url::parse(base) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(params);
            url.to_string()
        }
        Err(e) => {
            warn!("[OAuth] Invalid authorize URL {}: {}", base, e);
            let query: Vec<String> = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                .collect();
            format!("{}?{}", base, query.join("&"))
        }
    }
}
