//! Shared test utilities and fixtures for Atlascode auth integration tests.

pub use atlascode_core::{
    AuthConfig, AuthError, AuthEvent, AuthInfo, DetailedSiteInfo, OAuthProvider, OAuthSecret,
    ProductKey, UserInfo,
};

/// Mock collaborator implementations
pub mod mocks;
pub use mocks::{CapturingBrowser, MockNotifier, MockPeerTransport, PeerReply};

/// Site and credential fixtures
pub mod fixtures {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    pub const HOUR_MS: i64 = 60 * 60 * 1000;
    pub const MINUTE_MS: i64 = 60 * 1000;

    /// Jira Cloud site `acme.atlassian.net` of `user-1`.
    pub fn jira_site() -> DetailedSiteInfo {
        DetailedSiteInfo::new(
            ProductKey::Jira,
            "cloud-1",
            "acme",
            "acme.atlassian.net",
            true,
            "user-1",
        )
    }

    pub fn bitbucket_site() -> DetailedSiteInfo {
        DetailedSiteInfo::new(
            ProductKey::Bitbucket,
            "bitbucket.org",
            "Bitbucket Cloud",
            "bitbucket.org",
            true,
            "user-1",
        )
    }

    /// Jira Data Center site (basic auth, no OAuth provider).
    pub fn server_site() -> DetailedSiteInfo {
        DetailedSiteInfo::new(
            ProductKey::Jira,
            "jira.corp.example",
            "Corp Jira",
            "jira.corp.example",
            false,
            "alice",
        )
    }

    pub fn user() -> UserInfo {
        UserInfo::new("user-1", "Alice").with_email("alice@example.com")
    }

    /// Unsigned JWT whose payload carries `iat`.
    pub fn jwt_with_iat(iat: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"iat":{},"sub":"user-1"}}"#, iat));
        format!("{}.{}.sig", header, payload)
    }

    /// OAuth credential expiring `expires_in_ms` from now.
    pub fn oauth_info(access: &str, iat: i64, received_at: i64, expires_in_ms: i64) -> AuthInfo {
        AuthInfo::oauth(
            user(),
            OAuthSecret {
                access: access.to_string(),
                refresh: "refresh-1".to_string(),
                expiration_date: Some(now_millis() + expires_in_ms),
                iat: Some(iat),
                received_at,
            },
        )
    }

    /// Jira credential whose access token is a JWT carrying `iat`.
    pub fn jwt_info(iat: i64, expires_in_ms: i64) -> AuthInfo {
        oauth_info(&jwt_with_iat(iat), iat, now_millis(), expires_in_ms)
    }

    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Provider settings pointed at a mock server
pub mod providers {
    use atlascode_auth::{OAuthSettings, ProviderSettings};
    use atlascode_core::OAuthProvider;

    pub fn jira_settings_at(uri: &str) -> ProviderSettings {
        ProviderSettings {
            client_id: "jira-test-client".to_string(),
            client_secret: None,
            authorize_url: format!("{}/authorize", uri),
            token_url: format!("{}/oauth/token", uri),
            api_url: uri.to_string(),
            accessible_resources_url: Some(format!("{}/oauth/token/accessible-resources", uri)),
            profile_url: None,
            emails_url: None,
            scopes: "read:jira-work offline_access".to_string(),
            audience: None,
        }
    }

    pub fn bitbucket_settings_at(uri: &str) -> ProviderSettings {
        ProviderSettings {
            client_id: "bb-test-client".to_string(),
            client_secret: Some("bb-test-secret".to_string()),
            authorize_url: format!("{}/site/oauth2/authorize", uri),
            token_url: format!("{}/site/oauth2/access_token", uri),
            api_url: format!("{}/2.0", uri),
            accessible_resources_url: None,
            profile_url: Some(format!("{}/2.0/user", uri)),
            emails_url: Some(format!("{}/2.0/user/emails", uri)),
            scopes: String::new(),
            audience: None,
        }
    }

    /// Jira Cloud and Bitbucket Cloud both served by `uri`.
    pub fn settings_at(uri: &str) -> OAuthSettings {
        OAuthSettings::new()
            .with_provider(OAuthProvider::JiraCloud, jira_settings_at(uri))
            .with_provider(OAuthProvider::BitbucketCloud, bitbucket_settings_at(uri))
    }
}

/// Several "processes" sharing one secret store and one global state
pub mod cluster {
    use std::sync::Arc;
    use std::time::Duration;

    use atlascode_auth::{
        ClientManager, CredentialManager, Negotiator, OAuthSettings, PeerTransport, SiteRegistry,
        TokenRefresher,
    };
    use atlascode_core::{AuthConfig, EventBus, GlobalState, SecretStorage};
    use atlascode_storage::{MemoryGlobalState, MemorySecretStorage};

    use crate::mocks::MockNotifier;

    /// Timings short enough for real-time tests.
    pub fn fast_config() -> AuthConfig {
        AuthConfig::default()
            .with_callback_port(0)
            .with_negotiation_timing(
                Duration::from_millis(200),
                Duration::from_millis(50),
                Duration::ZERO,
            )
            .with_refresh_wait(Duration::from_millis(100))
    }

    pub struct Cluster {
        pub secrets: Arc<dyn SecretStorage>,
        pub state: GlobalState,
        pub settings: OAuthSettings,
        pub config: AuthConfig,
    }

    impl Cluster {
        pub fn new(settings: OAuthSettings) -> Self {
            Self::with_secrets(Arc::new(MemorySecretStorage::new()), settings)
        }

        pub fn with_secrets(secrets: Arc<dyn SecretStorage>, settings: OAuthSettings) -> Self {
            Self {
                secrets,
                state: GlobalState::new(Arc::new(MemoryGlobalState::new())),
                settings,
                config: fast_config(),
            }
        }

        pub fn with_config(mut self, config: AuthConfig) -> Self {
            self.config = config;
            self
        }

        /// Start a process negotiating as `pid` over `transport`; its uptime starts now.
        pub fn process(&self, pid: u32, transport: Arc<dyn PeerTransport>) -> Process {
            let bus = EventBus::new();
            let sites = SiteRegistry::new(self.state.clone(), bus.sender());
            let credentials = Arc::new(CredentialManager::new(
                self.secrets.clone(),
                sites.clone(),
                bus.sender(),
            ));
            let notifier = MockNotifier::new();
            let negotiator = Arc::new(
                Negotiator::new(self.state.clone(), transport, notifier.clone(), &self.config)
                    .with_pid(pid)
                    .with_started_at(tokio::time::Instant::now()),
            );
            let refresher = Arc::new(TokenRefresher::new(self.settings.clone()));
            let clients = ClientManager::new(
                credentials.clone(),
                refresher,
                negotiator.clone(),
                notifier.clone(),
                &self.config,
            );
            Process {
                pid,
                bus,
                sites,
                credentials,
                negotiator,
                clients,
                notifier,
            }
        }
    }

    pub struct Process {
        pub pid: u32,
        pub bus: EventBus,
        pub sites: SiteRegistry,
        pub credentials: Arc<CredentialManager>,
        pub negotiator: Arc<Negotiator>,
        pub clients: ClientManager,
        pub notifier: Arc<MockNotifier>,
    }
}

/// Async test helpers
pub mod async_helpers {
    use std::time::Duration;
    use tokio::time::timeout;

    /// Run an async operation with a timeout
    pub async fn with_timeout<F, T>(duration: Duration, f: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        timeout(duration, f).await.expect("Operation timed out")
    }

    /// Poll `check` until it holds or `duration` elapses.
    pub async fn eventually<F>(duration: Duration, mut check: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = tokio::time::Instant::now() + duration;
        while tokio::time::Instant::now() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    /// Default test timeout (5 seconds)
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
}
