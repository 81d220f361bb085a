//! Client manager
//!
//! Hands out authenticated clients per site and owns the token refresh
//! decision: a token that expires within the grace period is refreshed by the
//! responsible process only; every other process waits and re-reads the
//! secret store. Clients are cached by credential id until shortly before
//! their token expires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atlascode_core::{
    AuthConfig, AuthError, AuthEvent, AuthInfo, AuthResult, AuthSecret, DetailedSiteInfo,
    EventReceiver, Notifier, OAuthProvider, OAuthSecret, ProductKey,
};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cache::ClientCache;
use super::site::{Authorization, SiteClient};
use crate::credentials::{CredentialManager, Priority, SerialQueue};
use crate::negotiate::ProcessCoordinator;
use crate::oauth::{now_millis, TokenRefresher};

struct ClientManagerInner {
    credentials: Arc<CredentialManager>,
    refresher: Arc<TokenRefresher>,
    coordinator: Arc<dyn ProcessCoordinator>,
    notifier: Arc<dyn Notifier>,
    http: RwLock<reqwest::Client>,
    cache: ClientCache<SiteClient>,
    jira_queue: SerialQueue,
    agent_changed: AtomicBool,
    invalid_warning_shown: AtomicBool,
    grace_period: Duration,
    refresh_wait: Duration,
}

#[derive(Clone)]
pub struct ClientManager {
    inner: Arc<ClientManagerInner>,
}

impl ClientManager {
    pub fn new(
        credentials: Arc<CredentialManager>,
        refresher: Arc<TokenRefresher>,
        coordinator: Arc<dyn ProcessCoordinator>,
        notifier: Arc<dyn Notifier>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ClientManagerInner {
                credentials,
                refresher,
                coordinator,
                notifier,
                http: RwLock::new(reqwest::Client::new()),
                cache: ClientCache::new(),
                jira_queue: SerialQueue::new("jira-clients"),
                agent_changed: AtomicBool::new(false),
                invalid_warning_shown: AtomicBool::new(false),
                grace_period: config.grace_period,
                refresh_wait: config.refresh_wait,
            }),
        }
    }

    /// Jira client; concurrent requests are served one at a time.
    pub async fn jira_client(&self, site: &DetailedSiteInfo) -> AuthResult<SiteClient> {
        self.inner
            .jira_queue
            .run(Priority::Write, self.get_client(site))
            .await
    }

    pub async fn bitbucket_client(&self, site: &DetailedSiteInfo) -> AuthResult<SiteClient> {
        self.get_client(site).await
    }

    pub async fn client_for_site(&self, site: &DetailedSiteInfo) -> AuthResult<SiteClient> {
        match site.product {
            ProductKey::Jira => self.jira_client(site).await,
            ProductKey::Bitbucket => self.bitbucket_client(site).await,
        }
    }

    /// Proxy or TLS settings changed: later clients use `http`, cached ones are dropped.
    pub fn on_agent_changed(&self, http: reqwest::Client) {
        *self.inner.http.write() = http;
        self.inner.agent_changed.store(true, Ordering::SeqCst);
    }

    pub fn remove_client(&self, credential_id: &str) -> bool {
        self.inner.cache.remove(credential_id)
    }

    pub fn cached_clients(&self) -> usize {
        self.inner.cache.len()
    }

    /// Serve refresh requests other processes sent over IPC.
    pub fn spawn_refresh_listener(
        &self,
        mut rx: mpsc::UnboundedReceiver<DetailedSiteInfo>,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(site) = rx.recv().await {
                debug!("[ClientManager] Refresh requested for {}", site.host);
                if let Err(e) = manager.client_for_site(&site).await {
                    warn!("[ClientManager] Requested refresh for {} failed: {}", site.host, e);
                }
            }
        })
    }

    /// Drop cached clients whose credentials changed.
    pub fn spawn_event_listener(&self, mut events: EventReceiver) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match &event {
                    AuthEvent::CredentialsUpdated { .. }
                    | AuthEvent::CredentialsRemoved { .. }
                    | AuthEvent::SiteRemoved { .. } => {
                        if manager.remove_client(event.credential_id()) {
                            debug!(
                                "[ClientManager] Dropped cached client after {}",
                                event.type_name()
                            );
                        }
                    }
                }
            }
        })
    }

    async fn get_client(&self, site: &DetailedSiteInfo) -> AuthResult<SiteClient> {
        let inner = &self.inner;
        if inner.agent_changed.swap(false, Ordering::SeqCst) {
            info!("[ClientManager] HTTP agent changed, clearing cached clients");
            inner.cache.clear();
        }
        if let Some(client) = inner.cache.get(&site.credential_id) {
            return Ok(client);
        }

        let info = inner
            .credentials
            .get_auth_info(site, true)
            .await?
            .ok_or_else(|| AuthError::MissingCredentials {
                site: site.host.clone(),
            })?;
        if !info.is_valid() {
            self.warn_invalid_once(site);
            return Err(AuthError::InvalidCredentials {
                site: site.host.clone(),
            });
        }

        let (authorization, ttl) = match &info.secret {
            AuthSecret::OAuth(secret) => {
                let secret = self.usable_oauth_secret(site, &info, secret).await?;
                let ttl = self.ttl_for(&secret);
                (Authorization::Bearer(secret.access), ttl)
            }
            AuthSecret::Basic { username, password } => (
                Authorization::Basic {
                    username: username.clone(),
                    password: password.clone(),
                },
                None,
            ),
            AuthSecret::PersonalAccessToken { token } => {
                (Authorization::Bearer(token.clone()), None)
            }
        };

        let client = SiteClient::new(site.clone(), authorization, inner.http.read().clone());
        match ttl {
            Some(ttl) if ttl.is_zero() => {
                debug!("[ClientManager] Not caching client for {}, token about to expire", site.host);
            }
            ttl => inner
                .cache
                .insert(site.credential_id.clone(), client.clone(), ttl),
        }
        Ok(client)
    }

    /// Cache lifetime: remaining token lifetime minus the grace period.
    fn ttl_for(&self, secret: &OAuthSecret) -> Option<Duration> {
        let expiration = secret.expiration_date?;
        let remaining = expiration
            .saturating_sub(now_millis())
            .saturating_sub(self.inner.grace_period.as_millis() as i64);
        Some(Duration::from_millis(remaining.max(0) as u64))
    }

    /// `secret`, or a refreshed one when it expires within the grace period.
    async fn usable_oauth_secret(
        &self,
        site: &DetailedSiteInfo,
        info: &AuthInfo,
        secret: &OAuthSecret,
    ) -> AuthResult<OAuthSecret> {
        let grace_ms = self.inner.grace_period.as_millis() as i64;
        if !secret.expires_within(now_millis(), grace_ms) {
            return Ok(secret.clone());
        }

        let provider = OAuthProvider::for_site(site)
            .ok_or_else(|| AuthError::UnknownProvider(site.host.clone()))?;
        info!(
            provider = %provider,
            "[ClientManager] Token for {} expires soon, refreshing", site.host
        );

        let refreshed = if self
            .inner
            .coordinator
            .this_is_the_responsible_process(site)
            .await
        {
            self.refresh(site, provider, info, secret).await
        } else {
            debug!(
                "[ClientManager] Another process refreshes {}, waiting {:?}",
                site.host, self.inner.refresh_wait
            );
            tokio::time::sleep(self.inner.refresh_wait).await;
            self.current_secret(site, false).await
        };

        let failure = match refreshed {
            Ok(Some(fresh)) if !fresh.is_expired(now_millis()) => return Ok(fresh),
            Ok(_) => None,
            Err(e) if e.is_revocation() => return Err(e),
            Err(e) => Some(e),
        };
        if !secret.is_expired(now_millis()) {
            debug!("[ClientManager] Using unexpired token for {}", site.host);
            return Ok(secret.clone());
        }
        Err(failure.unwrap_or_else(|| AuthError::TokenExpired {
            site: site.host.clone(),
        }))
    }

    /// Refresh as the responsible process and return the stored winner.
    async fn refresh(
        &self,
        site: &DetailedSiteInfo,
        provider: OAuthProvider,
        info: &AuthInfo,
        secret: &OAuthSecret,
    ) -> AuthResult<Option<OAuthSecret>> {
        let credentials = &self.inner.credentials;
        let outcome = self
            .inner
            .refresher
            .get_new_tokens(provider, &secret.refresh)
            .await?;

        if outcome.should_invalidate {
            warn!("[ClientManager] Credentials for {} were revoked", site.host);
            credentials.save_auth_info(site, &info.invalidated()).await?;
            self.inner.cache.remove(&site.credential_id);
            let notifier = Arc::clone(&self.inner.notifier);
            let message = format!(
                "Credentials for {} are no longer valid. Please log in again.",
                site.host
            );
            tokio::spawn(async move {
                notifier.show_warning(&message, &[]).await;
            });
            return Err(AuthError::Revoked {
                site: site.host.clone(),
            });
        }

        let Some(tokens) = outcome.tokens else {
            return Ok(None);
        };
        let updated = AuthInfo::oauth(info.user.clone(), tokens.into_oauth_secret(&secret.refresh));
        credentials.save_auth_info(site, &updated).await?;
        // An out-of-order write was dropped; the stored credential wins
        self.current_secret(site, true).await
    }

    async fn current_secret(
        &self,
        site: &DetailedSiteInfo,
        allow_cache: bool,
    ) -> AuthResult<Option<OAuthSecret>> {
        let info = self
            .inner
            .credentials
            .get_auth_info(site, allow_cache)
            .await?
            .ok_or_else(|| AuthError::MissingCredentials {
                site: site.host.clone(),
            })?;
        if !info.is_valid() {
            return Err(AuthError::InvalidCredentials {
                site: site.host.clone(),
            });
        }
        Ok(info.oauth_secret().cloned())
    }

    fn warn_invalid_once(&self, site: &DetailedSiteInfo) {
        if self.inner.invalid_warning_shown.swap(true, Ordering::SeqCst) {
            return;
        }
        let notifier = Arc::clone(&self.inner.notifier);
        let message = format!(
            "Credentials for {} are invalid. Please log in again.",
            site.host
        );
        tokio::spawn(async move {
            notifier.show_warning(&message, &[]).await;
        });
    }
}
