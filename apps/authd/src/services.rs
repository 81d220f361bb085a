//! Service wiring for the host process.

use std::sync::Arc;

use anyhow::Context;
use atlascode_auth::{
    default_ipc_dir, ClientManager, CredentialManager, IpcResponder, LocalSocketTransport,
    LoginManager, Negotiator, OAuthDancer, OAuthSettings, SiteRegistry, SystemBrowser,
    TokenRefresher,
};
use atlascode_core::{AuthConfig, EventBus, GlobalState, Notifier};
use atlascode_storage::{
    EncryptedFileSecretStorage, JsonGlobalStateStore, KeychainKeyProvider, KeyringLegacyKeychain,
};
use tokio::sync::mpsc;
use tracing::info;

use crate::notifier::LogNotifier;

pub struct AuthServices {
    pub config: AuthConfig,
    pub bus: EventBus,
    pub sites: SiteRegistry,
    pub credentials: Arc<CredentialManager>,
    pub clients: ClientManager,
    pub dancer: Arc<OAuthDancer>,
    pub login: LoginManager,
}

impl AuthServices {
    pub fn build(config: AuthConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;

        let bus = EventBus::new();
        let state = GlobalState::new(Arc::new(JsonGlobalStateStore::in_dir(&config.data_dir)));
        let keys = KeychainKeyProvider::new()?;
        let secrets = Arc::new(EncryptedFileSecretStorage::open(&config.data_dir, &keys)?);
        info!("[Host] Secret file at {}", secrets.path().display());

        let sites = SiteRegistry::new(state.clone(), bus.sender());
        let credentials = Arc::new(
            CredentialManager::new(secrets, sites.clone(), bus.sender()).with_legacy_keychain(
                Arc::new(KeyringLegacyKeychain::new()),
                config.keychain_service(),
            ),
        );

        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        let negotiator = Arc::new(Negotiator::new(
            state,
            Arc::new(LocalSocketTransport::new(default_ipc_dir())),
            notifier.clone(),
            &config,
        ));

        let settings = OAuthSettings::new();
        let refresher = Arc::new(TokenRefresher::new(settings.clone()));
        let clients = ClientManager::new(
            credentials.clone(),
            refresher,
            negotiator,
            notifier,
            &config,
        );
        let dancer = Arc::new(OAuthDancer::new(
            config.clone(),
            settings,
            Arc::new(SystemBrowser),
        ));
        let login = LoginManager::new(dancer.clone(), credentials.clone(), sites.clone());

        Ok(Self {
            config,
            bus,
            sites,
            credentials,
            clients,
            dancer,
            login,
        })
    }

    /// Serve refresh requests from other processes and keep the client cache
    /// in sync with credential changes. The endpoint lives as long as the
    /// returned responder.
    pub async fn start_coordination(&self) -> anyhow::Result<IpcResponder> {
        let (tx, rx) = mpsc::unbounded_channel();
        let responder = IpcResponder::bind(&default_ipc_dir(), std::process::id(), tx).await?;
        self.clients.spawn_refresh_listener(rx);
        self.clients.spawn_event_listener(self.bus.subscribe());
        Ok(responder)
    }
}
