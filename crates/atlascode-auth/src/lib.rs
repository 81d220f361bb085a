//! # Atlascode Auth
//!
//! OAuth and credential lifecycle for Jira and Bitbucket, shared safely
//! between several processes of one installation:
//! - Browser authorization through a loopback listener (PKCE for Jira)
//! - Token refresh with revocation handling
//! - Credential cache backed by the secret store, with legacy keychain migration
//! - Responsible-process negotiation over local IPC
//! - Cached authenticated clients per site

pub mod client;
pub mod credentials;
pub mod login;
pub mod negotiate;
pub mod oauth;
pub mod sites;

pub use client::{Authorization, ClientCache, ClientManager, SiteClient};
pub use credentials::{CredentialManager, Priority, SerialQueue};
pub use login::LoginManager;
pub use negotiate::{
    default_ipc_dir, IpcMessage, IpcResponder, LocalSocketTransport, Negotiator, PeerTransport,
    ProcessCoordinator,
};
pub use oauth::{
    BrowserLauncher, OAuthDancer, OAuthResponse, OAuthSettings, OAuthStrategy, ProviderSettings,
    SystemBrowser, TokenRefreshOutcome, TokenRefresher, Tokens,
};
pub use sites::SiteRegistry;
