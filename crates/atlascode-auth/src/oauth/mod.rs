//! OAuth for Jira Cloud and Bitbucket Cloud
//!
//! - `strategy` / `pkce` - per-provider endpoints and request shaping
//! - `token` - token payload normalisation
//! - `dancer` - browser authorization through a loopback listener
//! - `refresher` - refresh-token grant

mod dancer;
mod pkce;
mod refresher;
mod resources;
mod strategy;
mod token;

pub use dancer::{BrowserLauncher, OAuthDancer, OAuthResponse, SystemBrowser};
pub use pkce::PkceChallenge;
pub use refresher::{TokenRefreshOutcome, TokenRefresher};
pub use resources::AccessibleResource;
pub use strategy::{
    strategy_for, BasicAuthStrategy, OAuthSettings, OAuthStrategy, PkceStrategy,
    ProviderSettings, TokenRequestBody,
};
pub use token::{decode_jwt_iat, decode_token_response, now_millis, TokenResponse, Tokens};
