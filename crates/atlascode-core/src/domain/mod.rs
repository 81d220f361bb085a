//! Domain entities, value objects, and events
//!
//! - Products and OAuth providers
//! - Sites (`DetailedSiteInfo`)
//! - Credentials (`AuthInfo` with a closed secret union)
//! - Auth events for the event bus

mod credential;
mod event;
mod product;
mod provider;
mod site;

pub use credential::*;
pub use event::AuthEvent;
pub use product::ProductKey;
pub use provider::OAuthProvider;
pub use site::DetailedSiteInfo;
