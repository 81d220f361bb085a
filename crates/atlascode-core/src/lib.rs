//! # Atlascode Auth Core
//!
//! Domain types, collaborator traits and configuration shared by the
//! authentication crates.
//!
//! ## Modules
//!
//! - `branding` - Product naming and fixed protocol constants
//! - `config` - Timing and endpoint configuration
//! - `domain` - Credentials, sites, products and OAuth providers
//! - `error` - Typed error taxonomy
//! - `event_bus` - Credential/site change distribution
//! - `repository` - Traits for secret storage, keychain, global state, notifications
//! - `service` - Typed wrappers over the repositories

pub mod branding;
pub mod config;
pub mod domain;
pub mod error;
pub mod event_bus;
pub mod repository;
pub mod service;

pub use config::{process_started_at, AuthConfig};
pub use domain::*;
pub use error::{AuthError, AuthResult};
pub use event_bus::{create_shared_event_bus, EventBus, EventReceiver, EventSender, SharedEventBus};
pub use repository::*;
pub use service::{keys, GlobalState};
