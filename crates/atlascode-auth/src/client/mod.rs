//! Authenticated per-site clients.

mod cache;
mod manager;
mod site;

pub use cache::ClientCache;
pub use manager::ClientManager;
pub use site::{Authorization, SiteClient};
