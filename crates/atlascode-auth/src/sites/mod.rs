//! Site registry

mod registry;

pub use registry::SiteRegistry;
