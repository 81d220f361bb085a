//! Typed services over the repositories

pub mod global_state;

pub use global_state::{keys, GlobalState};
