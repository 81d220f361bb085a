//! OAuth integration tests
//!
//! Browser authorization through the loopback listener against a mock
//! provider, and the login flows built on top of it.
