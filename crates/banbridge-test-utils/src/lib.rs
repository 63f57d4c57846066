#![deny(unsafe_code)]

//! Shared test utilities for the banbridge workspace.
//!
//! Provides a fake fail2ban daemon, config builders, and tracing helpers so
//! that individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! banbridge-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod tracing_setup;

pub use config::TestConfigBuilder;
pub use daemon::{FakeDaemon, Reply};
