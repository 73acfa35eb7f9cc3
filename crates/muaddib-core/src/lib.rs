//! Configuration, error taxonomy root, and shared constants for muaddib.
//!
//! Every other crate in the workspace depends on this one for `MuaddibConfig`
//! and the base `ConfigError`; it has no dependencies of its own beyond the
//! config/serde/logging stack.

pub mod config;
pub mod error;
pub mod logging;

pub use config::MuaddibConfig;
pub use error::ConfigError;
