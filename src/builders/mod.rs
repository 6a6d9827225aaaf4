//! Builders
//!
//! Fluent builders for client configuration.

pub mod config;

pub use config::{cf_config, CfConfigBuilder};
