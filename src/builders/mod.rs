//! Builders
//!
//! Fluent builders for session configuration.

pub mod config;

pub use config::{session_config, SessionConfigBuilder};
