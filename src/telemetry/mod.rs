//! Telemetry
//!
//! Log subscriber setup for session events.

pub mod logging;

pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
