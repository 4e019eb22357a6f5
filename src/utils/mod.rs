//! Utility functions and helpers

pub mod logging;

pub use logging::{LogFormat, LogLevel, LoggingConfig, LoggingSystem};
