//! Transcoder Library
//!
//! Single-pass media transcoding: every audio and video stream of an input
//! container is decoded, optionally filtered, re-encoded and remuxed into an
//! output container, with other streams copied or dropped.
//!
//! The engine is generic over [`ports::MediaBackend`]; [`adapters::LibavBackend`]
//! is the FFmpeg implementation.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;
pub mod utils;

// Re-export commonly used types
pub use config::TranscodeConfig;
pub use engine::{StreamReport, TranscodeReport, Transcoder};
pub use error::{ErrorCategory, TranscodeError, TranscodeResult};
