//! Error handling module for the transcoder

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Main error type for transcoding operations
#[derive(Error, Debug)]
pub enum TranscodeError {
    /// Invalid or inconsistent configuration
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Input file not found or inaccessible
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Input container could not be opened or probed
    #[error("Cannot open input file {path}: {message}")]
    InputOpenFailure { path: PathBuf, message: String },

    /// No decoder capability exists for a transcodable stream
    #[error("Failed to find decoder for stream #{stream_index} (codec '{codec}')")]
    DecoderNotFound { stream_index: usize, codec: String },

    /// The configured target encoder does not exist
    #[error("Necessary encoder not found: '{codec}'")]
    EncoderNotFound { codec: String },

    /// A native context, frame or packet could not be allocated
    #[error("Failed to allocate {what}")]
    AllocationFailure { what: String },

    /// Decoder context configuration or opening failed
    #[error("Failed to open decoder for stream #{stream_index}: {message}")]
    DecoderOpenFailure { stream_index: usize, message: String },

    /// Output container could not be created
    #[error("Could not create output file {path}: {message}")]
    OutputOpenFailure { path: PathBuf, message: String },

    /// Encoder context configuration or opening failed
    #[error("Cannot open encoder for stream #{stream_index}: {message}")]
    EncoderOpenFailure { stream_index: usize, message: String },

    /// Codec-level side data could not be copied to the output stream
    #[error("Failed to copy side data to output stream #{stream_index}: {message}")]
    SideDataCopyFailure { stream_index: usize, message: String },

    /// Output header could not be written
    #[error("Error occurred when writing output header: {message}")]
    HeaderWriteFailure { message: String },

    /// Filter graph could not be built
    #[error("Failed to build filter graph for stream #{stream_index}: {message}")]
    FilterGraphError { stream_index: usize, message: String },

    /// Decoder reported an unrecoverable error
    #[error("Error receiving frame from decoder for stream #{stream_index}: {message}")]
    DecodeError { stream_index: usize, message: String },

    /// A frame could not be pushed through or pulled from the filter graph
    #[error("Filter error on stream #{stream_index}: {message}")]
    FilterError { stream_index: usize, message: String },

    /// Encoder rejected a frame or failed to produce a packet
    #[error("Error encoding frame for stream #{stream_index}: {message}")]
    EncodeError { stream_index: usize, message: String },

    /// Muxer failed to write a packet
    #[error("Muxing packet for output stream #{stream_index} failed: {message}")]
    MuxWriteFailure { stream_index: usize, message: String },

    /// Input container read failed for a reason other than end of file
    #[error("Failed to read packet from input: {message}")]
    ReadFailure { message: String },

    /// Output trailer could not be written
    #[error("Failed to write output trailer: {message}")]
    TrailerWriteFailure { message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// FFmpeg error
    #[error("FFmpeg error: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),
}

/// Coarse classification of errors, used for propagation policy and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing codec, bad path, invalid settings
    Configuration,
    /// Resource exhaustion
    Allocation,
    /// Context or container setup
    Setup,
    /// Decoder failure
    Decode,
    /// Per-frame filter failure
    Filter,
    /// Per-packet encoder failure
    Encode,
    /// Container read or write failure
    Mux,
    /// Trailer finalization
    Finalization,
    /// Underlying I/O or library error
    Io,
}

impl TranscodeError {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranscodeError::Configuration { .. }
            | TranscodeError::ConfigParse { .. }
            | TranscodeError::InputNotFound { .. }
            | TranscodeError::InputOpenFailure { .. }
            | TranscodeError::DecoderNotFound { .. }
            | TranscodeError::EncoderNotFound { .. } => ErrorCategory::Configuration,
            TranscodeError::AllocationFailure { .. } => ErrorCategory::Allocation,
            TranscodeError::DecoderOpenFailure { .. }
            | TranscodeError::OutputOpenFailure { .. }
            | TranscodeError::EncoderOpenFailure { .. }
            | TranscodeError::SideDataCopyFailure { .. }
            | TranscodeError::HeaderWriteFailure { .. }
            | TranscodeError::FilterGraphError { .. } => ErrorCategory::Setup,
            TranscodeError::DecodeError { .. } => ErrorCategory::Decode,
            TranscodeError::FilterError { .. } => ErrorCategory::Filter,
            TranscodeError::EncodeError { .. } => ErrorCategory::Encode,
            TranscodeError::MuxWriteFailure { .. } | TranscodeError::ReadFailure { .. } => {
                ErrorCategory::Mux
            }
            TranscodeError::TrailerWriteFailure { .. } => ErrorCategory::Finalization,
            TranscodeError::IoError(_) | TranscodeError::FFmpegError(_) => ErrorCategory::Io,
        }
    }

    /// Whether this error aborts the whole run.
    ///
    /// Filter, encode and mux errors are handled where they occur and only
    /// drop the affected frame or packet.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.category(),
            ErrorCategory::Filter | ErrorCategory::Encode | ErrorCategory::Mux
        )
    }
}

/// Result type alias for transcoding operations
pub type TranscodeResult<T> = std::result::Result<T, TranscodeError>;
