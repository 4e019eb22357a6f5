//! Core transcoding engine module

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::TranscodeConfig;
use crate::domain::model::MediaKind;
use crate::domain::rules::StreamRole;
use crate::error::{TranscodeError, TranscodeResult};
use crate::ports::MediaBackend;

pub mod decoder;
pub mod encoder;
pub mod filter;
pub mod inventory;
pub mod pipeline;
pub mod session;

pub use inventory::{InputInventory, InventoryEntry};
pub use session::{StreamContext, TranscodeSession};

/// Counters for one input stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamReport {
    pub index: usize,
    pub kind: MediaKind,
    pub codec: String,
    pub role: StreamRole,
    pub output_index: Option<usize>,
    pub packets_read: u64,
    /// Packets the decoder refused and that were skipped
    pub packets_rejected: u64,
    pub frames_decoded: u64,
    pub frames_filter_dropped: u64,
    /// Frames accepted by the encoder
    pub frames_encoded: u64,
    pub frames_encode_dropped: u64,
    pub packets_encoded: u64,
    pub packets_written: u64,
    pub mux_failures: u64,
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct TranscodeReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub use_filter_graph: bool,
    pub header_written: bool,
    pub trailer_written: bool,
    pub streams: Vec<StreamReport>,
    /// Read failure that ended the input early
    pub read_error: Option<String>,
}

impl TranscodeReport {
    /// Total packets the muxer refused
    pub fn mux_failures(&self) -> u64 {
        self.streams.iter().map(|s| s.mux_failures).sum()
    }

    /// Total packets written to the output
    pub fn packets_written(&self) -> u64 {
        self.streams.iter().map(|s| s.packets_written).sum()
    }

    /// Counters of the stream with the given input index
    pub fn stream(&self, index: usize) -> Option<&StreamReport> {
        self.streams.iter().find(|s| s.index == index)
    }

    /// A run succeeded when the output was finalized and every packet was written
    pub fn succeeded(&self) -> bool {
        self.header_written && self.trailer_written && self.mux_failures() == 0
    }
}

/// Single-pass transcoder bound to one media backend
pub struct Transcoder<B: MediaBackend> {
    backend: B,
    config: TranscodeConfig,
}

impl<B: MediaBackend> Transcoder<B> {
    pub fn new(backend: B, config: TranscodeConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Inventory of the configured input
    pub fn inspect(&self) -> TranscodeResult<InputInventory> {
        let input = self.input_path()?;
        inventory::inspect_input(&self.backend, input, &self.config)
    }

    /// Transcode the configured input into the configured output.
    ///
    /// Fatal errors are returned after every acquired resource has been
    /// released; the output trailer is then absent. Recoverable per-frame
    /// and per-packet failures are reflected in the report.
    pub fn run(&self) -> TranscodeResult<TranscodeReport> {
        self.config.validate()?;
        let input = self.input_path()?;
        let output = self.output_path()?;

        let started_at = Utc::now();
        let clock = Instant::now();
        info!(
            "Transcoding {} -> {}{}",
            input.display(),
            output.display(),
            if self.config.use_filter_graph { " (filter graph)" } else { "" }
        );

        let mut session = inventory::open_input(&self.backend, input, &self.config)?;
        let result = inventory::open_output(&self.backend, &mut session, output, &self.config)
            .and_then(|()| pipeline::run(&mut session));

        let summary = match result {
            Ok(summary) => summary,
            Err(e) => {
                error!("Transcoding failed: {}", e);
                session.teardown();
                return Err(e);
            }
        };

        let report = TranscodeReport {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            started_at,
            elapsed_ms: clock.elapsed().as_millis() as u64,
            use_filter_graph: self.config.use_filter_graph,
            header_written: session.header_written,
            trailer_written: session.trailer_written,
            streams: session.stream_reports(),
            read_error: summary.read_error,
        };
        session.teardown();

        if report.mux_failures() > 0 {
            warn!("{} packets could not be written to the output", report.mux_failures());
        }
        info!(
            "Transcoding finished: {} packets written in {} ms",
            report.packets_written(),
            report.elapsed_ms
        );
        Ok(report)
    }

    fn input_path(&self) -> TranscodeResult<&Path> {
        self.config.input.as_deref().ok_or_else(|| TranscodeError::Configuration {
            message: "no input file given".to_string(),
        })
    }

    fn output_path(&self) -> TranscodeResult<&Path> {
        self.config.output.as_deref().ok_or_else(|| TranscodeError::Configuration {
            message: "no output file given".to_string(),
        })
    }
}
