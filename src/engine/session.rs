//! Transcode session: ownership of every per-run resource and their release order

use tracing::debug;

use crate::domain::model::StreamDescriptor;
use crate::domain::rules::StreamRole;
use crate::engine::decoder::DecoderStage;
use crate::engine::encoder::EncoderStage;
use crate::engine::filter::FilterStage;
use crate::engine::StreamReport;
use crate::ports::MediaBackend;

/// Per input stream state, indexed identically to the input streams
pub struct StreamContext<B: MediaBackend> {
    pub descriptor: StreamDescriptor,
    pub role: StreamRole,
    pub decoder: Option<DecoderStage<B::Decoder>>,
    pub filter: Option<FilterStage<B::Graph>>,
    pub encoder: Option<EncoderStage<B::Encoder>>,
    /// Output stream this input maps to, absent for dropped streams
    pub output_index: Option<usize>,
    pub packets_read: u64,
    pub packets_written: u64,
    pub mux_failures: u64,
}

impl<B: MediaBackend> StreamContext<B> {
    pub fn new(descriptor: StreamDescriptor, role: StreamRole) -> Self {
        Self {
            descriptor,
            role,
            decoder: None,
            filter: None,
            encoder: None,
            output_index: None,
            packets_read: 0,
            packets_written: 0,
            mux_failures: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.descriptor.index
    }

    /// Release encoder, then filter, then decoder
    fn release(&mut self) {
        drop(self.encoder.take());
        drop(self.filter.take());
        drop(self.decoder.take());
    }

    /// Snapshot of this stream's counters
    pub fn report(&self) -> StreamReport {
        StreamReport {
            index: self.descriptor.index,
            kind: self.descriptor.kind,
            codec: self.descriptor.codec.clone(),
            role: self.role,
            output_index: self.output_index,
            packets_read: self.packets_read,
            packets_rejected: self.decoder.as_ref().map_or(0, |d| d.packets_rejected()),
            frames_decoded: self.decoder.as_ref().map_or(0, |d| d.frames_decoded()),
            frames_filter_dropped: self.filter.as_ref().map_or(0, |f| f.frames_dropped()),
            frames_encoded: self.encoder.as_ref().map_or(0, |e| e.frames_encoded()),
            frames_encode_dropped: self.encoder.as_ref().map_or(0, |e| e.frames_dropped()),
            packets_encoded: self.encoder.as_ref().map_or(0, |e| e.packets_encoded()),
            packets_written: self.packets_written,
            mux_failures: self.mux_failures,
        }
    }
}

/// Everything one transcode invocation owns.
///
/// Resources are released exactly once, in order: per stream encoder,
/// filter and decoder, then the output container, then the input container.
/// Teardown runs on drop, so every exit path releases what was acquired.
pub struct TranscodeSession<B: MediaBackend> {
    pub streams: Vec<StreamContext<B>>,
    pub output: Option<B::Writer>,
    pub input: Option<B::Reader>,
    pub header_written: bool,
    pub trailer_written: bool,
}

impl<B: MediaBackend> TranscodeSession<B> {
    pub fn new(input: B::Reader) -> Self {
        Self {
            streams: Vec::new(),
            output: None,
            input: Some(input),
            header_written: false,
            trailer_written: false,
        }
    }

    /// Per-stream counters
    pub fn stream_reports(&self) -> Vec<StreamReport> {
        self.streams.iter().map(StreamContext::report).collect()
    }

    /// Release everything still held. Safe to call more than once.
    pub fn teardown(&mut self) {
        for stream in self.streams.iter_mut() {
            stream.release();
        }
        if let Some(output) = self.output.take() {
            debug!("Closing output container");
            drop(output);
        }
        if let Some(input) = self.input.take() {
            debug!("Closing input container");
            drop(input);
        }
    }
}

impl<B: MediaBackend> Drop for TranscodeSession<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}
