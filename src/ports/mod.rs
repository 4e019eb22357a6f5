// Ports - Capability interfaces between the engine and the media backend

use std::path::Path;

use thiserror::Error;

use crate::domain::model::*;
use crate::error::TranscodeResult;

/// Outcome of pulling from a decoder, encoder or filter graph
#[derive(Debug)]
pub enum Receive<T> {
    /// One unit of output is ready
    Ready(T),
    /// Nothing ready until more input is supplied
    NeedMoreInput,
    /// The component is fully drained
    EndOfStream,
}

/// Outcome of submitting input to a decoder or encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Accepted,
    /// Output must be drained before this input can be accepted
    WouldBlock,
}

/// Error reported by a codec or filter graph operation.
///
/// The engine stages attach the stream index and map it onto the
/// run-level error taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CodecError {
    pub message: String,
}

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// A compressed packet with timestamp accessors
pub trait MediaPacket {
    fn stream_index(&self) -> usize;
    fn set_stream_index(&mut self, index: usize);
    fn pts(&self) -> Option<i64>;
    fn set_pts(&mut self, pts: Option<i64>);
    fn dts(&self) -> Option<i64>;
    fn set_dts(&mut self, dts: Option<i64>);
    /// Duration in the packet's current time base, 0 when unknown
    fn duration(&self) -> i64;
    fn set_duration(&mut self, duration: i64);

    /// Rescale pts, dts and duration between two time bases
    fn rescale_ts(&mut self, src: Timebase, dst: Timebase) {
        let pts = rescale_opt(self.pts(), src, dst);
        let dts = rescale_opt(self.dts(), src, dst);
        let duration = self.duration();
        self.set_pts(pts);
        self.set_dts(dts);
        if duration > 0 {
            self.set_duration(rescale(duration, src, dst));
        }
    }
}

/// A decoded frame with timestamp accessors
pub trait MediaFrame {
    fn pts(&self) -> Option<i64>;
    fn set_pts(&mut self, pts: Option<i64>);
    /// Time base the frame's pts is expressed in
    fn time_base(&self) -> Timebase;
    fn set_time_base(&mut self, time_base: Timebase);
    /// Number of audio samples, `None` for video frames
    fn samples(&self) -> Option<i64>;
}

/// Demuxer side of a container
pub trait ContainerReader {
    type Packet: MediaPacket;

    /// Short format name (e.g. "mov,mp4,m4a,3gp,3g2,mj2")
    fn format_name(&self) -> String;
    /// Container duration in seconds when known
    fn duration(&self) -> Option<f64>;
    /// Descriptors for every input stream, in index order
    fn streams(&self) -> Vec<StreamDescriptor>;
    /// Container-level metadata tags
    fn metadata(&self) -> Vec<(String, String)>;
    /// Read the next packet; `Ok(None)` at end of input
    fn read_packet(&mut self) -> TranscodeResult<Option<Self::Packet>>;
}

/// Muxer side of a container. Dropping it closes the output.
pub trait ContainerWriter {
    type Packet: MediaPacket;

    fn set_metadata(&mut self, entries: &[(String, String)]);
    fn write_header(&mut self) -> TranscodeResult<()>;
    /// Time base of an output stream; the muxer may change it while writing the header
    fn stream_time_base(&self, output_index: usize) -> Timebase;
    /// Interleave and write one packet
    fn write_packet(&mut self, packet: Self::Packet) -> TranscodeResult<()>;
    fn write_trailer(&mut self) -> TranscodeResult<()>;
}

/// Decoding state machine for one stream
pub trait Decoder {
    type Packet: MediaPacket;
    type Frame: MediaFrame;

    fn send_packet(&mut self, packet: &Self::Packet) -> CodecResult<Feed>;
    /// Signal that no more packets will be sent
    fn send_eof(&mut self) -> CodecResult<()>;
    fn receive_frame(&mut self) -> CodecResult<Receive<Self::Frame>>;
    /// Raw format the decoder produces
    fn output_format(&self) -> StreamFormat;
}

/// Encoding state machine for one stream
pub trait Encoder {
    type Packet: MediaPacket;
    type Frame: MediaFrame;

    /// Submit a frame; `None` signals end of input
    fn send_frame(&mut self, frame: Option<&Self::Frame>) -> CodecResult<Feed>;
    fn receive_packet(&mut self) -> CodecResult<Receive<Self::Packet>>;
    /// Time base the encoder was opened with
    fn time_base(&self) -> Timebase;
    /// Fixed number of samples per frame for audio encoders that require it
    fn frame_size(&self) -> Option<u32>;
}

/// Filter graph with one buffer source and one buffer sink
pub trait FilterGraph {
    type Frame: MediaFrame;

    /// Push a frame into the source; `None` signals end of input
    fn push(&mut self, frame: Option<&Self::Frame>) -> CodecResult<()>;
    fn pull(&mut self) -> CodecResult<Receive<Self::Frame>>;
    /// Time base frames carry when leaving the sink
    fn output_time_base(&self) -> Timebase;
    /// Frame format negotiated at the sink
    fn output_format(&self) -> StreamFormat;
    /// Constrain audio output to a fixed number of samples per frame
    fn set_frame_size(&mut self, samples: u32);
}

/// Codec and container provider
pub trait MediaBackend {
    type Packet: MediaPacket;
    type Frame: MediaFrame;
    type Reader: ContainerReader<Packet = Self::Packet>;
    type Writer: ContainerWriter<Packet = Self::Packet>;
    type Decoder: Decoder<Packet = Self::Packet, Frame = Self::Frame>;
    type Encoder: Encoder<Packet = Self::Packet, Frame = Self::Frame>;
    type Graph: FilterGraph<Frame = Self::Frame>;

    fn open_input(&self, path: &Path) -> TranscodeResult<Self::Reader>;

    /// Resolve a decoder by the stream's codec identifier
    fn find_decoder(&self, stream: &StreamDescriptor) -> Option<CodecInfo>;

    /// Allocate, configure from the stream parameters and open a decoder
    fn open_decoder(
        &self,
        reader: &Self::Reader,
        stream: &StreamDescriptor,
        codec: &CodecInfo,
        threads: usize,
    ) -> TranscodeResult<Self::Decoder>;

    /// Create the output container, guessing the format from the path unless given
    fn create_output(&self, path: &Path, format: Option<&str>) -> TranscodeResult<Self::Writer>;

    /// Resolve an encoder by name
    fn find_encoder(&self, name: &str) -> Option<CodecInfo>;

    /// Add an output stream, open an encoder for it and copy its parameters
    /// to the stream. Returns the encoder and the output stream index.
    fn open_encoder(
        &self,
        writer: &mut Self::Writer,
        stream: &StreamDescriptor,
        settings: &EncoderSettings,
    ) -> TranscodeResult<(Self::Encoder, usize)>;

    /// Add an output stream with codec parameters copied verbatim from the input
    fn add_passthrough_stream(
        &self,
        writer: &mut Self::Writer,
        reader: &Self::Reader,
        stream: &StreamDescriptor,
    ) -> TranscodeResult<usize>;

    /// Copy codec-level side data from an input stream to an output stream
    fn copy_side_data(
        &self,
        writer: &mut Self::Writer,
        reader: &Self::Reader,
        input_index: usize,
        output_index: usize,
    ) -> TranscodeResult<()>;

    fn build_graph(&self, request: &GraphRequest) -> TranscodeResult<Self::Graph>;
}
