//! FFmpeg media backend using libav bindings
//!
//! Implements the engine's container, codec and filter ports on top of
//! `ffmpeg-next`. Only this module touches libav types.

mod codec;
mod convert;
mod filter;
mod input;
mod output;

use std::path::Path;

use ffmpeg_next::decoder;
use tracing::{debug, info};

use crate::domain::model::*;
use crate::error::{TranscodeError, TranscodeResult};
use crate::ports::MediaBackend;

pub use codec::{LibavDecoder, LibavEncoder, LibavFrame};
pub use filter::LibavGraph;
pub use input::{LibavPacket, LibavReader};
pub use output::LibavWriter;

/// Media backend over the linked FFmpeg libraries
pub struct LibavBackend {
    _private: (),
}

impl LibavBackend {
    /// Initialize FFmpeg and quiet its own logging down to errors
    pub fn new() -> TranscodeResult<Self> {
        ffmpeg_next::init().map_err(|e| TranscodeError::Configuration {
            message: format!("FFmpeg initialization failed: {}", e),
        })?;
        ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);
        info!("FFmpeg libavcodec version {}", version_string(ffmpeg_next::codec::version()));
        Ok(Self { _private: () })
    }
}

fn version_string(version: u32) -> String {
    format!("{}.{}.{}", version >> 16, (version >> 8) & 0xff, version & 0xff)
}

impl MediaBackend for LibavBackend {
    type Packet = LibavPacket;
    type Frame = LibavFrame;
    type Reader = LibavReader;
    type Writer = LibavWriter;
    type Decoder = LibavDecoder;
    type Encoder = LibavEncoder;
    type Graph = LibavGraph;

    fn open_input(&self, path: &Path) -> TranscodeResult<LibavReader> {
        LibavReader::open(path)
    }

    fn find_decoder(&self, stream: &StreamDescriptor) -> Option<CodecInfo> {
        let id = convert::codec_id(&stream.codec)?;
        decoder::find(id).map(|codec| convert::codec_info(&codec))
    }

    fn open_decoder(
        &self,
        reader: &LibavReader,
        stream: &StreamDescriptor,
        codec: &CodecInfo,
        threads: usize,
    ) -> TranscodeResult<LibavDecoder> {
        let open_error = |message: String| TranscodeError::DecoderOpenFailure {
            stream_index: stream.index,
            message,
        };
        let input = reader
            .context
            .stream(stream.index)
            .ok_or_else(|| open_error("stream not present in the input".to_string()))?;
        let found = decoder::find_by_name(&codec.name).ok_or_else(|| TranscodeError::DecoderNotFound {
            stream_index: stream.index,
            codec: codec.name.clone(),
        })?;

        let mut context = ffmpeg_next::codec::Context::from_parameters(input.parameters())
            .map_err(|e| open_error(format!("failed to copy codec parameters: {}", e)))?;
        unsafe {
            let ctx = context.as_mut_ptr();
            (*ctx).pkt_timebase = convert::to_av_rational(stream.time_base);
            (*ctx).thread_count = threads as i32;
            if let Some(rate) = stream.frame_rate {
                (*ctx).framerate = convert::to_av_rational(rate);
            }
        }

        let opened = context
            .decoder()
            .open_as(found)
            .map_err(|e| open_error(e.to_string()))?;
        let decoder = match stream.kind {
            MediaKind::Video => LibavDecoder::Video {
                decoder: opened.video().map_err(|e| open_error(e.to_string()))?,
                time_base: stream.time_base,
            },
            MediaKind::Audio => LibavDecoder::Audio {
                decoder: opened.audio().map_err(|e| open_error(e.to_string()))?,
                time_base: stream.time_base,
            },
            other => return Err(open_error(format!("{} streams are not decoded", other))),
        };
        Ok(decoder)
    }

    fn create_output(&self, path: &Path, format: Option<&str>) -> TranscodeResult<LibavWriter> {
        LibavWriter::create(path, format)
    }

    fn find_encoder(&self, name: &str) -> Option<CodecInfo> {
        output::find_codec(name).map(|codec| convert::codec_info(&codec))
    }

    fn open_encoder(
        &self,
        writer: &mut LibavWriter,
        stream: &StreamDescriptor,
        settings: &EncoderSettings,
    ) -> TranscodeResult<(LibavEncoder, usize)> {
        writer.add_encoder_stream(stream, settings)
    }

    fn add_passthrough_stream(
        &self,
        writer: &mut LibavWriter,
        reader: &LibavReader,
        stream: &StreamDescriptor,
    ) -> TranscodeResult<usize> {
        writer.add_copy_stream(reader, stream)
    }

    fn copy_side_data(
        &self,
        writer: &mut LibavWriter,
        reader: &LibavReader,
        input_index: usize,
        output_index: usize,
    ) -> TranscodeResult<()> {
        writer.copy_side_data(reader, input_index, output_index)
    }

    fn build_graph(&self, request: &GraphRequest) -> TranscodeResult<LibavGraph> {
        debug!(stream = request.stream_index, "Building filter graph '{}'", request.description);
        LibavGraph::build(request)
    }
}
